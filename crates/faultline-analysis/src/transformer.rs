//! Value transformers: faults that let a call succeed with an altered
//! response.
//!
//! A transformer walks a reference response one step at a time. Step `k`
//! yields the `k`-th variant of the value, or `None` once the value has no
//! further variants. Each yielded step is a separate fault to try.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{AnalysisError, AnalysisResult};

pub trait ValueTransformer: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// The variant of `reference` at `step`, if there is one.
    fn transform(&self, reference: &Value, step: u32) -> Option<Value>;
}

/// Replaces the character at the step's position with a shifted one.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringTransformer;

impl ValueTransformer for StringTransformer {
    fn name(&self) -> &'static str {
        "string"
    }

    fn transform(&self, reference: &Value, step: u32) -> Option<Value> {
        let text = reference.as_str()?;
        replace_char_at(text, step as usize, shifted).map(Value::String)
    }
}

fn shifted(c: char) -> char {
    char::from_u32((u32::from(c) + 1) % 127 + 33).unwrap_or('!')
}

/// Negates a boolean carried as a string; one step only.
#[derive(Debug, Default, Clone, Copy)]
pub struct BooleanAsStringTransformer;

impl ValueTransformer for BooleanAsStringTransformer {
    fn name(&self) -> &'static str {
        "boolean_as_string"
    }

    fn transform(&self, reference: &Value, step: u32) -> Option<Value> {
        if step > 0 {
            return None;
        }
        let parsed = reference.as_str()?.eq_ignore_ascii_case("true");
        Some(Value::String((!parsed).to_string()))
    }
}

/// Replaces the character at the step's position with an arbitrary
/// printable one, derived deterministically from the value and step.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByzantineStringTransformer;

impl ValueTransformer for ByzantineStringTransformer {
    fn name(&self) -> &'static str {
        "byzantine_string"
    }

    fn transform(&self, reference: &Value, step: u32) -> Option<Value> {
        let text = reference.as_str()?;
        let digest = faultline_dei::digest(&format!("{text}:{step}"));
        let seed = u8::from_str_radix(digest.get(..2)?, 16).ok()?;
        let replacement = char::from(33 + seed % 94);
        replace_char_at(text, step as usize, |_| replacement).map(Value::String)
    }
}

/// Scales an integer, carried as a number or as decimal text, by a factor
/// derived from the value; one step only.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegerAsStringTransformer;

impl ValueTransformer for IntegerAsStringTransformer {
    fn name(&self) -> &'static str {
        "integer_as_string"
    }

    fn transform(&self, reference: &Value, step: u32) -> Option<Value> {
        if step > 0 {
            return None;
        }
        let (number, as_text) = match reference {
            Value::Number(n) => (n.as_i64()?, false),
            Value::String(s) => (s.trim().parse::<i64>().ok()?, true),
            _ => return None,
        };
        if number == 0 {
            return None;
        }
        let digest = faultline_dei::digest(&number.to_string());
        let factor = 2 + i64::from(u8::from_str_radix(digest.get(..2)?, 16).ok()?);
        let scaled = number.wrapping_mul(factor);
        Some(if as_text {
            Value::String(scaled.to_string())
        } else {
            Value::from(scaled)
        })
    }
}

/// Drops the object member at the step's position, in key order.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonObjectTransformer;

impl ValueTransformer for JsonObjectTransformer {
    fn name(&self) -> &'static str {
        "json_object"
    }

    fn transform(&self, reference: &Value, step: u32) -> Option<Value> {
        let object = reference.as_object()?;
        let mut keys: Vec<&String> = object.keys().collect();
        keys.sort();
        let dropped = *keys.get(step as usize)?;
        let mut out = object.clone();
        out.remove(dropped);
        Some(Value::Object(out))
    }
}

/// Flips one bit of a byte array (a JSON array of `0..=255`) per step,
/// walking every bit of every byte in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteArrayTransformer;

impl ValueTransformer for ByteArrayTransformer {
    fn name(&self) -> &'static str {
        "byte_array"
    }

    fn transform(&self, reference: &Value, step: u32) -> Option<Value> {
        let mut bytes = reference
            .as_array()?
            .iter()
            .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect::<Option<Vec<u8>>>()?;
        let position = step as usize;
        let byte = bytes.get_mut(position / 8)?;
        *byte ^= 0x80 >> (position % 8);
        Some(Value::from(bytes))
    }
}

fn replace_char_at(text: &str, position: usize, f: impl Fn(char) -> char) -> Option<String> {
    let original = text.chars().nth(position)?;
    let mut out = String::with_capacity(text.len());
    out.extend(text.chars().take(position));
    out.push(f(original));
    out.extend(text.chars().skip(position + 1));
    Some(out)
}

/// Transformers by name.
#[derive(Debug, Clone, Default)]
pub struct TransformerRegistry {
    transformers: HashMap<String, Arc<dyn ValueTransformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in transformers.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(StringTransformer);
        registry.register(BooleanAsStringTransformer);
        registry.register(ByzantineStringTransformer);
        registry.register(IntegerAsStringTransformer);
        registry.register(JsonObjectTransformer);
        registry.register(ByteArrayTransformer);
        registry
    }

    pub fn register(&mut self, transformer: impl ValueTransformer + 'static) {
        self.transformers
            .insert(transformer.name().to_string(), Arc::new(transformer));
    }

    pub fn get(&self, name: &str) -> AnalysisResult<Arc<dyn ValueTransformer>> {
        self.transformers
            .get(name)
            .cloned()
            .ok_or_else(|| AnalysisError::UnknownTransformer(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transformers.contains_key(name)
    }
}
