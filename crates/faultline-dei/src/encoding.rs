//! Segment key encoders: how a callsite becomes one index segment key.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::callsite::Callsite;

/// Which encoding strategy produces segment keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexVersion {
    /// Raw `module/method` signature.
    V1,
    /// Signature, synchronous, and asynchronous components.
    #[default]
    V2,
}

impl fmt::Display for IndexVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexVersion::V1 => f.write_str("v1"),
            IndexVersion::V2 => f.write_str("v2"),
        }
    }
}

/// Turns a callsite into a segment key.
pub trait KeyEncoder: Send + Sync + fmt::Debug {
    fn version(&self) -> IndexVersion;

    fn encode(&self, callsite: &Callsite) -> String;
}

/// Legacy flat encoding: the human-readable signature.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatEncoder;

impl KeyEncoder for FlatEncoder {
    fn version(&self) -> IndexVersion {
        IndexVersion::V1
    }

    fn encode(&self, callsite: &Callsite) -> String {
        callsite.signature()
    }
}

/// Which structured components are included and which are digested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentOptions {
    pub hash_signature: bool,
    pub include_synchronous: bool,
    pub hash_synchronous: bool,
    pub include_asynchronous: bool,
    pub hash_asynchronous: bool,
}

impl Default for ComponentOptions {
    fn default() -> Self {
        Self {
            hash_signature: true,
            include_synchronous: true,
            hash_synchronous: true,
            include_asynchronous: true,
            hash_asynchronous: true,
        }
    }
}

impl ComponentOptions {
    /// Every component included, none digested.
    pub fn readable() -> Self {
        Self {
            hash_signature: false,
            hash_synchronous: false,
            hash_asynchronous: false,
            ..Self::default()
        }
    }
}

/// Structured encoding: `signature-synchronous-asynchronous`.
///
/// - signature: service, module, method, argument shape
/// - synchronous: file, line, filtered stack
/// - asynchronous: the caller's correlation token
///
/// A digested component is the lowercase hex SHA-1 of its parts joined with
/// `-`; a readable one renders as `[a,b,c]`; an excluded one is empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredEncoder {
    options: ComponentOptions,
}

impl StructuredEncoder {
    pub fn new(options: ComponentOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ComponentOptions {
        &self.options
    }
}

impl KeyEncoder for StructuredEncoder {
    fn version(&self) -> IndexVersion {
        IndexVersion::V2
    }

    fn encode(&self, callsite: &Callsite) -> String {
        let target = &callsite.target;
        let signature = component(
            &[
                target.service_name.as_str(),
                target.module.as_str(),
                target.method.as_str(),
                target.arguments.declared_type.as_str(),
            ],
            self.options.hash_signature,
        );

        let synchronous = if self.options.include_synchronous {
            component(
                &[
                    callsite.file_name.as_str(),
                    callsite.line_number.as_str(),
                    callsite.serialized_stack_trace.as_str(),
                ],
                self.options.hash_synchronous,
            )
        } else {
            String::new()
        };

        let asynchronous = if self.options.include_asynchronous {
            let token = target.async_token.as_deref().unwrap_or_default();
            component(&[token], self.options.hash_asynchronous)
        } else {
            String::new()
        };

        format!("{signature}-{synchronous}-{asynchronous}")
    }
}

fn component(parts: &[&str], hashed: bool) -> String {
    if hashed {
        digest(&parts.join("-"))
    } else {
        format!("[{}]", parts.join(","))
    }
}

/// Lowercase hex SHA-1 of the input's UTF-8 bytes.
pub fn digest(input: &str) -> String {
    hex::encode(Sha1::digest(input.as_bytes()))
}

/// Index configuration: encoding version plus structured options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    pub version: IndexVersion,
    pub components: ComponentOptions,
}

impl IndexOptions {
    pub fn encoder(&self) -> Box<dyn KeyEncoder> {
        match self.version {
            IndexVersion::V1 => Box::new(FlatEncoder),
            IndexVersion::V2 => Box::new(StructuredEncoder::new(self.components)),
        }
    }
}
