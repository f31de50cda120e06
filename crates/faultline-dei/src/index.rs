//! Distributed execution index.
//!
//! An index is the path from the root of a request's call tree to the call
//! currently in flight. Each segment is `(key, occurrence)`; the occurrence
//! separates a call repeated in a loop from a new, distinct call.
//!
//! ## Occurrence counting
//!
//! Occurrences are counted per *position*: the pair (parent path, key).
//! Pushing a key whose position has been seen before (push, pop, push at the
//! same parent) bumps the count; pushing it anywhere else starts at 1.
//!
//! ```text
//! push a      [[a,1]]
//! push b      [[a,1],[b,1]]
//! pop         [[a,1]]
//! push b      [[a,1],[b,2]]       same parent, same key
//! push a      [[a,1],[b,2],[a,1]] new parent path
//! ```
//!
//! ## Text forms
//!
//! The canonical form is compact JSON (`[["a",1],["b",2]]`). The legacy flat
//! form adds a space after each comma (`[["a", 1], ["b", 2]]`). Parsing
//! accepts either; the empty string and `[]` are the empty index.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::callsite::Callsite;
use crate::encoding::KeyEncoder;
use crate::error::{DeiError, DeiResult};

/// One path segment: a key and how often it occurred at this position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Segment(String, u32);

impl Segment {
    pub fn key(&self) -> &str {
        &self.0
    }

    pub fn occurrence(&self) -> u32 {
        self.1
    }
}

/// Hierarchical identifier of a call within one execution.
///
/// Equality, ordering, and hashing consider only the segments; the
/// occurrence bookkeeping is private state.
#[derive(Debug, Clone, Default)]
pub struct ExecutionIndex {
    segments: Vec<Segment>,
    /// (rendered parent path, key) -> last occurrence
    occurrences: HashMap<(String, String), u32>,
}

impl ExecutionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `key` below the current path.
    pub fn push(&mut self, key: impl Into<String>) {
        let key = key.into();
        let position = (render_compact(&self.segments), key.clone());
        let occurrence = self.occurrences.entry(position).or_insert(0);
        *occurrence += 1;
        let occurrence = *occurrence;
        self.segments.push(Segment(key, occurrence));
    }

    /// Encodes the callsite and pushes the resulting key.
    pub fn push_callsite(&mut self, callsite: &Callsite, encoder: &dyn KeyEncoder) {
        self.push(encoder.encode(callsite));
    }

    /// Removes the most recently pushed segment.
    pub fn pop(&mut self) -> DeiResult<Segment> {
        self.segments.pop().ok_or(DeiError::IndexBounds)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns true if `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments.starts_with(&self.segments)
    }

    /// Renders the legacy flat text form.
    pub fn to_legacy_string(&self) -> String {
        let body = self
            .segments
            .iter()
            .map(|Segment(key, occurrence)| format!("[{}, {occurrence}]", quote(key)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("[{body}]")
    }

    /// Parses either text form.
    pub fn parse(input: &str) -> DeiResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::new());
        }

        let segments: Vec<Segment> =
            serde_json::from_str(trimmed).map_err(|source| DeiError::MalformedIndex {
                input: input.to_string(),
                source,
            })?;

        let mut index = Self::new();
        for Segment(key, occurrence) in segments {
            if occurrence == 0 {
                return Err(DeiError::InvalidOccurrence {
                    key,
                    count: occurrence,
                });
            }
            let position = (render_compact(&index.segments), key.clone());
            let seen = index.occurrences.entry(position).or_insert(0);
            *seen = (*seen).max(occurrence);
            index.segments.push(Segment(key, occurrence));
        }
        Ok(index)
    }

    /// Parses an index that must be present.
    pub fn parse_required(input: Option<&str>) -> DeiResult<Self> {
        input.map_or(Err(DeiError::MissingIndex), Self::parse)
    }
}

fn render_compact(segments: &[Segment]) -> String {
    let body = segments
        .iter()
        .map(|Segment(key, occurrence)| format!("[{},{occurrence}]", quote(key)))
        .collect::<Vec<_>>()
        .join(",");
    format!("[{body}]")
}

fn quote(key: &str) -> String {
    serde_json::Value::String(key.to_string()).to_string()
}

impl fmt::Display for ExecutionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_compact(&self.segments))
    }
}

impl FromStr for ExecutionIndex {
    type Err = DeiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for ExecutionIndex {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for ExecutionIndex {}

impl Hash for ExecutionIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl PartialOrd for ExecutionIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExecutionIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments.cmp(&other.segments)
    }
}

impl Serialize for ExecutionIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExecutionIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(keys: &[&str]) -> ExecutionIndex {
        let mut index = ExecutionIndex::new();
        for key in keys {
            index.push(*key);
        }
        index
    }

    #[test]
    fn nested_pushes_serialize_in_order() {
        let index = index(&["svcA/methodX", "svcB/methodY"]);
        assert_eq!(
            index.to_string(),
            r#"[["svcA/methodX",1],["svcB/methodY",1]]"#
        );
    }

    #[test]
    fn repush_at_same_position_increments() {
        let mut index = index(&["a"]);
        index.pop().unwrap();
        index.push("a");
        assert_eq!(index.to_string(), r#"[["a",2]]"#);
    }

    #[test]
    fn sibling_loop_increments_under_parent() {
        let mut index = index(&["a", "b"]);
        index.pop().unwrap();
        index.push("b");
        index.pop().unwrap();
        index.push("b");
        assert_eq!(index.to_string(), r#"[["a",1],["b",3]]"#);
    }

    #[test]
    fn same_key_under_new_parent_starts_at_one() {
        let mut index = index(&["a", "b"]);
        index.pop().unwrap();
        index.pop().unwrap();
        index.push("a");
        index.push("b");
        assert_eq!(index.to_string(), r#"[["a",2],["b",1]]"#);
    }

    #[test]
    fn repush_of_ancestor_key_appends() {
        let mut index = ExecutionIndex::parse(r#"[["k1",1],["k2",1],["k3",1]]"#).unwrap();
        index.push("k2");
        assert_eq!(
            index.to_string(),
            r#"[["k1",1],["k2",1],["k3",1],["k2",1]]"#
        );
    }

    #[test]
    fn parsed_index_continues_counting() {
        let mut index = ExecutionIndex::parse(r#"[["a",1],["b",4]]"#).unwrap();
        index.pop().unwrap();
        index.push("b");
        assert_eq!(index.to_string(), r#"[["a",1],["b",5]]"#);
    }

    #[test]
    fn pop_empty_is_bounds_error() {
        let mut index = ExecutionIndex::new();
        assert!(matches!(index.pop(), Err(DeiError::IndexBounds)));
    }

    #[test]
    fn empty_inputs_parse_to_empty_index() {
        assert!(ExecutionIndex::parse("").unwrap().is_empty());
        assert!(ExecutionIndex::parse("[]").unwrap().is_empty());
        assert!(ExecutionIndex::parse("  ").unwrap().is_empty());
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(matches!(
            ExecutionIndex::parse_required(None),
            Err(DeiError::MissingIndex)
        ));
        assert!(ExecutionIndex::parse_required(Some("")).unwrap().is_empty());
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        for input in ["null", "[[\"a\"]]", "{}", "[[\"a\",-1]]", "[[1,1]]", "[["] {
            assert!(
                matches!(
                    ExecutionIndex::parse(input),
                    Err(DeiError::MalformedIndex { .. })
                ),
                "{input}"
            );
        }
    }

    #[test]
    fn zero_occurrence_is_rejected() {
        assert!(matches!(
            ExecutionIndex::parse(r#"[["a",0]]"#),
            Err(DeiError::InvalidOccurrence { .. })
        ));
    }

    #[test]
    fn legacy_form_round_trips() {
        let index = index(&["svcA/methodX", "svcB/methodY"]);
        let legacy = index.to_legacy_string();
        assert_eq!(legacy, r#"[["svcA/methodX", 1], ["svcB/methodY", 1]]"#);
        assert_eq!(ExecutionIndex::parse(&legacy).unwrap(), index);
        assert_eq!(ExecutionIndex::new().to_legacy_string(), "[]");
    }

    #[test]
    fn keys_with_special_characters_round_trip() {
        let index = index(&["a\"b", "][", "c,d"]);
        assert_eq!(ExecutionIndex::parse(&index.to_string()).unwrap(), index);
    }

    #[test]
    fn clone_is_independent() {
        let original = index(&["a", "b"]);
        let mut copy = original.clone();
        copy.pop().unwrap();
        copy.push("c");
        assert_eq!(original.to_string(), r#"[["a",1],["b",1]]"#);
        assert_eq!(copy.to_string(), r#"[["a",1],["c",1]]"#);
    }

    #[test]
    fn ancestry_is_strict_prefix() {
        let parent = index(&["a"]);
        let child = index(&["a", "b"]);
        assert!(parent.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&parent));
        assert!(!child.is_ancestor_of(&child));
        assert!(!index(&["x"]).is_ancestor_of(&child));
    }

    #[test]
    fn serde_uses_the_text_form() {
        let index = index(&["a"]);
        let json = serde_json::to_string(&index).unwrap();
        assert_eq!(json, r#""[[\"a\",1]]""#);
        let back: ExecutionIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, index);
    }
}
