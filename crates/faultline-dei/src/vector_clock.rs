//! Vector clock used to stamp invocations within a request scope.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeiError;

/// A vector clock: maps actor names to monotonic counters.
///
/// Entries are kept ordered so the textual form is identical for identical
/// logical states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    entries: BTreeMap<String, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a clock from raw `(actor, counter)` pairs.
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Counter for an actor (0 if not present).
    pub fn get(&self, actor: &str) -> u64 {
        self.entries.get(actor).copied().unwrap_or(0)
    }

    /// Increments the counter for an actor in place and returns the new value.
    pub fn increment(&mut self, actor: &str) -> u64 {
        let counter = self.entries.entry(actor.to_string()).or_insert(0);
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Pointwise maximum over the union of both clocks' actors.
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.entries.clone();
        for (actor, &value) in &other.entries {
            let entry = merged.entry(actor.clone()).or_insert(0);
            *entry = (*entry).max(value);
        }
        Self { entries: merged }
    }

    /// Returns true if `later` strictly descends from `earlier`.
    ///
    /// `later` must carry every actor of `earlier` with a counter at least as
    /// large, and must either advance one of them or know an extra actor.
    /// A missing `earlier` is descended by any present clock; a missing
    /// `later` descends nothing.
    pub fn descends(earlier: Option<&Self>, later: Option<&Self>) -> bool {
        let (earlier, later) = match (earlier, later) {
            (None, later) => return later.is_some(),
            (Some(_), None) => return false,
            (Some(earlier), Some(later)) => (earlier, later),
        };

        let mut advanced = false;
        for (actor, &value) in &earlier.entries {
            match later.entries.get(actor) {
                None => return false,
                Some(&theirs) if theirs < value => return false,
                Some(&theirs) => advanced |= theirs > value,
            }
        }

        advanced || later.entries.len() > earlier.entries.len()
    }

    /// Returns true if every counter in `self` is at most the one in `other`.
    pub fn is_covered_by(&self, other: &Self) -> bool {
        self.entries
            .iter()
            .all(|(actor, &value)| other.get(actor) >= value)
    }

    pub fn entries(&self) -> &BTreeMap<String, u64> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.entries).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl FromStr for VectorClock {
    type Err = DeiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str::<BTreeMap<String, u64>>(s)
            .map(|entries| Self { entries })
            .map_err(|source| DeiError::MalformedClock {
                input: s.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vc(entries: &[(&str, u64)]) -> VectorClock {
        VectorClock::from_entries(entries.iter().map(|(k, v)| (*k, *v)))
    }

    #[test]
    fn test_get_absent_is_zero() {
        assert_eq!(VectorClock::new().get("a"), 0);
    }

    #[test]
    fn test_increment() {
        let mut clock = VectorClock::new();
        assert_eq!(clock.increment("a"), 1);
        assert_eq!(clock.increment("a"), 2);
        clock.increment("b");
        assert_eq!(clock.get("a"), 2);
        assert_eq!(clock.get("b"), 1);
    }

    #[test]
    fn test_merge_is_pointwise_max() {
        let a = vc(&[("n1", 3), ("n2", 1)]);
        let b = vc(&[("n1", 1), ("n2", 5), ("n3", 2)]);
        let merged = a.merge(&b);
        assert_eq!(merged, vc(&[("n1", 3), ("n2", 5), ("n3", 2)]));
        // inputs untouched
        assert_eq!(a.get("n2"), 1);
    }

    #[test]
    fn test_descends_requires_progress() {
        let a = vc(&[("n1", 1)]);
        assert!(!VectorClock::descends(Some(&a), Some(&a)));
        assert!(VectorClock::descends(Some(&a), Some(&vc(&[("n1", 2)]))));
        assert!(VectorClock::descends(
            Some(&a),
            Some(&vc(&[("n1", 1), ("n2", 1)]))
        ));
        assert!(!VectorClock::descends(Some(&a), Some(&vc(&[("n2", 4)]))));
        assert!(!VectorClock::descends(Some(&vc(&[("n1", 2)])), Some(&a)));
    }

    #[test]
    fn test_descends_with_missing_clocks() {
        let a = vc(&[("n1", 1)]);
        assert!(VectorClock::descends(None, Some(&a)));
        assert!(VectorClock::descends(None, Some(&VectorClock::new())));
        assert!(!VectorClock::descends(None, None));
        assert!(!VectorClock::descends(Some(&a), None));
    }

    #[test]
    fn test_text_round_trip() {
        let clock = vc(&[("b", 2), ("a", 1)]);
        let text = clock.to_string();
        assert_eq!(text, r#"{"a":1,"b":2}"#);
        assert_eq!(text.parse::<VectorClock>().unwrap(), clock);
    }

    #[test]
    fn test_read_is_order_insensitive() {
        let left: VectorClock = r#"{"a":1,"b":2}"#.parse().unwrap();
        let right: VectorClock = r#"{"b":2,"a":1}"#.parse().unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn test_malformed_text_fails_loudly() {
        for input in ["", "[]", r#"{"a":-1}"#, r#"{"a":"one"}"#, "null"] {
            let err = input.parse::<VectorClock>().unwrap_err();
            assert!(matches!(err, DeiError::MalformedClock { .. }), "{input}");
        }
    }

    fn clock_strategy() -> impl Strategy<Value = VectorClock> {
        prop::collection::btree_map("[a-d]", 0u64..5, 0..4)
            .prop_map(|entries| VectorClock { entries })
    }

    proptest! {
        #[test]
        fn merge_dominates_its_inputs(a in clock_strategy(), b in clock_strategy()) {
            let merged = a.merge(&b);
            prop_assert!(a.is_covered_by(&merged));
            prop_assert!(b.is_covered_by(&merged));
            // `descends` is strict: a clock never descends itself, so `merged == a` only gets the coverage checks.
            if merged != a {
                prop_assert!(VectorClock::descends(Some(&a), Some(&merged)));
            }
        }

        #[test]
        fn increment_always_descends(a in clock_strategy(), actor in "[a-e]") {
            let mut later = a.clone();
            later.increment(&actor);
            prop_assert!(VectorClock::descends(Some(&a), Some(&later)));
            prop_assert!(!VectorClock::descends(Some(&later), Some(&a)));
        }

        #[test]
        fn missing_clock_rules(b in clock_strategy()) {
            prop_assert!(VectorClock::descends(None, Some(&b)));
            prop_assert!(!VectorClock::descends(Some(&b), None));
        }

        #[test]
        fn text_round_trips(a in clock_strategy()) {
            prop_assert_eq!(a.to_string().parse::<VectorClock>().unwrap(), a);
        }
    }
}
