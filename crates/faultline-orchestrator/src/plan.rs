//! Fault plans: which calls of one execution fail, and how.

use std::collections::BTreeMap;
use std::fmt;

use faultline_analysis::Fault;
use faultline_dei::ExecutionIndex;

/// The faults to inject during one execution, keyed by call.
///
/// The empty plan is the fault-free reference execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    faults: BTreeMap<ExecutionIndex, Fault>,
}

impl FaultPlan {
    pub fn empty() -> Self {
        Self::default()
    }

    /// This plan plus one more fault.
    pub fn extended(&self, index: ExecutionIndex, fault: Fault) -> Self {
        let mut faults = self.faults.clone();
        faults.insert(index, fault);
        Self { faults }
    }

    pub fn get(&self, index: &ExecutionIndex) -> Option<&Fault> {
        self.faults.get(index)
    }

    pub fn contains(&self, index: &ExecutionIndex) -> bool {
        self.faults.contains_key(index)
    }

    pub fn len(&self) -> usize {
        self.faults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ExecutionIndex, &Fault)> {
        self.faults.iter()
    }

    pub fn indices(&self) -> impl Iterator<Item = &ExecutionIndex> {
        self.faults.keys()
    }

    /// True if every fault of `self` is also in `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.faults
            .iter()
            .all(|(index, fault)| other.get(index) == Some(fault))
    }

    /// True if one faulted call is nested below another.
    ///
    /// A faulted call never reaches its callee, so such a plan can never be
    /// realized as written.
    pub fn has_nested_targets(&self) -> bool {
        let indices: Vec<_> = self.faults.keys().collect();
        indices.iter().enumerate().any(|(i, a)| {
            indices[i + 1..]
                .iter()
                .any(|b| a.is_ancestor_of(b) || b.is_ancestor_of(a))
        })
    }

    /// Stable identity used to avoid running the same plan twice.
    pub fn fingerprint(&self) -> String {
        let pairs: Vec<(String, String)> = self
            .faults
            .iter()
            .map(|(index, fault)| (index.to_string(), fault.to_string()))
            .collect();
        serde_json::to_string(&pairs).unwrap_or_default()
    }
}

impl fmt::Display for FaultPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.faults.is_empty() {
            return f.write_str("{}");
        }
        f.write_str("{")?;
        for (n, (index, fault)) in self.faults.iter().enumerate() {
            if n > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{index}: {}", fault.kind())?;
        }
        f.write_str("}")
    }
}

impl FromIterator<(ExecutionIndex, Fault)> for FaultPlan {
    fn from_iter<T: IntoIterator<Item = (ExecutionIndex, Fault)>>(iter: T) -> Self {
        Self {
            faults: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index(keys: &[&str]) -> ExecutionIndex {
        let mut index = ExecutionIndex::new();
        for key in keys {
            index.push(*key);
        }
        index
    }

    fn unavailable() -> Fault {
        Fault::exception("grpc", [("code", json!("UNAVAILABLE"))])
    }

    #[test]
    fn extension_leaves_original_untouched() {
        let base = FaultPlan::empty();
        let one = base.extended(index(&["a"]), unavailable());
        assert!(base.is_empty());
        assert_eq!(one.len(), 1);
        assert!(base.is_subset_of(&one));
        assert!(!one.is_subset_of(&base));
    }

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let a = FaultPlan::empty()
            .extended(index(&["a"]), unavailable())
            .extended(index(&["b"]), unavailable());
        let b = FaultPlan::empty()
            .extended(index(&["b"]), unavailable())
            .extended(index(&["a"]), unavailable());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), FaultPlan::empty().fingerprint());
    }

    #[test]
    fn different_faults_have_different_fingerprints() {
        let a = FaultPlan::empty().extended(index(&["a"]), unavailable());
        let b = FaultPlan::empty().extended(index(&["a"]), Fault::Error(json!({"code": 1})));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn nested_targets_are_detected() {
        let nested = FaultPlan::empty()
            .extended(index(&["a"]), unavailable())
            .extended(index(&["a", "b"]), unavailable());
        let siblings = FaultPlan::empty()
            .extended(index(&["a"]), unavailable())
            .extended(index(&["b"]), unavailable());
        assert!(nested.has_nested_targets());
        assert!(!siblings.has_nested_targets());
    }

    #[test]
    fn display_lists_kinds() {
        let plan = FaultPlan::empty().extended(index(&["a"]), unavailable());
        assert_eq!(plan.to_string(), r#"{[["a",1]]: forced_exception}"#);
        assert_eq!(FaultPlan::empty().to_string(), "{}");
    }
}
