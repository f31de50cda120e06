//! Per-request scope storage keyed by correlation id.
//!
//! Each logical request owns one [`RequestScope`]. Scopes are created when a
//! request enters instrumented code, mutated only by that request, and
//! cleared when it leaves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use faultline_types::RequestId;

use crate::error::{DeiError, DeiResult};
use crate::index::ExecutionIndex;
use crate::vector_clock::VectorClock;

/// Index and clocks owned by one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestScope {
    pub index: ExecutionIndex,
    pub clock: VectorClock,
    /// Clock received from the caller, if this scope continues a remote path.
    pub origin_clock: Option<VectorClock>,
}

impl RequestScope {
    /// Scope continuing an index and clock propagated from a caller.
    pub fn continuing(index: ExecutionIndex, origin_clock: Option<VectorClock>) -> Self {
        Self {
            index,
            clock: origin_clock.clone().unwrap_or_default(),
            origin_clock,
        }
    }
}

/// Concurrent map of request scopes.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: RwLock<HashMap<RequestId, Arc<Mutex<RequestScope>>>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a scope; an id may only be registered once at a time.
    pub fn create(&self, id: RequestId, scope: RequestScope) -> DeiResult<()> {
        let mut scopes = self.scopes.write().unwrap_or_else(PoisonError::into_inner);
        if scopes.contains_key(&id) {
            return Err(DeiError::ScopeExists(id));
        }
        tracing::trace!(request = %id, "request scope created");
        scopes.insert(id, Arc::new(Mutex::new(scope)));
        Ok(())
    }

    /// Returns a snapshot of the scope.
    pub fn fetch(&self, id: &RequestId) -> DeiResult<RequestScope> {
        self.with_scope(id, |scope| scope.clone())
    }

    /// Runs `f` with exclusive access to the scope.
    pub fn with_scope<R>(
        &self,
        id: &RequestId,
        f: impl FnOnce(&mut RequestScope) -> R,
    ) -> DeiResult<R> {
        let scope = {
            let scopes = self.scopes.read().unwrap_or_else(PoisonError::into_inner);
            scopes
                .get(id)
                .cloned()
                .ok_or_else(|| DeiError::UnknownScope(id.clone()))?
        };
        let mut guard = scope.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut guard))
    }

    /// Removes the scope, returning its final state if it existed.
    pub fn clear(&self, id: &RequestId) -> Option<RequestScope> {
        let removed = self
            .scopes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)?;
        tracing::trace!(request = %id, "request scope cleared");
        let scope = removed.lock().unwrap_or_else(PoisonError::into_inner).clone();
        Some(scope)
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.scopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.scopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn create_fetch_clear_lifecycle() {
        let registry = ScopeRegistry::new();
        let id = RequestId::from("r1");

        registry.create(id.clone(), RequestScope::default()).unwrap();
        assert!(registry.contains(&id));

        registry
            .with_scope(&id, |scope| {
                scope.index.push("a");
                scope.clock.increment("svc");
            })
            .unwrap();
        let snapshot = registry.fetch(&id).unwrap();
        assert_eq!(snapshot.index.to_string(), r#"[["a",1]]"#);
        assert_eq!(snapshot.clock.get("svc"), 1);

        let cleared = registry.clear(&id).unwrap();
        assert_eq!(cleared, snapshot);
        assert!(registry.is_empty());
        assert!(matches!(registry.fetch(&id), Err(DeiError::UnknownScope(_))));
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let registry = ScopeRegistry::new();
        let id = RequestId::from("r1");
        registry.create(id.clone(), RequestScope::default()).unwrap();
        assert!(matches!(
            registry.create(id, RequestScope::default()),
            Err(DeiError::ScopeExists(_))
        ));
    }

    #[test]
    fn cleared_id_can_be_reused_with_fresh_state() {
        let registry = ScopeRegistry::new();
        let id = RequestId::from("worker-1");
        registry.create(id.clone(), RequestScope::default()).unwrap();
        registry.with_scope(&id, |s| s.index.push("stale")).unwrap();
        registry.clear(&id);

        registry.create(id.clone(), RequestScope::default()).unwrap();
        assert!(registry.fetch(&id).unwrap().index.is_empty());
    }

    #[test]
    fn continuing_scope_starts_from_origin_clock() {
        let origin = VectorClock::from_entries([("gateway", 2)]);
        let scope = RequestScope::continuing(ExecutionIndex::new(), Some(origin.clone()));
        assert_eq!(scope.clock, origin);
        assert_eq!(scope.origin_clock, Some(origin));
    }

    #[test]
    fn concurrent_scopes_do_not_observe_each_other() {
        let registry = Arc::new(ScopeRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let id = RequestId::new(format!("r{n}"));
                    registry.create(id.clone(), RequestScope::default()).unwrap();
                    for _ in 0..=n {
                        registry
                            .with_scope(&id, |scope| {
                                scope.index.push("call");
                                scope.index.pop().unwrap();
                                scope.clock.increment("svc");
                            })
                            .unwrap();
                    }
                    registry.clear(&id).unwrap()
                })
            })
            .collect();

        for (n, handle) in handles.into_iter().enumerate() {
            let scope = handle.join().unwrap();
            assert_eq!(scope.clock.get("svc"), n as u64 + 1);
        }
        assert!(registry.is_empty());
    }
}
