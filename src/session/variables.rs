//! Variable reference registry
//!
//! Hands out integer handles for engine values so the client can ask for
//! a value's children later. Temporary handles live until the next stop;
//! permanent handles live for the whole session. The class of a handle is
//! decided by its numeric range alone.

use std::collections::HashMap;

use crate::engine::FrameScopes;

/// Reserved reference for the "Locals" scope
pub const VARREF_LOCALS: i64 = 1;
/// Reserved reference for the "Globals" scope
pub const VARREF_GLOBALS: i64 = 2;
/// Reserved reference for the "Registers" scope
pub const VARREF_REGS: i64 = 3;
/// First handle available for temporary values
pub const VARREF_FIRST_VAR_IDX: i64 = 4;
/// First permanent handle; every temporary handle is strictly below it
pub const PERMANENT_START: i64 = 1 << 32;

pub struct VariableRegistry<V> {
    next_temporary: i64,
    next_permanent: i64,
    temporary: HashMap<i64, V>,
    permanent: HashMap<i64, V>,
    scopes: FrameScopes<V>,
}

impl<V> Default for VariableRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> VariableRegistry<V> {
    pub fn new() -> Self {
        Self {
            next_temporary: VARREF_FIRST_VAR_IDX,
            next_permanent: PERMANENT_START,
            temporary: HashMap::new(),
            permanent: HashMap::new(),
            scopes: FrameScopes::default(),
        }
    }

    pub fn is_permanent(handle: i64) -> bool {
        handle >= PERMANENT_START
    }

    /// Store a value and return its new handle
    pub fn insert(&mut self, value: V, permanent: bool) -> i64 {
        if permanent {
            let handle = self.next_permanent;
            self.next_permanent += 1;
            self.permanent.insert(handle, value);
            handle
        } else {
            let handle = self.next_temporary;
            assert!(
                handle < PERMANENT_START,
                "temporary variable references exhausted"
            );
            self.next_temporary += 1;
            self.temporary.insert(handle, value);
            handle
        }
    }

    /// Look up a handle; stale and unknown handles resolve to `None`
    pub fn resolve(&self, handle: i64) -> Option<&V> {
        if Self::is_permanent(handle) {
            self.permanent.get(&handle)
        } else {
            self.temporary.get(&handle)
        }
    }

    /// Replace the scope tables with the variables of the selected frame
    pub fn set_scopes(&mut self, scopes: FrameScopes<V>) {
        self.scopes = scopes;
    }

    /// Values of one of the reserved scope references
    pub fn scope(&self, reference: i64) -> Option<&[V]> {
        match reference {
            VARREF_LOCALS => Some(&self.scopes.locals),
            VARREF_GLOBALS => Some(&self.scopes.globals),
            VARREF_REGS => Some(&self.scopes.registers),
            _ => None,
        }
    }

    pub fn scopes(&self) -> &FrameScopes<V> {
        &self.scopes
    }

    /// Forget everything tied to the previous stop
    ///
    /// Counters keep going so a stale handle can never alias a new value.
    pub fn clear(&mut self) {
        self.temporary.clear();
        self.scopes = FrameScopes::default();
    }

    pub fn temporary_len(&self) -> usize {
        self.temporary.len()
    }

    pub fn permanent_len(&self) -> usize {
        self.permanent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_handle_goes_stale_after_clear() {
        let mut registry = VariableRegistry::new();
        let handle = registry.insert("x", false);
        assert_eq!(registry.resolve(handle), Some(&"x"));

        registry.clear();
        assert_eq!(registry.resolve(handle), None);
        assert_eq!(registry.temporary_len(), 0);
    }

    #[test]
    fn test_permanent_handle_survives_clear() {
        let mut registry = VariableRegistry::new();
        let handle = registry.insert("global", true);
        assert!(VariableRegistry::<&str>::is_permanent(handle));

        for _ in 0..3 {
            registry.clear();
        }
        assert_eq!(registry.resolve(handle), Some(&"global"));
        assert_eq!(registry.permanent_len(), 1);
    }

    #[test]
    fn test_handles_are_never_reused() {
        let mut registry = VariableRegistry::new();
        let first = registry.insert(1, false);
        registry.clear();
        let second = registry.insert(2, false);

        assert_ne!(first, second);
        assert_eq!(registry.resolve(first), None);
        assert_eq!(registry.resolve(second), Some(&2));
    }

    #[test]
    fn test_classes_are_disjoint() {
        let mut registry = VariableRegistry::new();
        let mut temporaries = Vec::new();
        for i in 0..1000 {
            temporaries.push(registry.insert(i, false));
            if i % 100 == 0 {
                registry.clear();
            }
        }
        let permanent = registry.insert(-1, true);

        assert_eq!(temporaries[0], VARREF_FIRST_VAR_IDX);
        assert!(temporaries
            .iter()
            .all(|h| !VariableRegistry::<i32>::is_permanent(*h)));
        assert_eq!(permanent, PERMANENT_START);
    }

    #[test]
    fn test_scope_tables_are_cleared() {
        let mut registry = VariableRegistry::new();
        registry.set_scopes(FrameScopes {
            locals: vec!["a", "b"],
            globals: vec!["g"],
            registers: vec![],
        });
        assert_eq!(registry.scope(VARREF_LOCALS).map(<[_]>::len), Some(2));
        assert_eq!(registry.scope(VARREF_GLOBALS).map(<[_]>::len), Some(1));
        assert_eq!(registry.scope(42), None);

        registry.clear();
        assert_eq!(registry.scope(VARREF_LOCALS).map(<[_]>::len), Some(0));
    }

    #[test]
    fn test_unknown_handle_is_absent() {
        let registry: VariableRegistry<()> = VariableRegistry::new();
        assert!(registry.resolve(99).is_none());
        assert!(registry.resolve(PERMANENT_START + 5).is_none());
    }
}
