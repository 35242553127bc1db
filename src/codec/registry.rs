//! Type Registry Module
//!
//! Append-only record of the value types a serializer has encoded.

use std::any::{type_name, TypeId};

use dashmap::DashMap;

// == Type Registry ==
/// Maps type tags to the Rust types that produced them.
///
/// Owned by one serializer instance. Entries are only ever added.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: DashMap<&'static str, TypeId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tag for `T`, registering it on first use.
    pub fn register<T: 'static>(&self) -> &'static str {
        let tag = type_name::<T>();
        self.types.entry(tag).or_insert_with(TypeId::of::<T>);
        tag
    }

    /// True when `tag` was registered by exactly the type `T`.
    pub fn matches<T: 'static>(&self, tag: &str) -> bool {
        self.types
            .get(tag)
            .map(|entry| *entry.value() == TypeId::of::<T>())
            .unwrap_or(false)
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.types.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let registry = TypeRegistry::new();
        let a = registry.register::<String>();
        let b = registry.register::<String>();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_matches_only_registering_type() {
        let registry = TypeRegistry::new();
        let tag = registry.register::<u32>();
        assert!(registry.matches::<u32>(tag));
        assert!(!registry.matches::<i64>(tag));
        assert!(!registry.matches::<u32>("unknown"));
    }

    #[test]
    fn test_registries_are_independent() {
        let first = TypeRegistry::new();
        let second = TypeRegistry::new();
        let tag = first.register::<bool>();
        assert!(first.is_registered(tag));
        assert!(!second.is_registered(tag));
    }
}
