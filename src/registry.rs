//! Process-wide sharing of compiled masks.
//!
//! Handlers typically reuse a handful of masks across every request. A
//! [`Registry`] caches them behind `Arc`s, keyed by the root struct's
//! qualified name plus a caller-chosen numeric key (a rule ID, a client
//! version, whatever distinguishes masks for the same root shape).
//!
//! Only finished masks go in: build first, register after, so readers can
//! never observe a half-built tree. The same name-spacing means two IDL
//! types reusing a key never collide.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::trace;

use crate::descriptor::StructDescriptor;
use crate::mask::{CompileError, Mask};

/// Shared cache of compiled masks.
///
/// All methods take `&self`; share a registry by reference (or wrap it in
/// an `Arc`) across threads.
///
/// # Example
///
/// ```
/// use fieldmask::{FieldDescriptor, Mask, Registry, StructDescriptor, TypeDescriptor};
///
/// # fn demo() -> Result<(), fieldmask::CompileError> {
/// let descriptor = TypeDescriptor::struct_(StructDescriptor::new(
///     "demo.Base",
///     vec![FieldDescriptor::new(1, "LogID", TypeDescriptor::Scalar)],
/// ));
/// let strukt = descriptor.as_struct().expect("struct root");
///
/// let registry = Registry::new();
/// let mask = registry.lookup_or_register(7, strukt, || {
///     Mask::compile(&descriptor, &["$.LogID"])
/// })?;
/// assert!(mask.field_in_mask(1));
/// assert!(registry.lookup(7, strukt).is_some());
/// # Ok(())
/// # }
/// # demo().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<HashMap<String, HashMap<u64, Arc<Mask>>>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Store a finished mask under `(descriptor, key)`, replacing any
    /// previous entry.
    pub fn register(&self, key: u64, descriptor: &StructDescriptor, mask: Arc<Mask>) {
        if let Ok(mut inner) = self.inner.write() {
            trace!("registering mask {} for {}", key, descriptor.name());
            inner
                .entry(descriptor.name().to_owned())
                .or_default()
                .insert(key, mask);
        }
    }

    /// Fetch a previously registered mask. Unknown pairs are simply
    /// absent, never an error.
    pub fn lookup(&self, key: u64, descriptor: &StructDescriptor) -> Option<Arc<Mask>> {
        let inner = self.inner.read().ok()?;
        inner.get(descriptor.name())?.get(&key).cloned()
    }

    /// Fetch, or build-and-register on first use.
    ///
    /// `build` runs outside the lock, so concurrent first users may race
    /// to build; the first registration wins and every caller gets that
    /// winner back.
    pub fn lookup_or_register<F>(
        &self,
        key: u64,
        descriptor: &StructDescriptor,
        build: F,
    ) -> Result<Arc<Mask>, CompileError>
    where
        F: FnOnce() -> Result<Mask, CompileError>,
    {
        if let Some(found) = self.lookup(key, descriptor) {
            return Ok(found);
        }
        let built = Arc::new(build()?);
        if let Ok(mut inner) = self.inner.write() {
            let winner = inner
                .entry(descriptor.name().to_owned())
                .or_default()
                .entry(key)
                .or_insert_with(|| Arc::clone(&built));
            return Ok(Arc::clone(winner));
        }
        Ok(built)
    }

    /// Registered masks across all root shapes.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldDescriptor, TypeDescriptor};

    fn account() -> TypeDescriptor {
        TypeDescriptor::struct_(StructDescriptor::new(
            "demo.Account",
            vec![
                FieldDescriptor::new(1, "id", TypeDescriptor::Scalar),
                FieldDescriptor::new(2, "email", TypeDescriptor::Scalar),
            ],
        ))
    }

    #[test]
    fn register_then_lookup_returns_the_same_tree() {
        let descriptor = account();
        let strukt = descriptor.as_struct().unwrap();
        let registry = Registry::new();
        assert!(registry.lookup(1, strukt).is_none());

        let mask = Arc::new(Mask::compile(&descriptor, &["$.id"]).unwrap());
        registry.register(1, strukt, Arc::clone(&mask));

        let found = registry.lookup(1, strukt).unwrap();
        assert!(Arc::ptr_eq(&found, &mask));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn keys_are_scoped_by_struct_name() {
        let descriptor = account();
        let strukt = descriptor.as_struct().unwrap();
        let other = StructDescriptor::new("demo.Other", Vec::new());

        let registry = Registry::new();
        let mask = Arc::new(Mask::compile(&descriptor, &["$.id"]).unwrap());
        registry.register(9, strukt, mask);

        assert!(registry.lookup(9, &other).is_none());
        assert!(registry.lookup(9, strukt).is_some());
    }

    #[test]
    fn lookup_or_register_builds_once() {
        let descriptor = account();
        let strukt = descriptor.as_struct().unwrap();
        let registry = Registry::new();
        let mut builds = 0;

        for _ in 0..3 {
            let mask = registry
                .lookup_or_register(4, strukt, || {
                    builds += 1;
                    Mask::compile(&descriptor, &["$.email"])
                })
                .unwrap();
            assert!(mask.field_in_mask(2));
        }
        assert_eq!(builds, 1);
    }

    #[test]
    fn build_failures_are_not_cached() {
        let descriptor = account();
        let strukt = descriptor.as_struct().unwrap();
        let registry = Registry::new();

        let failed =
            registry.lookup_or_register(2, strukt, || Mask::compile(&descriptor, &["$.bogus"]));
        assert!(failed.is_err());
        assert!(registry.lookup(2, strukt).is_none());

        let fixed =
            registry.lookup_or_register(2, strukt, || Mask::compile(&descriptor, &["$.id"]));
        assert!(fixed.is_ok());
    }
}
