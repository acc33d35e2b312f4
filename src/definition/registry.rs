use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use super::Definition;
use crate::Key;

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// [`Registry`] maps component keys to their [`Definition`].
///
/// Definitions are stored behind [`Arc`] and replaced as a whole on every update, so a
/// resolution that already read a definition is not affected by later changes.
#[derive(Debug, Default)]
pub struct Registry {
    definitions: RwLock<HashMap<Key, Arc<Definition>>>,
}

impl Registry {
    /// Creates a new, empty [`Registry`].
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry used by every circuit.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    pub fn get(&self, key: Key) -> Option<Arc<Definition>> {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Returns the definition of `key`, registering an empty one if none exists.
    pub fn get_or_create(&self, key: Key) -> Arc<Definition> {
        if let Some(definition) = self.get(key) {
            return definition;
        }

        let mut definitions = self
            .definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // Another thread may have registered it between the two locks.
        Arc::clone(
            definitions
                .entry(key)
                .or_insert_with(|| Arc::new(Definition::new(key))),
        )
    }

    /// Updates the definition of `key`, registering it first if needed.
    pub fn set<F>(&self, key: Key, update: F) -> Arc<Definition>
    where
        F: FnOnce(&mut Definition),
    {
        let mut definitions = self
            .definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let mut definition = definitions
            .get(&key)
            .map_or_else(|| Definition::new(key), |definition| Definition::clone(definition));
        update(&mut definition);

        let definition = Arc::new(definition);
        definitions.insert(key, Arc::clone(&definition));
        definition
    }

    /// Removes the definition of `key`, returning `true` if one existed.
    pub fn remove(&self, key: Key) -> bool {
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
            .is_some()
    }

    pub fn contains(&self, key: Key) -> bool {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }
}
