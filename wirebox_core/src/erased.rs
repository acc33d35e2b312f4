//! Shared, type-erased component instances.

use std::any::Any;
use std::sync::Arc;

use crate::Key;

/// [`Erased`] is a shared handle to a value whose concrete type has been erased.
///
/// Clones point to the same value, so an instance stored in a circuit and the one handed
/// out to callers are identical.
#[derive(Clone)]
pub struct Erased {
    value: Arc<dyn Any + Send + Sync>,
    key: Key,
}

impl Erased {
    /// Creates a new `Erased` owning `value`.
    #[must_use]
    pub fn new<T>(value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::from_arc(Arc::new(value))
    }

    /// Creates a new `Erased` sharing an existing allocation.
    #[must_use]
    pub fn from_arc<T>(value: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self {
            value,
            key: Key::of::<T>(),
        }
    }

    /// Returns the key of the concrete type.
    pub const fn key(&self) -> Key {
        self.key
    }

    pub fn is<T>(&self) -> bool
    where
        T: 'static,
    {
        self.key.is::<T>()
    }

    /// Tries to downcast `self` into a shared `T`.
    ///
    /// # Errors
    ///
    /// If the underlying value is not of type `T`, this method will return
    /// itself as error.
    pub fn downcast<T>(self) -> Result<Arc<T>, Self>
    where
        T: Send + Sync + 'static,
    {
        let key = self.key;
        self.value
            .downcast::<T>()
            .map_err(|value| Self { value, key })
    }

    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: 'static,
    {
        self.value.downcast_ref::<T>()
    }

    /// Returns `true` if both handles point to the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl std::fmt::Debug for Erased {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Erased")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
