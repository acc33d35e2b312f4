//! Error types.

use std::error::Error as StdError;
use std::sync::Arc;

use crate::Key;

/// [`Error`] is an error that can be raised by functions and methods from this library.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The component has no definition in the registry.
    Unwired(Key),
    /// The circuit already holds an instance of the component.
    AlreadyInitialized(Key),
    /// The component needs asynchronous resolution but was requested synchronously.
    AsyncDependency { key: Key, initializing: bool },
    /// The component's provider broke its own contract.
    InvalidProvidable(Key),
    /// The ambient context was requested outside of a construction.
    NoContext(Option<Key>),
    /// The definition has neither a constructor nor a preconstruct function.
    NotConstructible(Key),
    /// The component depends on itself, or its dependency chain grew beyond the circuit's
    /// maximum depth.
    RecursionLimit(Key),
    Other(Arc<dyn StdError + Send + Sync + 'static>),
}

impl Error {
    pub fn unwired<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self::Unwired(Key::of::<T>())
    }

    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::Other(Arc::from(err.into()))
    }

    /// Returns the key of the component this error is about, if any.
    pub const fn key(&self) -> Option<Key> {
        match self {
            Self::Unwired(key)
            | Self::AlreadyInitialized(key)
            | Self::AsyncDependency { key, .. }
            | Self::InvalidProvidable(key)
            | Self::NotConstructible(key)
            | Self::RecursionLimit(key)
            | Self::NoContext(Some(key)) => Some(*key),
            Self::NoContext(None) | Self::Other(_) => None,
        }
    }

    pub const fn is_unwired(&self) -> bool {
        matches!(self, Self::Unwired(_))
    }

    pub fn is_unwired_for<T>(&self) -> bool
    where
        T: ?Sized + 'static,
    {
        matches!(self, Self::Unwired(key) if key.is::<T>())
    }

    pub const fn is_already_initialized(&self) -> bool {
        matches!(self, Self::AlreadyInitialized(_))
    }

    pub const fn is_async_dependency(&self) -> bool {
        matches!(self, Self::AsyncDependency { .. })
    }

    pub const fn is_invalid_providable(&self) -> bool {
        matches!(self, Self::InvalidProvidable(_))
    }

    pub const fn is_no_context(&self) -> bool {
        matches!(self, Self::NoContext(_))
    }

    pub const fn is_not_constructible(&self) -> bool {
        matches!(self, Self::NotConstructible(_))
    }

    pub const fn is_recursion_limit(&self) -> bool {
        matches!(self, Self::RecursionLimit(_))
    }

    pub const fn is_other(&self) -> bool {
        matches!(self, Self::Other(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unwired(key) => write!(f, "`{key}` is not set up for wiring"),
            Self::AlreadyInitialized(key) => write!(f, "`{key}` is already initialized"),
            Self::AsyncDependency { key, initializing } => {
                let state = if *initializing {
                    "currently initializing"
                } else {
                    "not initialized yet"
                };
                write!(f, "`{key}` is async and {state}, use `tap_async` instead")
            }
            Self::InvalidProvidable(key) => write!(f, "`{key}` is not a valid providable"),
            Self::NoContext(Some(key)) => write!(
                f,
                "`{key}` cannot be linked outside of a construction, the circuit cannot be determined"
            ),
            Self::NoContext(None) => f.write_str("no construction is in progress on this thread"),
            Self::NotConstructible(key) => {
                write!(f, "`{key}` has no constructor or preconstruct function")
            }
            Self::RecursionLimit(key) => {
                write!(f, "`{key}` depends on itself or exceeds the maximum dependency depth")
            }
            Self::Other(error) => error.fmt(f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Other(error) => Some(error),
            _ => None,
        }
    }
}

/// [`TypeMismatch`] reports a value that does not have the type its definition promised.
#[derive(Debug, Clone, Copy)]
pub struct TypeMismatch {
    pub expected: Key,
}

impl std::fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "value is not of the expected type `{}`", self.expected)
    }
}

impl StdError for TypeMismatch {}

/// [`Result`] is an alias to [`core::result::Result`] with [`Error`] as the
/// default error type.
pub type Result<T, E = Error> = core::result::Result<T, E>;
