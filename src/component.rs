//! Traits implemented by components.
//!
//! A component is a type the circuit can build once and share. What callers receive when they
//! tap it is decided by [`Component::provide`]: usually the shared instance itself, sometimes a
//! value computed through a [`Provider`](crate::provider::Provider).

use std::sync::Arc;

use crate::provider::Providable;

/// [`Component`] is implemented by every type that can be resolved from a
/// [`Circuit`](crate::Circuit).
///
/// In most cases, you don't need to implement this trait manually. The [`component!`] macro
/// implements it for types that hand out their own shared instance.
pub trait Component: Send + Sync + 'static {
    /// The value handed to callers that tap this component.
    type Output: Clone + Send + Sync + 'static;

    /// Turns the cached instance into what callers observe.
    ///
    /// Returning [`Providable::Provider`] redirects resolution to the provider every time the
    /// component is tapped, while the instance itself stays cached.
    fn provide(instance: &Arc<Self>) -> Providable<Self::Output>;
}

/// Implements [`Component`] for types whose callers receive the shared instance as `Arc<Self>`.
///
/// ```
/// struct Database;
///
/// wirebox::component!(Database);
/// ```
#[macro_export]
macro_rules! component {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Component for $ty {
                type Output = ::std::sync::Arc<$ty>;

                fn provide(instance: &::std::sync::Arc<Self>) -> $crate::Providable<Self::Output> {
                    $crate::Providable::Value(::std::sync::Arc::clone(instance))
                }
            }
        )+
    };
}
