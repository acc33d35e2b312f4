//! The provider protocol.
//!
//! A cached instance normally is the value callers receive. A component may instead hand out a
//! [`Provider`], which is asked for the value on every tap. Providers marked async can only be
//! read through [`Circuit::tap_async`](crate::Circuit::tap_async).

use std::pin::Pin;
use std::sync::Arc;

use crate::component::Component;
use crate::context::Context;
use crate::{Error, Result};

/// A boxed future that can be sent across threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a component hands out for a cached instance.
pub enum Providable<V> {
    /// The value is available right away.
    Value(V),
    /// The value is computed by a provider on every tap.
    Provider(Provider<V>),
}

/// The value returned by a provider, either already computed or still pending.
pub enum Provided<V> {
    Ready(Result<V>),
    Pending(BoxFuture<'static, Result<V>>),
}

type GetValue<V> = Arc<dyn Fn(&Context) -> Provided<V> + Send + Sync>;

/// [`Provider`] computes a component's value on demand.
pub struct Provider<V> {
    is_async: bool,
    get_value: GetValue<V>,
}

impl<V> Provider<V>
where
    V: Send + 'static,
{
    /// Creates a provider from its raw parts.
    ///
    /// A provider with `is_async` set to `false` must always return [`Provided::Ready`].
    pub fn new<F>(is_async: bool, get_value: F) -> Self
    where
        F: Fn(&Context) -> Provided<V> + Send + Sync + 'static,
    {
        Self {
            is_async,
            get_value: Arc::new(get_value),
        }
    }

    /// Creates a synchronous provider.
    pub fn from_fn<F>(get_value: F) -> Self
    where
        F: Fn(&Context) -> Result<V> + Send + Sync + 'static,
    {
        Self::new(false, move |ctx| Provided::Ready(get_value(ctx)))
    }

    /// Creates an asynchronous provider.
    pub fn from_async<F, Fut>(get_value: F) -> Self
    where
        F: Fn(&Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        Self::new(true, move |ctx| Provided::Pending(Box::pin(get_value(ctx))))
    }
}

impl<V> Provider<V> {
    pub const fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn get_value(&self, ctx: &Context) -> Provided<V> {
        (self.get_value)(ctx)
    }
}

impl<V> Clone for Provider<V> {
    fn clone(&self) -> Self {
        Self {
            is_async: self.is_async,
            get_value: Arc::clone(&self.get_value),
        }
    }
}

impl<V> std::fmt::Debug for Provider<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("is_async", &self.is_async)
            .finish_non_exhaustive()
    }
}

/// Returns `true` if tapping `instance` goes through an async provider.
pub(crate) fn is_async<T>(instance: &Arc<T>) -> bool
where
    T: Component,
{
    matches!(T::provide(instance), Providable::Provider(provider) if provider.is_async())
}

/// Unwraps the value callers see for `instance` without awaiting anything.
pub(crate) fn unwrap<T>(instance: &Arc<T>, ctx: &Context) -> Result<T::Output>
where
    T: Component,
{
    match T::provide(instance) {
        Providable::Value(value) => Ok(value),
        Providable::Provider(provider) if provider.is_async() => Err(Error::AsyncDependency {
            key: ctx.target(),
            initializing: false,
        }),
        Providable::Provider(provider) => match provider.get_value(ctx) {
            Provided::Ready(value) => value,
            Provided::Pending(_) => Err(Error::InvalidProvidable(ctx.target())),
        },
    }
}

/// Unwraps the value callers see for `instance`, awaiting async providers.
pub(crate) async fn unwrap_async<T>(instance: &Arc<T>, ctx: &Context) -> Result<T::Output>
where
    T: Component,
{
    let provider = match T::provide(instance) {
        Providable::Value(value) => return Ok(value),
        Providable::Provider(provider) => provider,
    };

    match provider.get_value(ctx) {
        Provided::Ready(value) => value,
        Provided::Pending(pending) if provider.is_async() => pending.await,
        Provided::Pending(_) => Err(Error::InvalidProvidable(ctx.target())),
    }
}
