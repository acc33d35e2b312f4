//! Components whose callers receive a produced value instead of the component itself.
//!
//! The value is described by a type implementing [`Produce`] or [`ProduceAsync`]. Wrapping it in
//! one of the components below decides when the value is computed:
//!
//! | component           | computed                                  |
//! |---------------------|-------------------------------------------|
//! | [`Value`]           | once per circuit, when the circuit builds it |
//! | [`Dynamic`]         | on every tap                              |
//! | [`AsyncValue`]      | once per circuit, on the first async tap  |
//! | [`AsyncDynamic`]    | on every async tap                        |

use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::OnceCell;
use wirebox::{Component, Context, Providable, Provider, Result, set_preconstruct, set_standalone};

/// [`Produce`] computes a value synchronously.
pub trait Produce: 'static {
    type Output: Clone + Send + Sync + 'static;

    /// Computes the value. `ctx` describes the resolution asking for it.
    ///
    /// # Errors
    ///
    /// Errors are handed to the caller of the tap.
    fn produce(ctx: &Context) -> Result<Self::Output>;
}

/// [`ProduceAsync`] computes a value asynchronously.
pub trait ProduceAsync: 'static {
    type Output: Clone + Send + Sync + 'static;

    /// Computes the value. `ctx` describes the resolution asking for it.
    fn produce_async(ctx: Context)
    -> impl Future<Output = Result<Self::Output>> + Send + 'static;
}

/// A value produced once, when the circuit builds this component.
///
/// ```
/// use wirebox::{Circuit, Context, Result};
/// use wirebox_util::{Produce, Value};
///
/// struct Port;
///
/// impl Produce for Port {
///     type Output = u16;
///
///     fn produce(_: &Context) -> Result<u16> {
///         Ok(8080)
///     }
/// }
///
/// Value::<Port>::register();
///
/// assert_eq!(Circuit::new().tap::<Value<Port>>().unwrap(), 8080);
/// ```
pub struct Value<P>
where
    P: Produce,
{
    value: P::Output,
}

impl<P> Value<P>
where
    P: Produce,
{
    /// Wires the component so that each circuit produces the value once.
    pub fn register() {
        set_preconstruct::<Self, (), _>(|(), ctx| {
            Ok(Self {
                value: P::produce(ctx)?,
            })
        });
    }
}

impl<P> Component for Value<P>
where
    P: Produce,
{
    type Output = P::Output;

    fn provide(instance: &Arc<Self>) -> Providable<P::Output> {
        Providable::Value(instance.value.clone())
    }
}

/// A value produced again on every tap.
pub struct Dynamic<P> {
    _marker: PhantomData<fn() -> P>,
}

impl<P> Default for Dynamic<P> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<P> Dynamic<P>
where
    P: Produce,
{
    pub fn register() {
        set_standalone::<Self>();
    }
}

impl<P> Component for Dynamic<P>
where
    P: Produce,
{
    type Output = P::Output;

    fn provide(_instance: &Arc<Self>) -> Providable<P::Output> {
        Providable::Provider(Provider::from_fn(P::produce))
    }
}

/// A value produced asynchronously on the first async tap, then shared.
///
/// Synchronous taps fail with [`Error::AsyncDependency`](wirebox::Error::AsyncDependency). A
/// failed production is not cached, the next tap tries again.
pub struct AsyncValue<P>
where
    P: ProduceAsync,
{
    cell: OnceCell<P::Output>,
}

impl<P> Default for AsyncValue<P>
where
    P: ProduceAsync,
{
    fn default() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }
}

impl<P> AsyncValue<P>
where
    P: ProduceAsync,
{
    pub fn register() {
        set_standalone::<Self>();
    }
}

impl<P> Component for AsyncValue<P>
where
    P: ProduceAsync,
{
    type Output = P::Output;

    fn provide(instance: &Arc<Self>) -> Providable<P::Output> {
        let instance = Arc::clone(instance);
        Providable::Provider(Provider::from_async(move |ctx: &Context| {
            let instance = Arc::clone(&instance);
            let ctx = ctx.clone();
            async move {
                instance
                    .cell
                    .get_or_try_init(|| P::produce_async(ctx))
                    .await
                    .cloned()
            }
        }))
    }
}

/// A value produced asynchronously on every async tap.
pub struct AsyncDynamic<P> {
    _marker: PhantomData<fn() -> P>,
}

impl<P> Default for AsyncDynamic<P> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<P> AsyncDynamic<P>
where
    P: ProduceAsync,
{
    pub fn register() {
        set_standalone::<Self>();
    }
}

impl<P> Component for AsyncDynamic<P>
where
    P: ProduceAsync,
{
    type Output = P::Output;

    fn provide(_instance: &Arc<Self>) -> Providable<P::Output> {
        Providable::Provider(Provider::from_async(|ctx: &Context| {
            P::produce_async(ctx.clone())
        }))
    }
}
