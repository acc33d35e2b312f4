//! Components that stand for another component chosen at construction time.
//!
//! A selector picks one [`Branch`] when the circuit builds the conditional component. The chosen
//! component is then resolved from the same circuit and its output is handed out from then on.
//! Uninstalling the conditional component makes the next tap choose again.

use std::sync::Arc;

use wirebox::{
    BoxFuture, Component, Context, Dependencies, Error, Providable, Result, set_preconstruct,
    set_preconstruct_async,
};

/// [`Branch`] is the component a selector chose, along with how its output becomes the shared
/// output type.
pub struct Branch<O> {
    tap: Box<dyn FnOnce(&Context) -> Result<O> + Send>,
    tap_async: Box<dyn FnOnce(&Context) -> BoxFuture<'static, Result<O>> + Send>,
}

impl<O> Branch<O>
where
    O: Send + 'static,
{
    /// Chooses `T`, turning its output into `O` with `convert`.
    ///
    /// `convert` is usually an unsizing cast, e.g. `|redis| redis as Arc<dyn PubSub>`.
    pub fn to<T>(convert: fn(T::Output) -> O) -> Self
    where
        T: Component,
    {
        Self {
            tap: Box::new(move |ctx: &Context| ctx.tap::<T>().map(convert)),
            tap_async: Box::new(move |ctx: &Context| -> BoxFuture<'static, Result<O>> {
                let pending = ctx.tap_async::<T>();
                Box::pin(async move { pending.await.map(convert) })
            }),
        }
    }

    fn tap(self, ctx: &Context) -> Result<O> {
        (self.tap)(ctx)
    }

    fn tap_async(self, ctx: &Context) -> BoxFuture<'static, Result<O>> {
        (self.tap_async)(ctx)
    }
}

/// [`Select`] chooses a branch synchronously from the outputs of its dependencies.
pub trait Select: 'static {
    type Output: Clone + Send + Sync + 'static;

    type Inputs: Dependencies;

    /// # Errors
    ///
    /// Errors are handed to the caller of the tap.
    fn select(
        inputs: <Self::Inputs as Dependencies>::Output,
        ctx: &Context,
    ) -> Result<Branch<Self::Output>>;
}

/// [`SelectAsync`] chooses a branch asynchronously from the outputs of its dependencies.
pub trait SelectAsync: 'static {
    type Output: Clone + Send + Sync + 'static;

    type Inputs: Dependencies;

    fn select_async(
        inputs: <Self::Inputs as Dependencies>::Output,
        ctx: Context,
    ) -> impl Future<Output = Result<Branch<Self::Output>>> + Send + 'static;
}

/// A component resolved to the branch chosen by `S`.
pub struct Conditional<S>
where
    S: Select,
{
    value: S::Output,
}

impl<S> Conditional<S>
where
    S: Select,
{
    pub fn register() {
        set_preconstruct::<Self, S::Inputs, _>(|inputs, ctx| {
            let branch = S::select(inputs, ctx)?;
            Ok(Self {
                value: branch.tap(ctx)?,
            })
        });
    }
}

impl<S> Component for Conditional<S>
where
    S: Select,
{
    type Output = S::Output;

    fn provide(instance: &Arc<Self>) -> Providable<S::Output> {
        Providable::Value(instance.value.clone())
    }
}

/// A component resolved to the branch chosen asynchronously by `S`.
///
/// It can only be resolved through [`Circuit::tap_async`](wirebox::Circuit::tap_async), and the
/// chosen component is resolved asynchronously as well.
pub struct ConditionalAsync<S>
where
    S: SelectAsync,
{
    value: S::Output,
}

impl<S> ConditionalAsync<S>
where
    S: SelectAsync,
{
    pub fn register() {
        set_preconstruct_async::<Self, S::Inputs, _, _, _>(|inputs, ctx| async move {
            let branch = S::select_async(inputs, ctx.clone()).await?;
            let value = branch.tap_async(&ctx).await?;
            Ok::<_, Error>(move || Self { value })
        });
    }
}

impl<S> Component for ConditionalAsync<S>
where
    S: SelectAsync,
{
    type Output = S::Output;

    fn provide(instance: &Arc<Self>) -> Providable<S::Output> {
        Providable::Value(instance.value.clone())
    }
}
