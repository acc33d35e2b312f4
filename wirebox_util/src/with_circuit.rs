//! Resolving a component from a fixed circuit.

use std::marker::PhantomData;
use std::sync::Arc;

use wirebox::{Circuit, Component, Context, Providable, Provider, set_preconstruct};

/// [`CircuitSource`] names a component and the circuit it must be resolved from.
pub trait CircuitSource: 'static {
    type Target: Component;

    fn circuit() -> Circuit;
}

/// [`WithCircuit`] hands out `S::Target` resolved from `S::circuit()`, whichever circuit taps it.
///
/// Unlike a singleton binding, the target keeps its own definition and can still be built in
/// other circuits when tapped directly.
pub struct WithCircuit<S> {
    is_async: bool,
    _marker: PhantomData<fn() -> S>,
}

impl<S> WithCircuit<S>
where
    S: CircuitSource,
{
    pub fn register() {
        set_preconstruct::<Self, (), _>(|(), ctx| {
            Ok(Self {
                is_async: ctx.forward(&S::circuit()).is_async::<S::Target>()?,
                _marker: PhantomData,
            })
        });
    }
}

impl<S> Component for WithCircuit<S>
where
    S: CircuitSource,
{
    type Output = <S::Target as Component>::Output;

    fn provide(instance: &Arc<Self>) -> Providable<Self::Output> {
        let provider = if instance.is_async {
            Provider::from_async(|ctx: &Context| {
                ctx.forward(&S::circuit()).tap_async::<S::Target>()
            })
        } else {
            Provider::from_fn(|ctx: &Context| ctx.forward(&S::circuit()).tap::<S::Target>())
        };
        Providable::Provider(provider)
    }
}
