//! Resolving several components as a single one.

use std::marker::PhantomData;
use std::sync::Arc;

use wirebox::{Component, Context, Dependencies, Providable, Provider, set_preconstruct};

/// [`Combine`] resolves every component of `D` and hands out the tuple of their outputs.
///
/// The combination is async if any member is, in which case it can only be resolved through
/// [`Circuit::tap_async`](wirebox::Circuit::tap_async).
///
/// ```
/// use wirebox::{Circuit, component, set_standalone};
/// use wirebox_util::Combine;
///
/// #[derive(Default)]
/// struct Config;
///
/// #[derive(Default)]
/// struct Logger;
///
/// component!(Config, Logger);
///
/// set_standalone::<Config>();
/// set_standalone::<Logger>();
/// Combine::<(Config, Logger)>::register();
///
/// let (_config, _logger) = Circuit::new().tap::<Combine<(Config, Logger)>>().unwrap();
/// ```
pub struct Combine<D> {
    is_async: bool,
    _marker: PhantomData<fn() -> D>,
}

impl<D> Combine<D>
where
    D: Dependencies,
    D::Output: Clone + Sync,
{
    pub fn register() {
        set_preconstruct::<Self, (), _>(|(), ctx| {
            Ok(Self {
                is_async: D::is_async(ctx)?,
                _marker: PhantomData,
            })
        });
    }

    pub const fn is_async(&self) -> bool {
        self.is_async
    }
}

impl<D> Component for Combine<D>
where
    D: Dependencies,
    D::Output: Clone + Sync,
{
    type Output = D::Output;

    fn provide(instance: &Arc<Self>) -> Providable<D::Output> {
        let provider = if instance.is_async {
            Provider::from_async(|ctx: &Context| {
                let ctx = ctx.clone();
                async move { D::tap_async(&ctx).await }
            })
        } else {
            Provider::from_fn(D::tap)
        };
        Providable::Provider(provider)
    }
}
