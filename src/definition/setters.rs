//! Functions that wire component types into the global registry.
//!
//! Every setter creates the definition on first use and only touches the fields it is about,
//! so they can be called in any order.

use std::sync::Arc;

use wirebox_core::error::TypeMismatch;

use super::{
    ConstructAsyncFn, ConstructFn, Finish, InputList, Inputs, Preconstruct, Registry, Setup,
    SetupFn, downcast_inputs,
};
use crate::circuit::Circuit;
use crate::component::Component;
use crate::context::Context;
use crate::dependencies::{Construct, Dependencies};
use crate::provider::BoxFuture;
use crate::{Erased, Error, Key, Result};

/// Wires `T` without dependencies, built through [`Construct<()>`].
pub fn set_standalone<T>()
where
    T: Component + Construct<()>,
{
    set_requires::<T, ()>();
}

/// Wires `T` with the dependency list `D`, built through [`Construct<D>`].
///
/// ```
/// use std::sync::Arc;
///
/// use wirebox::{Circuit, Construct, component, set_requires, set_standalone};
///
/// #[derive(Default)]
/// struct Config;
///
/// struct Server {
///     config: Arc<Config>,
/// }
///
/// component!(Config, Server);
///
/// impl Construct<(Config,)> for Server {
///     fn construct((config,): (Arc<Config>,)) -> Self {
///         Self { config }
///     }
/// }
///
/// set_standalone::<Config>();
/// set_requires::<Server, (Config,)>();
///
/// let circuit = Circuit::new();
/// let server = circuit.tap::<Server>().unwrap();
/// assert!(Arc::ptr_eq(&server.config, &circuit.tap::<Config>().unwrap()));
/// ```
pub fn set_requires<T, D>()
where
    T: Component + Construct<D>,
    D: Dependencies,
{
    let construct: ConstructFn = Arc::new(|inputs: Inputs, _ctx: &Context| {
        let dependencies = downcast_inputs::<D>(inputs)?;
        Ok(Erased::new(T::construct(dependencies)))
    });

    Registry::global().set(Key::of::<T>(), move |definition| {
        definition.dependencies = Some(InputList::of::<D>());
        definition.construct = Some(construct);
    });
}

/// Wires `T` to be built by `preconstruct` from the outputs of `D`.
///
/// The preconstruct function runs inside the ambient context of the construction and takes
/// precedence over any constructor registered with [`set_requires`].
pub fn set_preconstruct<T, D, F>(preconstruct: F)
where
    T: Component,
    D: Dependencies,
    F: Fn(D::Output, &Context) -> Result<T> + Send + Sync + 'static,
{
    let preconstruct: ConstructFn = Arc::new(move |inputs: Inputs, ctx: &Context| {
        let dependencies = downcast_inputs::<D>(inputs)?;
        preconstruct(dependencies, ctx).map(Erased::new)
    });

    Registry::global().set(Key::of::<T>(), move |definition| {
        definition.dependencies = Some(InputList::of::<D>());
        definition.preconstruct = Some(Preconstruct::Sync(preconstruct));
    });
}

/// Wires `T` to be built asynchronously by `preconstruct` from the outputs of `D`.
///
/// The future resolves to a closure that finishes the construction. That closure runs inside
/// the ambient context, so it may [`link`](crate::link) further components. Components wired
/// this way can only be resolved through [`Circuit::tap_async`].
pub fn set_preconstruct_async<T, D, F, Fut, C>(preconstruct: F)
where
    T: Component,
    D: Dependencies,
    F: Fn(D::Output, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C>> + Send + 'static,
    C: FnOnce() -> T + Send + 'static,
{
    let preconstruct: ConstructAsyncFn = Arc::new(
        move |inputs: Inputs, ctx: Context| -> BoxFuture<'static, Result<Finish>> {
            let pending =
                downcast_inputs::<D>(inputs).map(|dependencies| preconstruct(dependencies, ctx));
            Box::pin(async move {
                let finish = pending?.await?;
                Ok::<_, Error>(Box::new(move || Ok(Erased::new(finish()))) as Finish)
            })
        },
    );

    Registry::global().set(Key::of::<T>(), move |definition| {
        definition.dependencies = Some(InputList::of::<D>());
        definition.preconstruct = Some(Preconstruct::Async(preconstruct));
    });
}

/// Registers an async hook awaited after `T` is built and before it becomes visible.
///
/// Components with a setup hook can only be resolved through [`Circuit::tap_async`].
pub fn set_setup<T, F, Fut>(setup: F)
where
    T: Component,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let setup = erase_setup::<T, _, _>(setup);
    Registry::global().set(Key::of::<T>(), move |definition| {
        definition.setup = Some(Setup::Hook(setup));
    });
}

/// Registers a factory that returns the setup hook of `T` on every construction.
///
/// This is the shape to use with methods, e.g. `set_setup_factory::<Db, _, _, _>(|| Db::connect)`
/// where `connect` takes `self: Arc<Self>`.
pub fn set_setup_factory<T, F, H, Fut>(factory: F)
where
    T: Component,
    F: Fn() -> H + Send + Sync + 'static,
    H: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let factory = Arc::new(move || erase_setup::<T, _, _>(factory()));
    Registry::global().set(Key::of::<T>(), move |definition| {
        definition.setup = Some(Setup::Factory(factory));
    });
}

/// Registers components that async resolution of `T` builds alongside its dependencies.
///
/// Preloads are not handed to the constructor and are ignored by synchronous resolution.
pub fn set_preloads<T, D>()
where
    T: Component,
    D: Dependencies,
{
    Registry::global().set(Key::of::<T>(), |definition| {
        definition.preloads = Some(InputList::of::<D>());
    });
}

/// Binds `T` to a single circuit, or to the default circuit when `circuit` is `None`.
///
/// Every circuit forwards resolutions of `T` to the bound one.
pub fn set_singleton<T>(circuit: Option<&Circuit>)
where
    T: Component,
{
    let circuit = circuit.map_or_else(|| Circuit::get_default().clone(), Circuit::clone);
    Registry::global().set(Key::of::<T>(), move |definition| {
        definition.singleton = Some(circuit);
    });
}

/// Removes the definition of `T`, returning `true` if one existed.
///
/// Instances already built by circuits are not affected.
pub fn unwire<T>() -> bool
where
    T: Component,
{
    Registry::global().remove(Key::of::<T>())
}

pub fn is_wired<T>() -> bool
where
    T: Component,
{
    Registry::global().contains(Key::of::<T>())
}

fn erase_setup<T, F, Fut>(setup: F) -> SetupFn
where
    T: Component,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |instance: Erased| -> BoxFuture<'static, Result<()>> {
        match instance.downcast::<T>() {
            Ok(instance) => Box::pin(setup(instance)) as BoxFuture<'static, Result<()>>,
            Err(_) => Box::pin(std::future::ready(Err(Error::other(TypeMismatch {
                expected: Key::of::<T>(),
            })))),
        }
    })
}
