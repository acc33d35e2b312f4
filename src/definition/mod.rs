//! Definitions describe how a component is built.
//!
//! Definitions live in the process-wide [`Registry`] and are created and updated through the
//! setter functions in this module. Circuits read them on every resolution, so changes apply to
//! all circuits that have not built the component yet.

use std::any::Any;
use std::sync::Arc;

use wirebox_core::error::TypeMismatch;

use crate::circuit::Circuit;
use crate::context::Context;
use crate::dependencies::Dependencies;
use crate::provider::BoxFuture;
use crate::{Erased, Error, Key, Result};

mod registry;
mod setters;

pub use registry::Registry;
pub use setters::{
    is_wired, set_preconstruct, set_preconstruct_async, set_preloads, set_requires, set_setup,
    set_setup_factory, set_singleton, set_standalone, unwire,
};

/// Type-erased outputs of a dependency list.
pub(crate) type Inputs = Box<dyn Any + Send>;

/// The deferred last step of an async preconstruct, run inside the ambient context.
pub(crate) type Finish = Box<dyn FnOnce() -> Result<Erased> + Send>;

pub(crate) type ConstructFn = Arc<dyn Fn(Inputs, &Context) -> Result<Erased> + Send + Sync>;
pub(crate) type ConstructAsyncFn =
    Arc<dyn Fn(Inputs, Context) -> BoxFuture<'static, Result<Finish>> + Send + Sync>;
pub(crate) type SetupFn = Arc<dyn Fn(Erased) -> BoxFuture<'static, Result<()>> + Send + Sync>;

type TapFn = Arc<dyn Fn(&Context) -> Result<Inputs> + Send + Sync>;
type TapAsyncFn = Arc<dyn Fn(&Context) -> BoxFuture<'static, Result<Inputs>> + Send + Sync>;

/// An ordered list of components resolved together, with its type erased.
#[derive(Clone)]
pub(crate) struct InputList {
    keys: Vec<Key>,
    tap: TapFn,
    tap_async: TapAsyncFn,
}

impl InputList {
    pub(crate) fn of<D>() -> Self
    where
        D: Dependencies,
    {
        Self {
            keys: D::keys(),
            tap: Arc::new(|ctx: &Context| {
                D::tap(ctx).map(|outputs| Box::new(outputs) as Inputs)
            }),
            tap_async: Arc::new(|ctx: &Context| -> BoxFuture<'static, Result<Inputs>> {
                let ctx = ctx.clone();
                Box::pin(async move {
                    D::tap_async(&ctx)
                        .await
                        .map(|outputs| Box::new(outputs) as Inputs)
                })
            }),
        }
    }
}

/// Recovers the typed outputs of dependency list `D`.
pub(crate) fn downcast_inputs<D>(inputs: Inputs) -> Result<D::Output>
where
    D: Dependencies,
{
    inputs
        .downcast::<D::Output>()
        .map(|outputs| *outputs)
        .map_err(|_| {
            Error::other(TypeMismatch {
                expected: Key::of::<D::Output>(),
            })
        })
}

#[derive(Clone)]
pub(crate) enum Preconstruct {
    Sync(ConstructFn),
    Async(ConstructAsyncFn),
}

#[derive(Clone)]
pub(crate) enum Setup {
    Hook(SetupFn),
    Factory(Arc<dyn Fn() -> SetupFn + Send + Sync>),
}

/// [`Definition`] is the wiring metadata of a single component type.
#[derive(Clone)]
pub struct Definition {
    key: Key,
    dependencies: Option<InputList>,
    preloads: Option<InputList>,
    construct: Option<ConstructFn>,
    preconstruct: Option<Preconstruct>,
    setup: Option<Setup>,
    singleton: Option<Circuit>,
}

impl Definition {
    pub(crate) const fn new(key: Key) -> Self {
        Self {
            key,
            dependencies: None,
            preloads: None,
            construct: None,
            preconstruct: None,
            setup: None,
            singleton: None,
        }
    }

    pub const fn key(&self) -> Key {
        self.key
    }

    /// The components resolved before construction, in the order handed to the constructor.
    pub fn dependencies(&self) -> &[Key] {
        self.dependencies
            .as_ref()
            .map(|list| list.keys.as_slice())
            .unwrap_or_default()
    }

    /// The components resolved alongside the dependencies by async resolution only.
    pub fn preloads(&self) -> &[Key] {
        self.preloads
            .as_ref()
            .map(|list| list.keys.as_slice())
            .unwrap_or_default()
    }

    /// Returns `true` if the component can only be built by async resolution.
    pub const fn is_async(&self) -> bool {
        matches!(self.preconstruct, Some(Preconstruct::Async(_))) || self.setup.is_some()
    }

    /// The circuit every resolution of this component is forwarded to.
    pub const fn singleton(&self) -> Option<&Circuit> {
        self.singleton.as_ref()
    }

    pub const fn has_setup(&self) -> bool {
        self.setup.is_some()
    }

    pub const fn has_preconstruct(&self) -> bool {
        self.preconstruct.is_some()
    }

    pub(crate) fn tap_dependencies(&self, ctx: &Context) -> Result<Inputs> {
        match &self.dependencies {
            Some(list) => (list.tap)(ctx),
            None => Ok(Box::new(())),
        }
    }

    pub(crate) fn tap_dependencies_async(
        &self,
        ctx: &Context,
    ) -> BoxFuture<'static, Result<Inputs>> {
        match &self.dependencies {
            Some(list) => (list.tap_async)(ctx),
            None => Box::pin(std::future::ready(Ok(Box::new(()) as Inputs))),
        }
    }

    pub(crate) fn tap_preloads_async(&self, ctx: &Context) -> BoxFuture<'static, Result<Inputs>> {
        match &self.preloads {
            Some(list) => (list.tap_async)(ctx),
            None => Box::pin(std::future::ready(Ok(Box::new(()) as Inputs))),
        }
    }

    pub(crate) const fn preconstruct(&self) -> Option<&Preconstruct> {
        self.preconstruct.as_ref()
    }

    /// Builds the instance synchronously, preferring the preconstruct function.
    pub(crate) fn construct(&self, inputs: Inputs, ctx: &Context) -> Result<Erased> {
        match (&self.preconstruct, &self.construct) {
            (Some(Preconstruct::Sync(preconstruct)), _) => preconstruct(inputs, ctx),
            (Some(Preconstruct::Async(_)), _) => Err(Error::AsyncDependency {
                key: self.key,
                initializing: false,
            }),
            (None, Some(construct)) => construct(inputs, ctx),
            (None, None) => Err(Error::NotConstructible(self.key)),
        }
    }

    /// Returns the setup hook, calling the factory if one was registered.
    pub(crate) fn setup(&self) -> Option<SetupFn> {
        match &self.setup {
            Some(Setup::Hook(hook)) => Some(Arc::clone(hook)),
            Some(Setup::Factory(factory)) => Some(factory()),
            None => None,
        }
    }
}

impl std::fmt::Debug for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Definition")
            .field("key", &self.key)
            .field("dependencies", &self.dependencies())
            .field("preloads", &self.preloads())
            .field("is_async", &self.is_async())
            .field("singleton", &self.singleton)
            .finish_non_exhaustive()
    }
}
