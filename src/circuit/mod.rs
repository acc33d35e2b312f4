//! The [`Circuit`] container.
//!
//! A circuit caches at most one instance per component type. Synchronous resolution builds
//! missing components on the spot. Asynchronous resolution additionally runs async
//! preconstruct functions and setup hooks, and makes sure concurrent requests for the same
//! component share a single construction.

mod flight;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use once_cell::sync::Lazy;
use wirebox_core::error::TypeMismatch;

use self::flight::{Flight, FlightWatch};
use crate::component::Component;
use crate::context::{self, Context};
use crate::definition::{Definition, Preconstruct, Registry};
use crate::provider::{self, BoxFuture, Providable};
use crate::{Erased, Error, Key, Result};

/// The maximum dependency depth of circuits built without [`CircuitBuilder::max_depth`].
pub const DEFAULT_MAX_DEPTH: usize = 128;

static DEFAULT: Lazy<Circuit> = Lazy::new(Circuit::new);

wirebox_core::def_try_join_fn!(fn try_join_inputs; T1, T2);

/// [`Circuit`] holds component instances and resolves them on demand.
///
/// Cloning a circuit yields another handle to the same container.
#[derive(Clone)]
pub struct Circuit {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    max_depth: usize,
}

#[derive(Default)]
struct State {
    instances: HashMap<Key, Slot>,
    in_flight: HashMap<Key, FlightWatch>,
}

enum Slot {
    Instance(Erased),
    // The circuit itself, held weakly so it does not keep itself alive.
    Circuit(Weak<Inner>),
}

impl Slot {
    fn instance(&self) -> Option<Erased> {
        match self {
            Self::Instance(instance) => Some(instance.clone()),
            Self::Circuit(inner) => inner.upgrade().map(|inner| Erased::new(Circuit { inner })),
        }
    }
}

impl State {
    fn new(circuit: Weak<Inner>) -> Self {
        let mut state = Self::default();
        state
            .instances
            .insert(Key::of::<Circuit>(), Slot::Circuit(circuit));
        state
    }

    fn instance(&self, key: Key) -> Option<Erased> {
        self.instances.get(&key).and_then(Slot::instance)
    }

    fn commit(&mut self, key: Key, instance: Erased) -> Result<Erased> {
        if self.instances.contains_key(&key) {
            return Err(Error::AlreadyInitialized(key));
        }

        self.instances.insert(key, Slot::Instance(instance.clone()));
        Ok(instance)
    }
}

enum Claim {
    Ready(Erased),
    Wait(FlightWatch),
    Lead(Lead, Arc<Definition>),
    Unwired,
}

/// Leadership over an async construction.
///
/// Dropping it without settling removes the in-flight entry, so the next resolution starts a
/// fresh construction.
struct Lead {
    circuit: Circuit,
    key: Key,
    flight: Flight,
    settled: bool,
}

impl Lead {
    /// Commits a successful construction and publishes the outcome to every waiter.
    fn settle(mut self, result: Result<Erased>) -> Result<()> {
        self.settled = true;

        let result = {
            let mut state = self.circuit.state();
            state.in_flight.remove(&self.key);
            result.and_then(|instance| state.commit(self.key, instance))
        };

        trace!(component = %self.key, ok = result.is_ok(), "async construction settled");
        self.flight.settle(result.clone());
        result.map(|_instance| ())
    }
}

impl Drop for Lead {
    fn drop(&mut self) {
        if !self.settled {
            warn!(component = %self.key, "async construction abandoned");
            self.circuit.state().in_flight.remove(&self.key);
        }
    }
}

impl Circuit {
    /// Creates a new, empty [`Circuit`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub const fn builder() -> CircuitBuilder {
        CircuitBuilder {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Returns the process-wide default circuit.
    pub fn get_default() -> &'static Self {
        &DEFAULT
    }

    /// Returns `true` if both handles refer to the same circuit.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn max_depth(&self) -> usize {
        self.inner.max_depth
    }

    /// Synchronously resolves `T`, building it and its dependencies if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unwired`] if `T` or a dependency has no definition, and
    /// [`Error::AsyncDependency`] if `T` or a dependency needs async resolution.
    /// Errors raised by constructors and providers are returned as is.
    pub fn tap<T>(&self) -> Result<T::Output>
    where
        T: Component,
    {
        Self::resolve::<T>(&self.context::<T>())
    }

    /// Asynchronously resolves `T`, building it and its dependencies if needed.
    ///
    /// Concurrent calls for the same component share a single construction. A failed
    /// construction is not cached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unwired`] if `T` or a dependency has no definition. Errors raised by
    /// constructors, setup hooks and providers are returned as is.
    pub async fn tap_async<T>(&self) -> Result<T::Output>
    where
        T: Component,
    {
        Self::resolve_async::<T>(self.context::<T>()).await
    }

    /// Stores `instance` as the instance of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyInitialized`] if the circuit already holds an instance of `T`, and
    /// [`Error::AsyncDependency`] while an async construction of `T` is in flight.
    pub fn install<T>(&self, instance: Arc<T>) -> Result<Arc<T>>
    where
        T: Component,
    {
        let key = Key::of::<T>();
        let mut state = self.state();
        if state.in_flight.contains_key(&key) {
            return Err(Error::AsyncDependency {
                key,
                initializing: true,
            });
        }
        state.commit(key, Erased::from_arc(Arc::clone(&instance)))?;
        drop(state);
        trace!(component = %key, "instance installed");
        Ok(instance)
    }

    /// Removes the instance of `T`, returning it if there was one.
    pub fn uninstall<T>(&self) -> Option<Arc<T>>
    where
        T: Component,
    {
        let key = Key::of::<T>();
        let slot = self.state().instances.remove(&key)?;
        trace!(component = %key, "instance uninstalled");
        slot.instance()?.downcast::<T>().ok()
    }

    pub fn is_installed<T>(&self) -> bool
    where
        T: Component,
    {
        self.state().instances.contains_key(&Key::of::<T>())
    }

    /// Returns the cached instance of `T` without building it.
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: Component,
    {
        let instance = self.state().instance(Key::of::<T>())?;
        instance.downcast::<T>().ok()
    }

    /// Returns `true` while an async construction of `T` is in flight.
    pub fn is_initializing<T>(&self) -> bool
    where
        T: Component,
    {
        self.state().in_flight.contains_key(&Key::of::<T>())
    }

    /// Returns `true` if `T` can only be resolved through [`tap_async`](Self::tap_async).
    ///
    /// A component wired for synchronous construction is built to find out whether its
    /// provider or one of its dependencies is async.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`tap`](Self::tap), except [`Error::AsyncDependency`].
    pub fn is_async<T>(&self) -> Result<bool>
    where
        T: Component,
    {
        Self::check_async::<T>(&self.context::<T>())
    }

    /// Decides whether `T` needs async resolution, building it within `ctx` if needed.
    pub(crate) fn check_async<T>(ctx: &Context) -> Result<bool>
    where
        T: Component,
    {
        if Registry::global()
            .get(ctx.target())
            .is_some_and(|definition| definition.is_async())
        {
            return Ok(true);
        }

        match Self::instantiate::<T>(ctx) {
            Ok((instance, _)) => Ok(provider::is_async(&instance)),
            Err(Error::AsyncDependency { .. }) => Ok(true),
            Err(err) => Err(err),
        }
    }

    fn context<T>(&self) -> Context
    where
        T: Component,
    {
        Context::new(self.clone(), Key::of::<T>())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the circuit resolutions must be forwarded to, if it is not this one.
    fn forward_target<'a>(&self, definition: Option<&'a Definition>) -> Option<&'a Self> {
        definition
            .and_then(Definition::singleton)
            .filter(|owner| !owner.ptr_eq(self))
    }

    fn check_depth(&self, ctx: &Context) -> Result<()> {
        if ctx.depth() > self.inner.max_depth {
            warn!(
                component = %ctx.target(),
                depth = ctx.depth(),
                "maximum dependency depth exceeded"
            );
            return Err(Error::RecursionLimit(ctx.target()));
        }

        Ok(())
    }

    fn claim(&self, key: Key, definition: Option<Arc<Definition>>) -> Claim {
        let mut state = self.state();

        if let Some(instance) = state.instance(key) {
            return Claim::Ready(instance);
        }

        if let Some(watch) = state.in_flight.get(&key) {
            return Claim::Wait(watch.clone());
        }

        let Some(definition) = definition else {
            return Claim::Unwired;
        };

        let flight = Flight::new();
        state.in_flight.insert(key, flight.watch());
        drop(state);
        trace!(component = %key, "async construction started");

        let lead = Lead {
            circuit: self.clone(),
            key,
            flight,
            settled: false,
        };
        Claim::Lead(lead, definition)
    }

    pub(crate) fn resolve<T>(ctx: &Context) -> Result<T::Output>
    where
        T: Component,
    {
        let (instance, ctx) = Self::instantiate::<T>(ctx)?;
        provider::unwrap(&instance, &ctx)
    }

    /// Returns the instance of `T` and the context it was resolved in, building it
    /// synchronously if needed.
    fn instantiate<T>(ctx: &Context) -> Result<(Arc<T>, Context)>
    where
        T: Component,
    {
        let circuit = ctx.circuit();
        let key = ctx.target();

        if let Some(instance) = circuit.get::<T>() {
            return Ok((instance, ctx.clone()));
        }

        let definition = Registry::global().get(key);
        if let Some(owner) = circuit.forward_target(definition.as_deref()) {
            trace!(component = %key, "forwarding to singleton circuit");
            return Self::instantiate::<T>(&ctx.forward(owner));
        }

        if circuit.state().in_flight.contains_key(&key) {
            return Err(Error::AsyncDependency {
                key,
                initializing: true,
            });
        }

        let definition = definition.ok_or(Error::Unwired(key))?;
        if definition.is_async() {
            return Err(Error::AsyncDependency {
                key,
                initializing: false,
            });
        }

        circuit.check_depth(ctx)?;
        trace!(component = %key, depth = ctx.depth(), "constructing");

        let inputs = definition.tap_dependencies(ctx)?;
        let instance = context::scope(ctx, || definition.construct(inputs, ctx))?;
        let instance = circuit.state().commit(key, instance)?;

        Ok((downcast::<T>(instance)?, ctx.clone()))
    }

    pub(crate) fn resolve_async<T>(ctx: Context) -> BoxFuture<'static, Result<T::Output>>
    where
        T: Component,
    {
        Box::pin(async move {
            loop {
                let circuit = ctx.circuit().clone();
                let key = ctx.target();

                if let Some(instance) = circuit.get::<T>() {
                    return provider::unwrap_async(&instance, &ctx).await;
                }

                let definition = Registry::global().get(key);
                if let Some(owner) = circuit.forward_target(definition.as_deref()) {
                    trace!(component = %key, "forwarding to singleton circuit");
                    return Self::resolve_async::<T>(ctx.forward(owner)).await;
                }

                match circuit.claim(key, definition) {
                    Claim::Ready(instance) => {
                        return provider::unwrap_async(&downcast::<T>(instance)?, &ctx).await;
                    }
                    Claim::Wait(_) if ctx.is_resolving(&circuit, key) => {
                        return Err(Error::RecursionLimit(key));
                    }
                    Claim::Wait(watch) => {
                        trace!(component = %key, "waiting for construction in flight");
                        match watch.wait().await {
                            Some(Ok(instance)) => {
                                let instance = downcast::<T>(instance)?;
                                return provider::unwrap_async(&instance, &ctx).await;
                            }
                            Some(Err(err)) => return Err(err),
                            None => debug!(component = %key, "retrying abandoned construction"),
                        }
                    }
                    Claim::Unwired => return Err(Error::Unwired(key)),
                    Claim::Lead(lead, definition) => {
                        let outcome = Self::lead::<T>(&definition, &ctx).await;
                        let committed = lead.settle(
                            outcome
                                .as_ref()
                                .map(|(instance, _)| instance.clone())
                                .map_err(Error::clone),
                        );
                        return committed.and(outcome.map(|(_, value)| value));
                    }
                }
            }
        })
    }

    /// Builds `T` and unwraps its value. Nothing is committed here, so a failure at any step
    /// leaves the circuit untouched.
    async fn lead<T>(definition: &Definition, ctx: &Context) -> Result<(Erased, T::Output)>
    where
        T: Component,
    {
        let instance = Self::build(definition, ctx).await?;
        let value = provider::unwrap_async(&downcast::<T>(instance.clone())?, ctx).await?;
        Ok((instance, value))
    }

    async fn build(definition: &Definition, ctx: &Context) -> Result<Erased> {
        ctx.circuit().check_depth(ctx)?;
        debug!(component = %ctx.target(), depth = ctx.depth(), "constructing asynchronously");

        let (inputs, _preloads) = try_join_inputs(
            definition.tap_dependencies_async(ctx),
            definition.tap_preloads_async(ctx),
        )
        .await?;

        let instance = match definition.preconstruct() {
            Some(Preconstruct::Async(preconstruct)) => {
                let finish = preconstruct(inputs, ctx.clone()).await?;
                context::scope(ctx, finish)?
            }
            _ => context::scope(ctx, || definition.construct(inputs, ctx))?,
        };

        if let Some(setup) = definition.setup() {
            trace!(component = %ctx.target(), "running setup");
            setup(instance.clone()).await?;
        }

        Ok(instance)
    }
}

fn downcast<T>(instance: Erased) -> Result<Arc<T>>
where
    T: Component,
{
    instance.downcast::<T>().map_err(|_| {
        Error::other(TypeMismatch {
            expected: Key::of::<T>(),
        })
    })
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Circuit {
    type Output = Self;

    fn provide(instance: &Arc<Self>) -> Providable<Self> {
        Providable::Value(Self::clone(instance))
    }
}

impl std::fmt::Debug for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Circuit")
            .field("id", &Arc::as_ptr(&self.inner))
            .field("max_depth", &self.inner.max_depth)
            .finish_non_exhaustive()
    }
}

/// A builder to create a [`Circuit`].
#[derive(Debug, Clone)]
pub struct CircuitBuilder {
    max_depth: usize,
}

impl CircuitBuilder {
    /// Sets the maximum number of dependency edges a resolution may follow.
    #[must_use]
    pub const fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn build(self) -> Circuit {
        let inner = Arc::new_cyclic(|weak| Inner {
            state: Mutex::new(State::new(weak.clone())),
            max_depth: self.max_depth,
        });
        Circuit { inner }
    }
}

/// Synchronously resolves `T` from the default circuit.
///
/// # Errors
///
/// See [`Circuit::tap`].
pub fn tap<T>() -> Result<T::Output>
where
    T: Component,
{
    Circuit::get_default().tap::<T>()
}

/// Asynchronously resolves `T` from the default circuit.
///
/// # Errors
///
/// See [`Circuit::tap_async`].
pub async fn tap_async<T>() -> Result<T::Output>
where
    T: Component,
{
    Circuit::get_default().tap_async::<T>().await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::time::{Instant, sleep, timeout};

    use super::{Circuit, tap};
    use crate::definition::{
        set_preconstruct, set_preconstruct_async, set_preloads, set_requires, set_setup,
        set_singleton, set_standalone,
    };
    use crate::{
        Component, Construct, Error, Key, Providable, Provider, Registry, component,
        current_context, link,
    };

    const TIMEOUT: Duration = Duration::from_millis(500);

    /// Wires `T` with an async preconstruct that sleeps for `delay`, counting its calls.
    fn wire_slow<T>(delay: Duration, build: fn() -> T) -> Arc<AtomicUsize>
    where
        T: Component,
    {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        set_preconstruct_async::<T, (), _, _, _>(move |(), _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                sleep(delay).await;
                Ok::<_, Error>(build)
            }
        });
        calls
    }

    #[derive(Debug, Default)]
    struct Standalone;

    #[derive(Debug, Default)]
    struct Leaf;

    #[derive(Debug)]
    struct Branch {
        leaf: Arc<Leaf>,
    }

    #[derive(Debug)]
    struct Ghost;

    #[derive(Debug)]
    struct Haunted;

    #[derive(Debug)]
    struct Bare;

    #[derive(Debug, Default)]
    struct Settings {
        name: &'static str,
    }

    #[derive(Debug, Default)]
    struct Global;

    #[derive(Debug, Default)]
    struct Pool;

    #[derive(Debug)]
    struct Bound {
        circuit: Circuit,
    }

    component!(Standalone, Leaf, Branch, Ghost, Haunted, Bare, Settings, Global, Pool, Bound);

    impl Construct<(Leaf,)> for Branch {
        fn construct((leaf,): (Arc<Leaf>,)) -> Self {
            Self { leaf }
        }
    }

    impl Construct<(Ghost,)> for Haunted {
        fn construct(_: (Arc<Ghost>,)) -> Self {
            Self
        }
    }

    #[test]
    fn test_tap_builds_once() {
        set_standalone::<Standalone>();
        let circuit = Circuit::new();
        assert!(!circuit.is_installed::<Standalone>());
        assert!(circuit.get::<Standalone>().is_none());

        let a = circuit.tap::<Standalone>().unwrap();
        let b = circuit.tap::<Standalone>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(circuit.is_installed::<Standalone>());
        assert!(Arc::ptr_eq(&a, &circuit.get::<Standalone>().unwrap()));

        let other = Circuit::new();
        assert!(!Arc::ptr_eq(&a, &other.tap::<Standalone>().unwrap()));
    }

    #[test]
    fn test_dependencies_share_instances() {
        set_standalone::<Leaf>();
        set_requires::<Branch, (Leaf,)>();

        let circuit = Circuit::new();
        let branch = circuit.tap::<Branch>().unwrap();
        assert!(Arc::ptr_eq(&branch.leaf, &circuit.tap::<Leaf>().unwrap()));
    }

    #[tokio::test]
    async fn test_unwired() {
        set_requires::<Haunted, (Ghost,)>();
        let circuit = Circuit::new();

        assert!(circuit.tap::<Ghost>().unwrap_err().is_unwired_for::<Ghost>());
        assert!(circuit.tap::<Haunted>().unwrap_err().is_unwired_for::<Ghost>());
        assert!(!circuit.is_installed::<Haunted>());

        timeout(TIMEOUT, async {
            let err = circuit.tap_async::<Ghost>().await.unwrap_err();
            assert!(err.is_unwired_for::<Ghost>());

            let err = circuit.tap_async::<Haunted>().await.unwrap_err();
            assert!(err.is_unwired_for::<Ghost>());
        })
        .await
        .unwrap();

        assert!(!circuit.is_installed::<Haunted>());
        assert!(!circuit.is_initializing::<Haunted>());
    }

    #[test]
    fn test_definition_without_constructor() {
        Registry::global().get_or_create(Key::of::<Bare>());

        let err = Circuit::new().tap::<Bare>().unwrap_err();
        assert!(err.is_not_constructible());
    }

    #[test]
    fn test_install_and_uninstall() {
        set_standalone::<Settings>();
        let circuit = Circuit::new();

        let installed = circuit
            .install(Arc::new(Settings { name: "installed" }))
            .unwrap();
        assert_eq!(circuit.tap::<Settings>().unwrap().name, "installed");

        let err = circuit.install(Arc::new(Settings::default())).unwrap_err();
        assert!(err.is_already_initialized());

        let removed = circuit.uninstall::<Settings>().unwrap();
        assert!(Arc::ptr_eq(&installed, &removed));
        assert!(circuit.uninstall::<Settings>().is_none());

        // The slot is free again.
        let reinstalled = circuit
            .install(Arc::new(Settings { name: "reinstalled" }))
            .unwrap();
        assert!(Arc::ptr_eq(&reinstalled, &circuit.get::<Settings>().unwrap()));
        assert_eq!(circuit.tap::<Settings>().unwrap().name, "reinstalled");

        // Once removed, the next tap builds a fresh instance.
        circuit.uninstall::<Settings>().unwrap();
        assert_eq!(circuit.tap::<Settings>().unwrap().name, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_during_async_construction() {
        #[derive(Debug)]
        struct Pending;

        component!(Pending);

        wire_slow::<Pending>(Duration::from_millis(10), || Pending);
        let circuit = Circuit::new();

        let (built, ()) = timeout(TIMEOUT, async {
            tokio::join!(circuit.tap_async::<Pending>(), async {
                tokio::task::yield_now().await;
                let err = circuit.install(Arc::new(Pending)).unwrap_err();
                assert!(matches!(
                    err,
                    Error::AsyncDependency {
                        initializing: true,
                        ..
                    }
                ));
                assert!(!circuit.is_installed::<Pending>());
            })
        })
        .await
        .unwrap();

        assert!(Arc::ptr_eq(&built.unwrap(), &circuit.get::<Pending>().unwrap()));
    }

    #[test]
    fn test_circuit_resolves_itself() {
        let circuit = Circuit::new();
        assert!(circuit.tap::<Circuit>().unwrap().ptr_eq(&circuit));
        assert!(circuit.is_installed::<Circuit>());
        assert!(!circuit.is_async::<Circuit>().unwrap());

        let weak = Arc::downgrade(&circuit.inner);
        drop(circuit);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_default_circuit() {
        assert!(Circuit::get_default().ptr_eq(Circuit::get_default()));
        assert!(!Circuit::get_default().ptr_eq(&Circuit::new()));

        set_standalone::<Global>();
        let global = tap::<Global>().unwrap();
        assert!(Arc::ptr_eq(
            &global,
            &Circuit::get_default().tap::<Global>().unwrap()
        ));
    }

    #[test]
    fn test_singleton_forwarding() {
        let owner = Circuit::new();
        set_standalone::<Pool>();
        set_singleton::<Pool>(Some(&owner));

        let (first, second) = (Circuit::new(), Circuit::new());
        let a = first.tap::<Pool>().unwrap();
        let b = second.tap::<Pool>().unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &owner.tap::<Pool>().unwrap()));
        assert!(owner.is_installed::<Pool>());
        assert!(!first.is_installed::<Pool>());

        // Dependencies of a singleton resolve in the circuit it is bound to.
        set_preconstruct::<Bound, (Circuit,), _>(|(circuit,), _| Ok(Bound { circuit }));
        set_singleton::<Bound>(None);
        let bound = first.tap::<Bound>().unwrap();
        assert!(bound.circuit.ptr_eq(Circuit::get_default()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_singleton_forwarding() {
        #[derive(Debug)]
        struct Remote;

        component!(Remote);

        let owner = Circuit::new();
        let calls = wire_slow::<Remote>(Duration::from_millis(10), || Remote);
        set_singleton::<Remote>(Some(&owner));

        let (first, second) = (Circuit::new(), Circuit::new());
        let (a, b) = timeout(TIMEOUT, async {
            tokio::join!(first.tap_async::<Remote>(), second.tap_async::<Remote>())
        })
        .await
        .unwrap();

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(owner.is_installed::<Remote>());
        assert!(!first.is_installed::<Remote>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_preconstruct() {
        #[derive(Debug)]
        struct Remote;

        component!(Remote);

        let calls = wire_slow::<Remote>(Duration::from_millis(10), || Remote);
        let circuit = Circuit::new();
        assert!(circuit.is_async::<Remote>().unwrap());

        let err = circuit.tap::<Remote>().unwrap_err();
        assert!(matches!(
            err,
            Error::AsyncDependency {
                initializing: false,
                ..
            }
        ));

        let remote = timeout(TIMEOUT, circuit.tap_async::<Remote>())
            .await
            .unwrap()
            .unwrap();

        // Once built, sync taps see the cached instance.
        assert!(Arc::ptr_eq(&remote, &circuit.tap::<Remote>().unwrap()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_preconstruct_finishes_in_context() {
        #[derive(Debug)]
        struct Linked {
            leaf: Arc<Leaf>,
        }

        component!(Linked);

        set_standalone::<Leaf>();
        set_preconstruct_async::<Linked, (), _, _, _>(|(), ctx| async move {
            sleep(Duration::from_millis(5)).await;
            assert!(ctx.target().is::<Linked>());
            Ok::<_, Error>(|| Linked {
                leaf: link::<Leaf>().unwrap(),
            })
        });

        let circuit = Circuit::new();
        let linked = timeout(TIMEOUT, circuit.tap_async::<Linked>())
            .await
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&linked.leaf, &circuit.tap::<Leaf>().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_taps_share_construction() {
        #[derive(Debug)]
        struct Shared;

        component!(Shared);

        let calls = wire_slow::<Shared>(Duration::from_millis(10), || Shared);
        let circuit = Circuit::new();

        let (a, b, ()) = timeout(TIMEOUT, async {
            tokio::join!(
                circuit.tap_async::<Shared>(),
                circuit.tap_async::<Shared>(),
                async {
                    tokio::task::yield_now().await;
                    assert!(circuit.is_initializing::<Shared>());

                    let err = circuit.tap::<Shared>().unwrap_err();
                    assert!(matches!(
                        err,
                        Error::AsyncDependency {
                            initializing: true,
                            ..
                        }
                    ));
                }
            )
        })
        .await
        .unwrap();

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!circuit.is_initializing::<Shared>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_taps_across_threads() {
        #[derive(Debug)]
        struct Contended;

        component!(Contended);

        let calls = wire_slow::<Contended>(Duration::from_millis(20), || Contended);
        let circuit = Circuit::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let circuit = circuit.clone();
                tokio::spawn(async move { circuit.tap_async::<Contended>().await })
            })
            .collect();

        let mut instances = Vec::new();
        for handle in handles {
            instances.push(timeout(TIMEOUT, handle).await.unwrap().unwrap().unwrap());
        }

        assert!(instances.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_construction_is_shared_and_not_cached() {
        #[derive(Debug)]
        struct Broken;

        component!(Broken);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        set_preconstruct_async::<Broken, (), _, _, _>(move |(), _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                sleep(Duration::from_millis(10)).await;
                Err::<fn() -> Broken, _>(Error::other("connection refused"))
            }
        });

        let circuit = Circuit::new();
        let (a, b) = timeout(TIMEOUT, async {
            tokio::join!(circuit.tap_async::<Broken>(), circuit.tap_async::<Broken>())
        })
        .await
        .unwrap();

        assert_eq!(a.unwrap_err().to_string(), "connection refused");
        assert_eq!(b.unwrap_err().to_string(), "connection refused");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!circuit.is_installed::<Broken>());
        assert!(!circuit.is_initializing::<Broken>());

        // The next attempt starts over.
        let result = timeout(TIMEOUT, circuit.tap_async::<Broken>()).await.unwrap();
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_construction_is_retried() {
        #[derive(Debug)]
        struct Abandoned;

        component!(Abandoned);

        let calls = wire_slow::<Abandoned>(Duration::from_millis(10), || Abandoned);
        let circuit = Circuit::new();

        let result = timeout(Duration::from_millis(1), circuit.tap_async::<Abandoned>()).await;
        assert!(result.is_err());
        assert!(!circuit.is_initializing::<Abandoned>());
        assert!(!circuit.is_installed::<Abandoned>());

        timeout(TIMEOUT, circuit.tap_async::<Abandoned>())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_takes_over_abandoned_construction() {
        #[derive(Debug)]
        struct Orphaned;

        component!(Orphaned);

        let calls = wire_slow::<Orphaned>(Duration::from_millis(10), || Orphaned);
        let circuit = Circuit::new();

        let mut leader = Box::pin(circuit.tap_async::<Orphaned>());
        assert!(timeout(Duration::from_millis(1), &mut leader).await.is_err());
        assert!(circuit.is_initializing::<Orphaned>());

        let (waiter, ()) = timeout(TIMEOUT, async {
            tokio::join!(circuit.tap_async::<Orphaned>(), async move {
                tokio::task::yield_now().await;
                drop(leader);
            })
        })
        .await
        .unwrap();

        assert!(waiter.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(circuit.is_installed::<Orphaned>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_completes_before_instance_is_visible() {
        #[derive(Debug, Default)]
        struct Migrated {
            ready: AtomicBool,
        }

        component!(Migrated);

        set_standalone::<Migrated>();
        set_setup::<Migrated, _, _>(|migrated| async move {
            sleep(Duration::from_millis(5)).await;
            migrated.ready.store(true, Ordering::SeqCst);
            Ok::<_, Error>(())
        });

        let circuit = Circuit::new();
        let (a, b) = timeout(TIMEOUT, async {
            tokio::join!(circuit.tap_async::<Migrated>(), circuit.tap_async::<Migrated>())
        })
        .await
        .unwrap();

        assert!(a.unwrap().ready.load(Ordering::SeqCst));
        assert!(b.unwrap().ready.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_provider_is_not_committed() {
        #[derive(Debug, Default)]
        struct Unreliable;

        impl Component for Unreliable {
            type Output = u8;

            fn provide(_: &Arc<Self>) -> Providable<u8> {
                Providable::Provider(Provider::from_async(|_| async {
                    Err(Error::other("provider failed"))
                }))
            }
        }

        set_standalone::<Unreliable>();
        let circuit = Circuit::new();

        let err = timeout(TIMEOUT, circuit.tap_async::<Unreliable>())
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.to_string(), "provider failed");
        assert!(!circuit.is_installed::<Unreliable>());
    }

    #[tokio::test]
    async fn test_dependency_cycles_fail() {
        #[derive(Debug)]
        struct Chicken {
            _egg: Arc<Egg>,
        }

        #[derive(Debug)]
        struct Egg {
            _chicken: Arc<Chicken>,
        }

        component!(Chicken, Egg);

        impl Construct<(Egg,)> for Chicken {
            fn construct((egg,): (Arc<Egg>,)) -> Self {
                Self { _egg: egg }
            }
        }

        impl Construct<(Chicken,)> for Egg {
            fn construct((chicken,): (Arc<Chicken>,)) -> Self {
                Self { _chicken: chicken }
            }
        }

        set_requires::<Chicken, (Egg,)>();
        set_requires::<Egg, (Chicken,)>();

        let circuit = Circuit::builder().max_depth(8).build();
        assert_eq!(circuit.max_depth(), 8);

        let err = circuit.tap::<Chicken>().unwrap_err();
        assert!(err.is_recursion_limit());
        assert!(!circuit.is_installed::<Chicken>());

        let err = timeout(TIMEOUT, circuit.tap_async::<Egg>())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_recursion_limit());
        assert!(!circuit.is_initializing::<Egg>());
        assert!(!circuit.is_installed::<Egg>());
    }

    #[test]
    fn test_is_async_follows_dependencies() {
        #[derive(Debug)]
        struct AsyncLeaf;

        #[derive(Debug)]
        struct OnAsync;

        component!(AsyncLeaf, OnAsync);

        impl Construct<(AsyncLeaf,)> for OnAsync {
            fn construct(_: (Arc<AsyncLeaf>,)) -> Self {
                Self
            }
        }

        wire_slow::<AsyncLeaf>(Duration::from_millis(10), || AsyncLeaf);
        set_requires::<OnAsync, (AsyncLeaf,)>();
        set_standalone::<Leaf>();

        let circuit = Circuit::new();
        assert!(circuit.is_async::<AsyncLeaf>().unwrap());
        assert!(circuit.is_async::<OnAsync>().unwrap());
        assert!(!circuit.is_async::<Leaf>().unwrap());
        assert!(circuit.is_async::<Ghost>().unwrap_err().is_unwired());
        assert!(circuit.tap::<OnAsync>().unwrap_err().is_async_dependency());
    }

    #[test]
    fn test_singleton_forwarding_keeps_dependent() {
        #[derive(Debug)]
        struct Audit {
            circuit: Circuit,
            dependent: Option<Key>,
            depth: usize,
        }

        #[derive(Debug)]
        struct Handler {
            audit: Arc<Audit>,
        }

        component!(Audit, Handler);

        impl Construct<(Audit,)> for Handler {
            fn construct((audit,): (Arc<Audit>,)) -> Self {
                Self { audit }
            }
        }

        let owner = Circuit::new();
        set_preconstruct::<Audit, (), _>(|(), _| {
            let ctx = current_context()?;
            Ok(Audit {
                circuit: ctx.circuit().clone(),
                dependent: ctx.dependent(),
                depth: ctx.depth(),
            })
        });
        set_singleton::<Audit>(Some(&owner));
        set_requires::<Handler, (Audit,)>();

        let circuit = Circuit::new();
        let handler = circuit.tap::<Handler>().unwrap();

        assert!(handler.audit.circuit.ptr_eq(&owner));
        assert_eq!(handler.audit.dependent, Some(Key::of::<Handler>()));
        assert_eq!(handler.audit.depth, 1);
        assert!(owner.is_installed::<Audit>());
        assert!(circuit.is_installed::<Handler>());
        assert!(!circuit.is_installed::<Audit>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependencies_and_preloads_resolve_concurrently() {
        #[derive(Debug)]
        struct Primary;

        #[derive(Debug)]
        struct Warm;

        #[derive(Debug)]
        struct Joined;

        component!(Primary, Warm, Joined);

        impl Construct<(Primary,)> for Joined {
            fn construct(_: (Arc<Primary>,)) -> Self {
                Self
            }
        }

        wire_slow::<Primary>(Duration::from_millis(20), || Primary);
        wire_slow::<Warm>(Duration::from_millis(30), || Warm);
        set_requires::<Joined, (Primary,)>();
        set_preloads::<Joined, (Warm,)>();

        let circuit = Circuit::new();
        let start = Instant::now();
        timeout(TIMEOUT, circuit.tap_async::<Joined>())
            .await
            .unwrap()
            .unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(50));
        assert!(circuit.is_installed::<Primary>());
        assert!(circuit.is_installed::<Warm>());
    }
}
