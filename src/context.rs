//! Resolution contexts and the ambient context visible during construction.

use std::cell::RefCell;
use std::sync::Arc;

use crate::circuit::Circuit;
use crate::component::Component;
use crate::provider::BoxFuture;
use crate::{Error, Key, Result};

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// [`Context`] describes a single resolution in progress.
///
/// Taps made through a context resolve from the same circuit and record the current target as
/// their dependent.
#[derive(Debug, Clone)]
pub struct Context {
    circuit: Circuit,
    target: Key,
    ancestors: Arc<Vec<(Circuit, Key)>>,
}

impl Context {
    pub(crate) fn new(circuit: Circuit, target: Key) -> Self {
        Self {
            circuit,
            target,
            ancestors: Arc::default(),
        }
    }

    /// Derives the context used to resolve a dependency of the current target.
    pub(crate) fn dependency(&self, target: Key) -> Self {
        let mut ancestors = Vec::with_capacity(self.ancestors.len() + 1);
        ancestors.extend(self.ancestors.iter().cloned());
        ancestors.push((self.circuit.clone(), self.target));

        Self {
            circuit: self.circuit.clone(),
            target,
            ancestors: Arc::new(ancestors),
        }
    }

    /// Returns a context resolving from `circuit` that keeps the dependency chain of this one.
    pub fn forward(&self, circuit: &Circuit) -> Self {
        Self {
            circuit: circuit.clone(),
            ..self.clone()
        }
    }

    /// Returns `true` if `key` is being resolved in `circuit` further up this chain.
    pub(crate) fn is_resolving(&self, circuit: &Circuit, key: Key) -> bool {
        self.ancestors
            .iter()
            .any(|(ancestor, ancestor_key)| *ancestor_key == key && ancestor.ptr_eq(circuit))
    }

    /// The circuit performing the resolution.
    pub const fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// The component being resolved.
    pub const fn target(&self) -> Key {
        self.target
    }

    /// The component that requested the target, if any.
    pub fn dependent(&self) -> Option<Key> {
        self.ancestors.last().map(|(_, key)| *key)
    }

    /// The number of dependency edges between the outermost tap and the target.
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    /// Synchronously resolves `T` as a dependency of the current target.
    ///
    /// # Errors
    ///
    /// Fails with the same errors as [`Circuit::tap`].
    pub fn tap<T>(&self) -> Result<T::Output>
    where
        T: Component,
    {
        Circuit::resolve::<T>(&self.dependency(Key::of::<T>()))
    }

    /// Returns `true` if `T` needs async resolution as a dependency of the current
    /// target.
    ///
    /// # Errors
    ///
    /// Fails with the same errors as [`Circuit::is_async`].
    pub fn is_async<T>(&self) -> Result<bool>
    where
        T: Component,
    {
        Circuit::check_async::<T>(&self.dependency(Key::of::<T>()))
    }

    /// Asynchronously resolves `T` as a dependency of the current target.
    pub fn tap_async<T>(&self) -> BoxFuture<'static, Result<T::Output>>
    where
        T: Component,
    {
        Circuit::resolve_async::<T>(self.dependency(Key::of::<T>()))
    }
}

struct Restore(Option<Context>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        // The thread-local may already be gone while the thread shuts down.
        let _ = CURRENT.try_with(|current| *current.borrow_mut() = previous);
    }
}

/// Runs `f` with `ctx` as the ambient context of the current thread.
///
/// The previous context is restored when `f` returns or unwinds.
pub(crate) fn scope<R>(ctx: &Context, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT.with(|current| current.replace(Some(ctx.clone())));
    let _restore = Restore(previous);
    f()
}

/// Returns the context of the construction running on this thread.
///
/// # Errors
///
/// Returns [`Error::NoContext`] when no construction is in progress.
pub fn current_context() -> Result<Context> {
    CURRENT
        .with(|current| current.borrow().clone())
        .ok_or(Error::NoContext(None))
}

/// Returns the circuit of the construction running on this thread.
///
/// # Errors
///
/// Returns [`Error::NoContext`] when no construction is in progress.
pub fn current_circuit() -> Result<Circuit> {
    current_context().map(|ctx| ctx.circuit)
}

/// Resolves `T` from the circuit of the construction running on this thread.
///
/// This is meant to be called from constructors and preconstruct functions, which cannot
/// receive the circuit as an argument.
///
/// # Errors
///
/// Returns [`Error::NoContext`] when called outside of a construction, otherwise fails like
/// [`Circuit::tap`].
pub fn link<T>() -> Result<T::Output>
where
    T: Component,
{
    let ctx = CURRENT
        .with(|current| current.borrow().clone())
        .ok_or(Error::NoContext(Some(Key::of::<T>())))?;
    ctx.tap::<T>()
}
