//! Dependency lists and constructors.

use crate::component::Component;
use crate::context::Context;
use crate::{Key, Result};

/// [`Dependencies`] is an ordered list of components resolved together.
///
/// It is implemented for `()` and for tuples of up to twelve components. The outputs keep the
/// order of the list.
pub trait Dependencies: 'static {
    /// The tuple of outputs handed to constructors.
    type Output: Send + 'static;

    /// Returns the keys of the listed components.
    fn keys() -> Vec<Key>;

    /// Resolves every listed component synchronously, in order.
    ///
    /// # Errors
    ///
    /// Fails with the first error raised by a listed component.
    fn tap(ctx: &Context) -> Result<Self::Output>;

    /// Resolves every listed component concurrently.
    fn tap_async(ctx: &Context) -> impl Future<Output = Result<Self::Output>> + Send;

    /// Returns `true` if any listed component needs asynchronous resolution, checking each one as
    /// a dependency of the target of `ctx`.
    ///
    /// # Errors
    ///
    /// Fails if checking a component raised an error other than an async dependency.
    fn is_async(ctx: &Context) -> Result<bool>;
}

impl Dependencies for () {
    type Output = ();

    fn keys() -> Vec<Key> {
        Vec::new()
    }

    fn tap(_ctx: &Context) -> Result<Self::Output> {
        Ok(())
    }

    async fn tap_async(_ctx: &Context) -> Result<Self::Output> {
        Ok(())
    }

    fn is_async(_ctx: &Context) -> Result<bool> {
        Ok(false)
    }
}

macro_rules! impl_dependencies_tuple {
    ($($ty:ident),*) => {
        #[allow(non_snake_case)]
        #[allow(clippy::type_complexity)]
        const _: () = {
            wirebox_core::def_try_join_fn!(fn try_join_ty; $($ty),*);

            impl<$($ty,)*> Dependencies for ($($ty,)*)
            where
                $($ty: Component,)*
            {
                type Output = ($($ty::Output,)*);

                fn keys() -> Vec<Key> {
                    vec![$(Key::of::<$ty>(),)*]
                }

                fn tap(ctx: &Context) -> Result<Self::Output> {
                    Ok(($(ctx.tap::<$ty>()?,)*))
                }

                async fn tap_async(ctx: &Context) -> Result<Self::Output> {
                    try_join_ty($(ctx.tap_async::<$ty>(),)*).await
                }

                fn is_async(ctx: &Context) -> Result<bool> {
                    $(
                        if ctx.is_async::<$ty>()? {
                            return Ok(true);
                        }
                    )*
                    Ok(false)
                }
            }
        };
    };
}

wirebox_core::apply_tuples!(impl_dependencies_tuple);

/// [`Construct`] builds a component from the outputs of its dependencies.
///
/// Every [`Default`] type can be constructed without dependencies.
pub trait Construct<D>: Sized
where
    D: Dependencies,
{
    fn construct(dependencies: D::Output) -> Self;
}

impl<T> Construct<()> for T
where
    T: Default,
{
    fn construct((): ()) -> Self {
        Self::default()
    }
}
