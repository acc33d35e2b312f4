//! Macros and future helpers for working with component tuples.

/// Invokes `$name!` with every tuple arity from one to twelve.
#[macro_export]
#[rustfmt::skip]
macro_rules! apply_tuples {
    ($name:ident) => {
        $name!(T1);
        $name!(T1, T2);
        $name!(T1, T2, T3);
        $name!(T1, T2, T3, T4);
        $name!(T1, T2, T3, T4, T5);
        $name!(T1, T2, T3, T4, T5, T6);
        $name!(T1, T2, T3, T4, T5, T6, T7);
        $name!(T1, T2, T3, T4, T5, T6, T7, T8);
        $name!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
        $name!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
        $name!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
        $name!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);
    };
}

/// Defines an async function that drives one future per argument concurrently.
///
/// The generated function resolves to the tuple of outputs in argument order, or to the
/// first error observed. Futures still pending when an error surfaces are dropped.
#[macro_export]
macro_rules! def_try_join_fn {
    ($vis:vis fn $fn_name:ident; $($ty:ident),*) => {
        #[allow(non_snake_case)]
        #[allow(clippy::too_many_arguments)]
        $vis async fn $fn_name<$($ty,)* E>($($ty: $ty,)*) -> ::core::result::Result<($($ty::Ok,)*), E>
        where
            $($ty: $crate::macros::TryFuture<Err = E>,)*
        {
            use ::std::pin::pin;
            use ::std::task::Poll;
            use $crate::macros::TryFuture;

            let ($($ty,)*) = ($($crate::macros::TryMaybeDone::new($ty),)*);
            let ($(mut $ty,)*) = ($(pin!($ty),)*);

            ::std::future::poll_fn(|cx| {
                let mut done = true;

                $(
                    match $ty.as_mut().try_poll(cx) {
                        Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                        poll => done &= poll.is_ready(),
                    }
                )*

                if done {
                    Poll::Ready(Ok((
                        $({
                            $ty.as_mut()
                                .take_output()
                                .expect("expected completed future")
                        },)*
                    )))
                } else {
                    Poll::Pending
                }
            }).await
        }
    };
}

pub trait TryFuture: Future {
    type Ok;

    type Err;

    fn try_poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<Self::Ok, Self::Err>>;
}

impl<T, E, F: Future<Output = Result<T, E>>> TryFuture for F {
    type Ok = T;

    type Err = E;

    #[inline]
    fn try_poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<Self::Ok, Self::Err>> {
        self.poll(cx)
    }
}

pin_project_lite::pin_project! {
    #[project = TryMaybeDoneProj]
    #[project_replace = TryMaybeDoneReplaceProj]
    pub enum TryMaybeDone<F: TryFuture> {
        Future{ #[pin] future: F },
        Done{ output: F::Ok },
        Gone,
    }
}

impl<F: TryFuture> TryMaybeDone<F> {
    pub const fn new(future: F) -> Self {
        Self::Future { future }
    }

    pub fn take_output(self: std::pin::Pin<&mut Self>) -> Option<F::Ok> {
        if !matches!(*self, Self::Done { .. }) {
            return None;
        }

        match self.project_replace(Self::Gone) {
            TryMaybeDoneReplaceProj::Done { output } => Some(output),
            _ => None,
        }
    }
}

impl<F: TryFuture> Future for TryMaybeDone<F> {
    type Output = Result<(), F::Err>;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        match self.as_mut().project() {
            TryMaybeDoneProj::Future { future } => match std::task::ready!(future.try_poll(cx)) {
                Ok(output) => self.set(Self::Done { output }),
                Err(err) => return std::task::Poll::Ready(Err(err)),
            },
            TryMaybeDoneProj::Done { .. } => {}
            TryMaybeDoneProj::Gone => unreachable!(),
        }

        std::task::Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tokio::time::{Instant, sleep};

    crate::def_try_join_fn!(fn join3; T1, T2, T3);

    #[tokio::test(start_paused = true)]
    async fn test_try_join_is_concurrent_and_ordered() {
        let start = Instant::now();

        let out = join3(
            async {
                sleep(Duration::from_millis(30)).await;
                Ok::<_, ()>(1)
            },
            async {
                sleep(Duration::from_millis(10)).await;
                Ok("two")
            },
            async { Ok('3') },
        )
        .await;

        assert_eq!(out, Ok((1, "two", '3')));
        assert!(start.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_join_short_circuits() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let out = join3(
            async move {
                sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(1)
            },
            async { Err::<u8, _>("boom") },
            async { Ok(()) },
        )
        .await;

        assert_eq!(out, Err("boom"));
        assert!(!finished.load(Ordering::SeqCst));
    }
}
