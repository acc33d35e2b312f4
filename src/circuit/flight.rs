//! Async constructions in flight.

use tokio::sync::watch;

use crate::{Erased, Result};

#[derive(Clone, Debug, Default)]
enum Inner {
    #[default]
    Pending,
    Settled(Result<Erased>),
}

/// The sending side of an async construction, held by the resolution that leads it.
///
/// Dropping it before [`settle`](Self::settle) closes the channel, which tells every waiter that
/// the construction was abandoned.
#[derive(Debug)]
pub(super) struct Flight {
    inner: watch::Sender<Inner>,
}

/// Waits for the outcome of an async construction led by another resolution.
#[derive(Debug, Clone)]
pub(super) struct FlightWatch {
    inner: watch::Receiver<Inner>,
}

impl Flight {
    pub(super) fn new() -> Self {
        let (tx, _) = watch::channel(Inner::Pending);
        Self { inner: tx }
    }

    pub(super) fn watch(&self) -> FlightWatch {
        FlightWatch {
            inner: self.inner.subscribe(),
        }
    }

    /// Publishes the outcome to every waiter.
    pub(super) fn settle(&self, result: Result<Erased>) {
        self.inner.send_replace(Inner::Settled(result));
    }
}

impl FlightWatch {
    /// Waits for the outcome, or returns `None` if the construction was abandoned.
    pub(super) async fn wait(mut self) -> Option<Result<Erased>> {
        let state = self
            .inner
            .wait_for(|state| matches!(state, Inner::Settled(_)))
            .await
            .ok()?;

        let Inner::Settled(result) = &*state else {
            return None;
        };
        Some(result.clone())
    }
}
