//! Operator-initiated cancellation of a release run.
//!
//! Cancellation is cooperative and only observed between catalog entries:
//! an in-flight registry write or readiness wait always runs to completion.

use tokio::sync::watch;

/// Sending side, held by whoever may abort the run (e.g. a Ctrl-C handler).
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving side, checked by the orchestrator before starting each entry.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// Create a linked handle/token pair.
    pub fn new() -> (CancelHandle, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, Cancellation { rx })
    }

    /// A token that is never cancelled.
    pub fn never() -> Cancellation {
        let (_tx, rx) = watch::channel(false);
        Cancellation { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}
