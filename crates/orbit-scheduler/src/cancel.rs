//! Cooperative cancellation of a scheduling run.
//!
//! The scheduler checks the signal before each remote call. Calls already
//! acknowledged by a controller are not undone.

use tokio::sync::watch;

/// Sender side, held by whoever may abort the run.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Receiver side, passed to the scheduler.
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_reaches_every_signal() {
        let (handle, signal) = cancellation();
        let other = handle.signal();
        assert!(!signal.is_cancelled());

        handle.cancel();
        assert!(signal.is_cancelled());
        assert!(other.is_cancelled());
    }

    #[test]
    fn never_stays_quiet() {
        assert!(!CancelSignal::never().is_cancelled());
    }
}
