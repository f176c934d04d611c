//! Gate - single-settle readiness signal
//!
//! A gate starts pending and transitions to open or failed exactly once.
//! Any number of fibres can await it, before or after it settles. Built
//! on a watch channel: settling is an atomic compare-and-set on the
//! channel value, so racing open/fail calls cannot double-fire.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Pending,
    Open,
    Failed,
}

/// One-shot readiness gate with multiple awaiters
#[derive(Debug)]
pub struct Gate {
    state: watch::Sender<GateState>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(GateState::Pending);
        Self { state: tx }
    }

    /// Open the gate. Returns false if it was already settled.
    pub fn open(&self) -> bool {
        self.settle(GateState::Open)
    }

    /// Fail the gate. Returns false if it was already settled.
    pub fn fail(&self) -> bool {
        self.settle(GateState::Failed)
    }

    fn settle(&self, to: GateState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == GateState::Pending {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    pub fn is_settled(&self) -> bool {
        *self.state.borrow() != GateState::Pending
    }

    /// Await the gate. Returns true if it opened, false if it failed
    /// (or was dropped while pending).
    pub async fn wait(&self) -> bool {
        let mut rx = self.state.subscribe();
        loop {
            match *rx.borrow_and_update() {
                GateState::Open => return true,
                GateState::Failed => return false,
                GateState::Pending => {}
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
