//! RunnerPool - bounded ownership of worker runners
//!
//! Policy:
//! - Invariant: 0 < min <= size <= max, size = idle + busy
//! - Construction eagerly spawns `min` idle runners
//! - acquire: idle front first (stack reuse, warmest runner), else spawn
//!   while below max, else queue FIFO
//! - release: pending waiter first (strict FIFO), else retire when the
//!   pool sits above max (after a reduction) or above min with no
//!   demand, else push idle
//! - terminate: drop idle runners, fail pending acquires
//!
//! Every spawn and retirement is recorded on the pool's audit log as
//! `RunnerSpawned` / `RunnerRetired`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::{Result, RunaError};
use crate::event::{EventKind, EventLog};
use crate::pool::Runner;
use crate::registry::TaskRegistry;

/// Point-in-time pool accounting, for diagnostics and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: usize,
    pub idle: usize,
    pub pending: usize,
    pub min: usize,
    pub max: usize,
}

struct PoolState {
    idle: VecDeque<Runner>,
    pending: VecDeque<oneshot::Sender<Result<Runner>>>,
    /// Total runners currently owned (idle + busy)
    size: usize,
    min: usize,
    max: usize,
    terminated: bool,
}

/// Bounded pool of worker runners with queued acquires.
///
/// Runners outlive individual workflows; they are created on first
/// demand, reused across runs and terminated only on pool shutdown or a
/// `max` reduction.
pub struct RunnerPool {
    registry: TaskRegistry,
    response_capacity: usize,
    ready_timeout: Duration,
    next_runner_id: AtomicU64,
    /// Audit log for runner lifecycle events
    events: EventLog,
    state: Mutex<PoolState>,
}

impl RunnerPool {
    /// Create a pool and eagerly spawn `min` idle runners.
    ///
    /// Runner spawns and retirements are emitted on `events`.
    pub async fn new(
        min: usize,
        max: usize,
        registry: TaskRegistry,
        response_capacity: usize,
        ready_timeout: Duration,
        events: EventLog,
    ) -> Result<Arc<Self>> {
        if min == 0 || min > max {
            return Err(RunaError::InvalidPoolBounds { min, max });
        }

        let pool = Arc::new(Self {
            registry,
            response_capacity,
            ready_timeout,
            next_runner_id: AtomicU64::new(0),
            events,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                pending: VecDeque::new(),
                size: 0,
                min,
                max,
                terminated: false,
            }),
        });

        for _ in 0..min {
            let runner = pool.spawn_runner().await?;
            let mut state = pool.state.lock();
            state.size += 1;
            state.idle.push_front(runner);
        }

        Ok(pool)
    }

    /// The pool's audit log (runner spawn/retire events)
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    async fn spawn_runner(&self) -> Result<Runner> {
        let id = self.next_runner_id.fetch_add(1, Ordering::SeqCst);
        let runner = Runner::spawn(
            id,
            self.registry.clone(),
            self.response_capacity,
            self.ready_timeout,
        )
        .await?;
        debug!(runner_id = id, "runner spawned");
        self.events.emit(EventKind::RunnerSpawned { runner_id: id });
        Ok(runner)
    }

    /// Drop a runner and record its retirement on the audit log
    fn retire(&self, runner: Runner, reason: &'static str) {
        debug!(runner_id = runner.id(), reason, "runner retired");
        self.events.emit(EventKind::RunnerRetired {
            runner_id: runner.id(),
        });
    }

    /// Acquire a runner, suspending while the pool is saturated.
    ///
    /// Pending acquires are served strictly FIFO. Fails with
    /// `PoolTerminated` once the pool shuts down.
    pub async fn acquire(self: &Arc<Self>) -> Result<Runner> {
        let waiter = {
            let mut state = self.state.lock();
            if state.terminated {
                return Err(RunaError::PoolTerminated);
            }
            if let Some(runner) = state.idle.pop_front() {
                return Ok(runner);
            }
            if state.size < state.max {
                // Reserve the slot now; spawn outside the lock.
                state.size += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.pending.push_back(tx);
                Some(rx)
            }
        };

        match waiter {
            None => match self.spawn_runner().await {
                Ok(runner) => Ok(runner),
                Err(e) => {
                    self.state.lock().size -= 1;
                    Err(e)
                }
            },
            Some(rx) => rx.await.map_err(|_| RunaError::PoolTerminated)?,
        }
    }

    /// Return a runner after use.
    ///
    /// Hands it to the oldest pending waiter when one exists; otherwise
    /// retires it when the pool sits above `max` (after a reduction) or
    /// above `min` with no demand, else pushes it to the idle front.
    pub fn release(self: &Arc<Self>, runner: Runner) {
        let mut state = self.state.lock();

        if state.terminated {
            state.size -= 1;
            drop(state);
            self.retire(runner, "pool terminated");
            return;
        }

        // A max reduction is honoured first: excess runners die on
        // release even while acquires are queued.
        if state.size > state.max {
            state.size -= 1;
            drop(state);
            self.retire(runner, "max reduction");
            return;
        }

        let mut runner = runner;
        while let Some(waiter) = state.pending.pop_front() {
            match waiter.send(Ok(runner)) {
                Ok(()) => return,
                // Waiter gave up (acquire future dropped): try the next.
                Err(sent_back) => {
                    runner = sent_back.expect("release hands back only runners");
                }
            }
        }

        // No demand: shrink back toward the floor.
        if state.size > state.min {
            state.size -= 1;
            drop(state);
            self.retire(runner, "idle above min");
            return;
        }

        state.idle.push_front(runner);
    }

    /// Forcibly retire a runner that missed its grace period, spawning a
    /// replacement when there is demand or `min` would be violated.
    pub fn discard(self: &Arc<Self>, runner: Runner) {
        warn!(runner_id = runner.id(), "discarding unresponsive runner");
        let needs_replacement = {
            let mut state = self.state.lock();
            state.size -= 1;
            !state.terminated
                && state.size < state.max
                && (!state.pending.is_empty() || state.size < state.min)
        };
        self.retire(runner, "missed abort grace");
        if needs_replacement {
            self.spawn_detached();
        }
    }

    /// Spawn a runner in the background and admit it on arrival.
    fn spawn_detached(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.terminated || state.size >= state.max {
                return;
            }
            state.size += 1;
        }

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            match pool.spawn_runner().await {
                Ok(runner) => pool.admit(runner),
                Err(e) => {
                    error!(error = %e, "replacement runner failed to spawn");
                    let mut state = pool.state.lock();
                    state.size -= 1;
                    // Fail one waiter rather than leaving it hung.
                    if let Some(waiter) = state.pending.pop_front() {
                        let _ = waiter.send(Err(e));
                    }
                }
            }
        });
    }

    /// Admit a freshly spawned runner (size already reserved)
    fn admit(self: &Arc<Self>, runner: Runner) {
        let mut state = self.state.lock();
        if state.terminated {
            state.size -= 1;
            drop(state);
            self.retire(runner, "pool terminated");
            return;
        }

        let mut runner = runner;
        while let Some(waiter) = state.pending.pop_front() {
            match waiter.send(Ok(runner)) {
                Ok(()) => return,
                Err(sent_back) => {
                    runner = sent_back.expect("admit hands back only runners");
                }
            }
        }
        state.idle.push_front(runner);
    }

    /// Raise or lower the ceiling. Lowering retires idle runners
    /// immediately; busy runners die on release.
    pub fn set_max(&self, new_max: usize) -> Result<()> {
        let retired = {
            let mut state = self.state.lock();
            if new_max == 0 || new_max < state.min {
                return Err(RunaError::InvalidPoolBounds {
                    min: state.min,
                    max: new_max,
                });
            }
            state.max = new_max;
            let mut retired = Vec::new();
            while state.size > state.max {
                // Coldest first (back of the stack)
                match state.idle.pop_back() {
                    Some(runner) => {
                        state.size -= 1;
                        retired.push(runner);
                    }
                    None => break,
                }
            }
            retired
        };
        for runner in retired {
            self.retire(runner, "max reduction");
        }
        Ok(())
    }

    /// Raise or lower the floor. Raising eagerly spawns idle runners.
    pub fn set_min(self: &Arc<Self>, new_min: usize) -> Result<()> {
        let deficit = {
            let mut state = self.state.lock();
            if new_min == 0 || new_min > state.max {
                return Err(RunaError::InvalidPoolBounds {
                    min: new_min,
                    max: state.max,
                });
            }
            state.min = new_min;
            new_min.saturating_sub(state.size)
        };
        for _ in 0..deficit {
            self.spawn_detached();
        }
        Ok(())
    }

    /// Shut the pool down: drop idle runners, fail pending acquires.
    /// Busy runners are retired as they are released.
    pub fn terminate(&self) {
        let (idle, pending) = {
            let mut state = self.state.lock();
            if state.terminated {
                return;
            }
            state.terminated = true;
            let idle: Vec<Runner> = state.idle.drain(..).collect();
            state.size -= idle.len();
            let pending: Vec<_> = state.pending.drain(..).collect();
            (idle, pending)
        };

        for waiter in pending {
            let _ = waiter.send(Err(RunaError::PoolTerminated));
        }
        for runner in idle {
            self.retire(runner, "pool terminated");
        }
        info!("runner pool terminated");
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            size: state.size,
            idle: state.idle.len(),
            pending: state.pending.len(),
            min: state.min,
            max: state.max,
        }
    }
}
