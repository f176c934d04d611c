//! Scheduler - drives a single workflow run
//!
//! One lightweight fibre per task plus a driver fibre that owns all
//! mutable run state:
//!
//! - Each task fibre awaits its readiness gate, resolves inputs from the
//!   published outputs, acquires a runner, dispatches, and reports the
//!   terminal outcome to the driver.
//! - The driver publishes outputs, decrements dependents' pending counts
//!   with multiplicity, opens gates that reach zero, and forwards one
//!   `Intermediate` event per task through the single-slot outbox.
//!
//! Causal guarantee: a gate only opens after every dependency published,
//! so a task never starts before its inputs exist. Emission order
//! follows completion order; `Final` is last.
//!
//! Abort: cancellation fails every unsettled gate, in-flight runners get
//! an `Abort` message and a bounded grace period to acknowledge before
//! they are forcibly retired, and the stream terminates with the abort
//! error instead of `Final`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::ast::{DepRef, TaskSpec};
use crate::buffer::SharedBuffer;
use crate::dag::TaskGraph;
use crate::error::{Result, RunaError};
use crate::event::{EventKind, EventLog};
use crate::pool::{Runner, RunnerPool};
use crate::protocol::{
    RequestId, ResolvedDep, ResolvedInputs, RunnerRequest, RunnerResponse, TaskAssignment,
};
use crate::runtime::{Gate, WorkflowEvent, WorkflowStream};
use crate::store::ResultStore;
use crate::util::intern;

/// Terminal outcome of one task fibre
struct TaskOutcome {
    task_id: Arc<str>,
    result: Result<SharedBuffer>,
}

/// Drives workflows against a shared runner pool
pub struct Scheduler {
    pool: Arc<RunnerPool>,
    abort_grace: Duration,
}

impl Scheduler {
    pub fn new(pool: Arc<RunnerPool>, abort_grace: Duration) -> Self {
        Self { pool, abort_grace }
    }

    /// Start a run and return its event stream.
    ///
    /// The stream is single-consumer; dropping it aborts the run.
    #[instrument(skip_all, fields(run_id = %run_id, tasks = graph.len()))]
    pub fn run(
        &self,
        graph: TaskGraph,
        run_id: String,
        workflow_hash: String,
        cancel: CancellationToken,
    ) -> WorkflowStream {
        let event_log = EventLog::new();
        // Single slot: the driver cannot emit the next event until the
        // consumer takes the previous one.
        let (out_tx, out_rx) = mpsc::channel(1);

        tokio::spawn(drive(
            graph,
            Arc::clone(&self.pool),
            event_log.clone(),
            out_tx,
            cancel,
            self.abort_grace,
            run_id.clone(),
            workflow_hash,
        ));

        WorkflowStream::new(run_id, out_rx, event_log)
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    graph: TaskGraph,
    pool: Arc<RunnerPool>,
    event_log: EventLog,
    out_tx: mpsc::Sender<Result<WorkflowEvent>>,
    cancel: CancellationToken,
    abort_grace: Duration,
    run_id: String,
    workflow_hash: String,
) {
    let start = Instant::now();
    event_log.emit(EventKind::RunStarted {
        task_count: graph.len(),
        run_id,
        workflow_hash,
    });

    if graph.is_empty() {
        // Nothing to do: an immediate empty final result.
        event_log.emit(EventKind::RunCompleted {
            total_duration_ms: start.elapsed().as_millis() as u64,
        });
        let _ = out_tx
            .send(Ok(WorkflowEvent::Final {
                results: FxHashMap::default(),
            }))
            .await;
        return;
    }

    let graph = Arc::new(graph);
    let gates: Arc<FxHashMap<Arc<str>, Gate>> = Arc::new(
        graph
            .ids()
            .iter()
            .map(|id| (Arc::clone(id), Gate::new()))
            .collect(),
    );
    let mut counter = graph.counter();
    let store = ResultStore::new();
    let run_cancel = cancel.child_token();
    let request_ids = Arc::new(AtomicU64::new(1));
    let (done_tx, mut done_rx) = mpsc::channel::<TaskOutcome>(graph.len());

    for id in graph.ids() {
        let spec = Arc::clone(graph.task(id).expect("graph id has a task"));
        event_log.emit(EventKind::TaskScheduled {
            task_id: Arc::clone(id),
            dependencies: dep_targets(&spec),
        });
        tokio::spawn(task_fibre(TaskFibre {
            id: Arc::clone(id),
            spec,
            gates: Arc::clone(&gates),
            store: store.clone(),
            pool: Arc::clone(&pool),
            done: done_tx.clone(),
            run_cancel: run_cancel.clone(),
            event_log: event_log.clone(),
            request_ids: Arc::clone(&request_ids),
            abort_grace,
        }));
    }
    drop(done_tx);

    // Open the roots. No task has started yet, so this cannot race the
    // decrement path.
    for (id, count) in counter.iter() {
        if count == 0 {
            gates[id].open();
        }
    }

    let mut remaining: FxHashSet<Arc<str>> = graph.ids().iter().cloned().collect();
    let mut aborted = false;
    let mut failure: Option<RunaError> = None;
    let mut final_sent = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled(), if !aborted => {
                aborted = true;
                warn!("run aborted by caller");
                event_log.emit(EventKind::RunAborted {
                    reason: "cancelled by caller".to_string(),
                });
                failure.get_or_insert(RunaError::Aborted {
                    reason: "cancelled by caller".to_string(),
                });
                run_cancel.cancel();
                for gate in gates.values() {
                    gate.fail();
                }
            }
            outcome = done_rx.recv() => {
                let Some(outcome) = outcome else { break };
                match outcome.result {
                    Ok(output) if !aborted => {
                        store.insert(Arc::clone(&outcome.task_id), output.clone());
                        remaining.remove(&outcome.task_id);

                        // Decrement each dependent once per direct
                        // reference it makes to the finished task, so
                        // group multiplicity balances construction.
                        for dependent in graph.dependents(&outcome.task_id) {
                            let references = graph.reference_count(dependent, &outcome.task_id);
                            for _ in 0..references {
                                if counter.decrement(dependent) == 0 {
                                    gates[dependent].open();
                                }
                            }
                        }

                        let event = WorkflowEvent::Intermediate {
                            task_id: Arc::clone(&outcome.task_id),
                            output,
                        };
                        if out_tx.send(Ok(event)).await.is_err() {
                            // Consumer dropped the stream mid-run.
                            aborted = true;
                            debug!("stream consumer dropped, aborting run");
                            failure.get_or_insert(RunaError::Aborted {
                                reason: "stream consumer dropped".to_string(),
                            });
                            run_cancel.cancel();
                            for gate in gates.values() {
                                gate.fail();
                            }
                            continue;
                        }

                        if remaining.is_empty() {
                            // Logged before the send so a consumer that
                            // observes Final also observes the log entry.
                            event_log.emit(EventKind::RunCompleted {
                                total_duration_ms: start.elapsed().as_millis() as u64,
                            });
                            info!(
                                tasks = graph.len(),
                                duration_ms = start.elapsed().as_millis() as u64,
                                "run completed"
                            );
                            let _ = out_tx
                                .send(Ok(WorkflowEvent::Final {
                                    results: store.snapshot(),
                                }))
                                .await;
                            final_sent = true;
                            break;
                        }
                    }
                    // Completion raced the abort: the result is dropped.
                    Ok(_) => {}
                    Err(error) if !aborted => {
                        aborted = true;
                        event_log.emit(EventKind::RunFailed {
                            error: error.to_string(),
                            failed_task: Some(Arc::clone(&outcome.task_id)),
                        });
                        failure = Some(error);
                        run_cancel.cancel();
                        for gate in gates.values() {
                            gate.fail();
                        }
                    }
                    Err(_) => {}
                }
            }
        }
    }

    if !final_sent {
        let error = failure.unwrap_or_else(|| RunaError::Aborted {
            reason: "scheduler stopped before completion".to_string(),
        });
        let _ = out_tx.send(Err(error)).await;
    }
}

/// Dependency targets of a task, for the scheduled event
fn dep_targets(spec: &TaskSpec) -> Vec<Arc<str>> {
    spec.dependencies
        .as_ref()
        .map(|deps| {
            deps.values()
                .flat_map(|d| d.targets())
                .map(|t| intern(t))
                .collect()
        })
        .unwrap_or_default()
}

struct TaskFibre {
    id: Arc<str>,
    spec: Arc<TaskSpec>,
    gates: Arc<FxHashMap<Arc<str>, Gate>>,
    store: ResultStore,
    pool: Arc<RunnerPool>,
    done: mpsc::Sender<TaskOutcome>,
    run_cancel: CancellationToken,
    event_log: EventLog,
    request_ids: Arc<AtomicU64>,
    abort_grace: Duration,
}

impl TaskFibre {
    async fn report(&self, result: Result<SharedBuffer>) {
        let _ = self
            .done
            .send(TaskOutcome {
                task_id: Arc::clone(&self.id),
                result,
            })
            .await;
    }
}

/// One task's lifecycle: gate → inputs → runner → terminal outcome
async fn task_fibre(fibre: TaskFibre) {
    // A failed gate means the run stopped being Running: no dispatch.
    if !fibre.gates[&fibre.id].wait().await {
        return;
    }
    if fibre.run_cancel.is_cancelled() {
        return;
    }

    let inputs = resolve_inputs(&fibre.spec, &fibre.store);
    let started = Instant::now();

    let mut runner = match fibre.pool.acquire().await {
        Ok(runner) => runner,
        Err(error) => {
            fibre.report(Err(error)).await;
            return;
        }
    };
    if fibre.run_cancel.is_cancelled() {
        fibre.pool.release(runner);
        return;
    }

    let request_id = fibre.request_ids.fetch_add(1, Ordering::SeqCst);
    let assignment = TaskAssignment {
        request_id,
        task_id: Arc::clone(&fibre.id),
        task_type: fibre.spec.task_type.clone(),
        config: fibre.spec.config.clone(),
        inputs,
        output_type: fibre.spec.output_type,
    };
    fibre.event_log.emit(EventKind::TaskStarted {
        task_id: Arc::clone(&fibre.id),
        runner_id: runner.id(),
        input_bytes: assignment.input_bytes(),
    });

    if let Err(error) = runner.submit(RunnerRequest::Run(assignment)) {
        fibre.pool.discard(runner);
        fibre.report(Err(error)).await;
        return;
    }

    loop {
        tokio::select! {
            response = runner.recv() => match response {
                Some(RunnerResponse::Progress { request_id: r, payload }) if r == request_id => {
                    fibre.event_log.emit(EventKind::TaskProgress {
                        task_id: Arc::clone(&fibre.id),
                        payload,
                    });
                }
                Some(RunnerResponse::Final { request_id: r, output }) if r == request_id => {
                    fibre.event_log.emit(EventKind::TaskCompleted {
                        task_id: Arc::clone(&fibre.id),
                        output_bytes: output.len(),
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                    fibre.pool.release(runner);
                    fibre.report(Ok(output)).await;
                    return;
                }
                Some(RunnerResponse::Error { request_id: r, message }) if r == request_id => {
                    fibre.event_log.emit(EventKind::TaskFailed {
                        task_id: Arc::clone(&fibre.id),
                        error: message.clone(),
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                    fibre.pool.release(runner);
                    fibre.report(Err(RunaError::TaskExecution {
                        task_id: fibre.id.to_string(),
                        reason: message,
                    })).await;
                    return;
                }
                // Stale correlation id: not ours, skip.
                Some(_) => {}
                None => {
                    let error = RunaError::RunnerUnresponsive { runner_id: runner.id() };
                    fibre.pool.discard(runner);
                    fibre.report(Err(error)).await;
                    return;
                }
            },
            _ = fibre.run_cancel.cancelled() => {
                runner.signal_abort(request_id, "workflow aborted");
                let acknowledged =
                    tokio::time::timeout(fibre.abort_grace, await_terminal(&mut runner, request_id))
                        .await
                        .unwrap_or(false);
                if acknowledged {
                    fibre.pool.release(runner);
                } else {
                    fibre.pool.discard(runner);
                }
                return;
            }
        }
    }
}

/// Wait for the terminal response of an aborted request
async fn await_terminal(runner: &mut Runner, request_id: RequestId) -> bool {
    while let Some(response) = runner.recv().await {
        if response.is_terminal() && response.request_id() == Some(request_id) {
            return true;
        }
    }
    false
}

/// Look up every dependency's published output.
///
/// A gate only opens after all dependencies published; a miss here is a
/// scheduler bug, not a user error.
fn resolve_inputs(spec: &TaskSpec, store: &ResultStore) -> ResolvedInputs {
    let mut inputs = ResolvedInputs::new();
    if let Some(deps) = &spec.dependencies {
        for (key, dep) in deps {
            let resolved = match dep {
                DepRef::Single(target) => ResolvedDep::Single(published(store, target)),
                DepRef::Group(targets) => {
                    ResolvedDep::Group(targets.iter().map(|t| published(store, t)).collect())
                }
            };
            inputs.insert(key.clone(), resolved);
        }
    }
    inputs
}

fn published(store: &ResultStore, target: &str) -> SharedBuffer {
    store
        .get(target)
        .unwrap_or_else(|| panic!("dependency '{target}' has no published output"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_inputs_reads_published_outputs() {
        let spec: TaskSpec = serde_json::from_value(json!({
            "id": "t", "type": "concat",
            "dependencies": { "one": "a", "many": ["a", "b"] }
        }))
        .unwrap();

        let store = ResultStore::new();
        store.insert(intern("a"), SharedBuffer::new(vec![1]));
        store.insert(intern("b"), SharedBuffer::new(vec![2, 3]));

        let inputs = resolve_inputs(&spec, &store);
        assert_eq!(inputs["one"].buffers()[0].as_slice(), &[1]);
        assert_eq!(inputs["many"].buffers().len(), 2);
        assert_eq!(inputs["many"].buffers()[1].as_slice(), &[2, 3]);
    }

    #[test]
    #[should_panic(expected = "no published output")]
    fn missing_published_output_is_a_structural_bug() {
        let spec: TaskSpec = serde_json::from_value(json!({
            "id": "t", "type": "concat",
            "dependencies": { "one": "ghost" }
        }))
        .unwrap();

        resolve_inputs(&spec, &ResultStore::new());
    }

    #[test]
    fn dep_targets_flatten_groups() {
        let spec: TaskSpec = serde_json::from_value(json!({
            "id": "t", "type": "concat",
            "dependencies": { "one": "a", "many": ["b", "c"] }
        }))
        .unwrap();

        let targets = dep_targets(&spec);
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].as_ref(), "a");
        assert_eq!(targets[2].as_ref(), "c");
    }
}
