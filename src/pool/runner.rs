//! Runner - one isolated execution context
//!
//! A runner is a dedicated OS thread communicating with the scheduler
//! over message channels only. It serves one request at a time: a `Run`
//! arriving while another is in flight is answered with a busy error.
//!
//! Lifecycle: spawn → `Ready` handshake → admitted to the pool →
//! serve requests → retired when its channels drop.
//!
//! The response pipe is bounded: `Progress` messages are dropped when it
//! is full (try_send), terminal messages block until delivered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::buffer::SharedBuffer;
use crate::error::{Result, RunaError};
use crate::protocol::{RequestId, RunnerRequest, RunnerResponse, TaskAssignment};
use crate::registry::{TaskContext, TaskRegistry};

/// Handle to a pooled worker thread.
///
/// Held exclusively by one scheduler fibre between acquire and release;
/// the pool enforces single ownership.
#[derive(Debug)]
pub struct Runner {
    id: u64,
    commands: mpsc::UnboundedSender<RunnerRequest>,
    responses: mpsc::Receiver<RunnerResponse>,
    cancel: Arc<AtomicBool>,
}

impl Runner {
    /// Spawn a worker thread and await its `Ready` handshake.
    ///
    /// Construction fails if the thread cannot start, exits early, or
    /// sends anything other than `Ready` first.
    pub(crate) async fn spawn(
        id: u64,
        registry: TaskRegistry,
        response_capacity: usize,
        ready_timeout: Duration,
    ) -> Result<Runner> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (resp_tx, mut resp_rx) = mpsc::channel(response_capacity.max(1));
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);

        std::thread::Builder::new()
            .name(format!("runa-runner-{id}"))
            .spawn(move || worker_loop(id, registry, cmd_rx, resp_tx, worker_cancel))
            .map_err(|e| RunaError::RunnerSpawnFailed {
                reason: e.to_string(),
            })?;

        match tokio::time::timeout(ready_timeout, resp_rx.recv()).await {
            Ok(Some(RunnerResponse::Ready { .. })) => Ok(Self {
                id,
                commands: cmd_tx,
                responses: resp_rx,
                cancel,
            }),
            Ok(Some(other)) => Err(RunaError::RunnerSpawnFailed {
                reason: format!("runner {id} sent {other:?} before ready"),
            }),
            Ok(None) => Err(RunaError::RunnerSpawnFailed {
                reason: format!("runner {id} exited before ready"),
            }),
            Err(_) => Err(RunaError::RunnerSpawnFailed {
                reason: format!("runner {id} missed the ready window"),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Send a request to the worker
    pub(crate) fn submit(&self, request: RunnerRequest) -> Result<()> {
        self.commands
            .send(request)
            .map_err(|_| RunaError::RunnerUnresponsive { runner_id: self.id })
    }

    /// Next response; None when the worker has exited
    pub(crate) async fn recv(&mut self) -> Option<RunnerResponse> {
        self.responses.recv().await
    }

    /// Request cooperative cancellation of the in-flight request.
    ///
    /// Sets the cancellation flag the task body polls and queues an
    /// `Abort` message for protocol bookkeeping.
    pub(crate) fn signal_abort(&self, request_id: RequestId, reason: &str) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.commands.send(RunnerRequest::Abort {
            request_id,
            reason: reason.to_string(),
        });
    }
}

/// Worker thread body: serve requests until the command channel closes
fn worker_loop(
    id: u64,
    registry: TaskRegistry,
    mut commands: mpsc::UnboundedReceiver<RunnerRequest>,
    responses: mpsc::Sender<RunnerResponse>,
    cancel: Arc<AtomicBool>,
) {
    if responses
        .blocking_send(RunnerResponse::Ready { runner_id: id })
        .is_err()
    {
        return;
    }

    while let Some(request) = commands.blocking_recv() {
        match request {
            RunnerRequest::Run(assignment) => {
                let request_id = assignment.request_id;
                cancel.store(false, Ordering::SeqCst);

                let terminal = match execute(&registry, assignment, &cancel, &responses) {
                    Ok(output) => RunnerResponse::Final { request_id, output },
                    Err(message) => RunnerResponse::Error {
                        request_id,
                        message,
                    },
                };
                if responses.blocking_send(terminal).is_err() {
                    return;
                }

                // Anything that queued while we were serving gets the
                // single-request treatment: runs are rejected busy, late
                // aborts for the finished request are no-ops.
                while let Ok(stale) = commands.try_recv() {
                    match stale {
                        RunnerRequest::Run(rejected) => {
                            let _ = responses.blocking_send(RunnerResponse::Error {
                                request_id: rejected.request_id,
                                message: "worker is busy".to_string(),
                            });
                        }
                        RunnerRequest::Abort { .. } => {}
                    }
                }
            }
            // Abort with nothing in flight: ignore
            RunnerRequest::Abort { .. } => {}
        }
    }

    debug!(runner_id = id, "runner thread exiting");
}

/// Run one assignment through the registry
fn execute(
    registry: &TaskRegistry,
    assignment: TaskAssignment,
    cancel: &Arc<AtomicBool>,
    responses: &mpsc::Sender<RunnerResponse>,
) -> std::result::Result<SharedBuffer, String> {
    let request_id = assignment.request_id;
    let task_id = Arc::clone(&assignment.task_id);
    let output_type = assignment.output_type;

    let Some(body) = registry.get(&assignment.task_type) else {
        return Err(format!(
            "no task implementation registered for type '{}'",
            assignment.task_type
        ));
    };

    let progress_pipe = responses.clone();
    let ctx = TaskContext::new(
        assignment,
        Arc::clone(cancel),
        Box::new(move |payload| {
            // Bounded pipe: progress is droppable, never blocking
            let _ = progress_pipe.try_send(RunnerResponse::Progress {
                request_id,
                payload,
            });
        }),
    );

    let bytes = body.run(&ctx)?;
    if !output_type.accepts_len(bytes.len()) {
        return Err(format!(
            "task '{}' produced {} bytes, not a multiple of {} ({})",
            task_id,
            bytes.len(),
            output_type.element_size(),
            output_type.tag()
        ));
    }
    Ok(SharedBuffer::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BufferType;
    use crate::util::intern;
    use indexmap::IndexMap;
    use serde_json::json;

    fn assignment(request_id: RequestId, task_type: &str) -> TaskAssignment {
        TaskAssignment {
            request_id,
            task_id: intern("t"),
            task_type: task_type.to_string(),
            config: None,
            inputs: IndexMap::new(),
            output_type: BufferType::Uint8,
        }
    }

    async fn spawn_with(registry: TaskRegistry) -> Runner {
        Runner::spawn(0, registry, 8, Duration::from_secs(2))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn run_round_trip() {
        let registry = TaskRegistry::new();
        registry.register_fn("bytes", |_| Ok(vec![1, 2, 3]));
        let mut runner = spawn_with(registry).await;

        runner
            .submit(RunnerRequest::Run(assignment(1, "bytes")))
            .unwrap();

        match runner.recv().await.unwrap() {
            RunnerResponse::Final { request_id, output } => {
                assert_eq!(request_id, 1);
                assert_eq!(output.as_slice(), &[1, 2, 3]);
            }
            other => panic!("expected Final, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_type_reports_error() {
        let mut runner = spawn_with(TaskRegistry::new()).await;

        runner
            .submit(RunnerRequest::Run(assignment(1, "ghost")))
            .unwrap();

        match runner.recv().await.unwrap() {
            RunnerResponse::Error { message, .. } => {
                assert!(message.contains("ghost"));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn output_length_is_validated() {
        let registry = TaskRegistry::new();
        registry.register_fn("odd", |_| Ok(vec![0, 1, 2])); // 3 bytes
        let mut runner = spawn_with(registry).await;

        let mut a = assignment(1, "odd");
        a.output_type = BufferType::Float32; // Needs multiples of 4
        runner.submit(RunnerRequest::Run(a)).unwrap();

        match runner.recv().await.unwrap() {
            RunnerResponse::Error { message, .. } => {
                assert!(message.contains("multiple of 4"));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_run_while_busy_is_rejected() {
        let registry = TaskRegistry::new();
        registry.register_fn("sleepy", |_| {
            std::thread::sleep(Duration::from_millis(80));
            Ok(vec![0])
        });
        let mut runner = spawn_with(registry).await;

        runner
            .submit(RunnerRequest::Run(assignment(1, "sleepy")))
            .unwrap();
        runner
            .submit(RunnerRequest::Run(assignment(2, "sleepy")))
            .unwrap();

        match runner.recv().await.unwrap() {
            RunnerResponse::Final { request_id, .. } => assert_eq!(request_id, 1),
            other => panic!("expected Final, got {other:?}"),
        }
        match runner.recv().await.unwrap() {
            RunnerResponse::Error {
                request_id,
                message,
            } => {
                assert_eq!(request_id, 2);
                assert!(message.contains("busy"));
            }
            other => panic!("expected busy Error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn progress_messages_are_relayed() {
        let registry = TaskRegistry::new();
        registry.register_fn("steps", |ctx| {
            ctx.progress(json!({ "step": 1 }));
            ctx.progress(json!({ "step": 2 }));
            Ok(vec![9])
        });
        let mut runner = spawn_with(registry).await;

        runner
            .submit(RunnerRequest::Run(assignment(1, "steps")))
            .unwrap();

        let mut progress = 0;
        loop {
            match runner.recv().await.unwrap() {
                RunnerResponse::Progress { .. } => progress += 1,
                RunnerResponse::Final { .. } => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(progress, 2);
    }

    #[tokio::test]
    async fn abort_flag_reaches_the_body() {
        let registry = TaskRegistry::new();
        registry.register_fn("poller", |ctx| {
            for _ in 0..200 {
                if ctx.is_cancelled() {
                    return Err("aborted".to_string());
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(vec![0])
        });
        let mut runner = spawn_with(registry).await;

        runner
            .submit(RunnerRequest::Run(assignment(1, "poller")))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        runner.signal_abort(1, "test abort");

        match runner.recv().await.unwrap() {
            RunnerResponse::Error { message, .. } => assert_eq!(message, "aborted"),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn idle_abort_is_ignored() {
        let registry = TaskRegistry::new();
        registry.register_fn("bytes", |_| Ok(vec![7]));
        let mut runner = spawn_with(registry).await;

        runner.signal_abort(99, "nothing in flight");
        runner
            .submit(RunnerRequest::Run(assignment(1, "bytes")))
            .unwrap();

        // The stale abort left the runner serviceable... but the flag is
        // cleared at Run start, so the body runs to completion.
        match runner.recv().await.unwrap() {
            RunnerResponse::Final { request_id, .. } => assert_eq!(request_id, 1),
            other => panic!("expected Final, got {other:?}"),
        }
    }
}
