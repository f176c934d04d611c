//! WorkflowStream - the caller-facing result sequence
//!
//! Single-consumer stream of run events. The backing channel holds one
//! slot: the scheduler cannot emit the next event until the consumer
//! awaits, which is the engine's backpressure mechanism.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use crate::buffer::SharedBuffer;
use crate::error::{Result, RunaError};
use crate::event::EventLog;

/// An event on the result stream
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// One task completed and published its output. Emission order
    /// follows completion order; exactly one per task.
    Intermediate {
        task_id: Arc<str>,
        output: SharedBuffer,
    },
    /// Every task completed. Always the last event on a successful run.
    Final {
        results: FxHashMap<Arc<str>, SharedBuffer>,
    },
}

impl WorkflowEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, WorkflowEvent::Final { .. })
    }
}

/// Streamed results of a single workflow run.
///
/// Yields `Intermediate` events as tasks complete, then exactly one
/// `Final`, unless the run errors - an error terminates the stream.
#[derive(Debug)]
pub struct WorkflowStream {
    run_id: String,
    events: mpsc::Receiver<Result<WorkflowEvent>>,
    event_log: EventLog,
}

impl WorkflowStream {
    pub(crate) fn new(
        run_id: String,
        events: mpsc::Receiver<Result<WorkflowEvent>>,
        event_log: EventLog,
    ) -> Self {
        Self {
            run_id,
            events,
            event_log,
        }
    }

    /// Unique id of this run (carried on wire envelopes)
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The run's audit trail
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Next event, or None once the stream is exhausted
    pub async fn next(&mut self) -> Option<Result<WorkflowEvent>> {
        self.events.recv().await
    }

    /// Drain the stream and return the final result map.
    ///
    /// Discards intermediates; surfaces the terminal error if the run
    /// failed or was aborted.
    pub async fn collect_results(mut self) -> Result<FxHashMap<Arc<str>, SharedBuffer>> {
        while let Some(event) = self.next().await {
            match event? {
                WorkflowEvent::Final { results } => return Ok(results),
                WorkflowEvent::Intermediate { .. } => {}
            }
        }
        Err(RunaError::Aborted {
            reason: "stream ended without a final result".to_string(),
        })
    }
}
