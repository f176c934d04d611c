//! Runner protocol - logical messages and wire envelopes
//!
//! The scheduler and a runner communicate over bounded channels with
//! request/response messages correlated by `request_id`:
//!
//! - engine→runner: [`RunnerRequest::Run`], [`RunnerRequest::Abort`]
//! - runner→engine: [`RunnerResponse::Ready`] (once, at startup),
//!   [`RunnerResponse::Progress`] (zero or more),
//!   [`RunnerResponse::Final`] (exactly one on success),
//!   [`RunnerResponse::Error`] (terminal on failure)
//!
//! A runner serves one request at a time: a `Run` arriving while another
//! is in flight is answered with `Error { "worker is busy" }`.
//!
//! [`Envelope`] is the serialisable wire shape used on the caller-facing
//! result stream:
//!
//! ```json
//! { "type": "workflow:result", "id": "<run_id>",
//!   "ok": true, "finish": false,
//!   "payload": { "taskId": "a", "output": [0] } }
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::{json, Value};

use crate::ast::BufferType;
use crate::buffer::SharedBuffer;
use crate::error::RunaError;

/// Correlates a runner's responses to one dispatched task
pub type RequestId = u64;

/// Resolved dependency inputs, keyed by dep key in declaration order
pub type ResolvedInputs = IndexMap<String, ResolvedDep>;

/// A dependency value after resolution against published outputs
#[derive(Debug, Clone)]
pub enum ResolvedDep {
    Single(SharedBuffer),
    Group(Vec<SharedBuffer>),
}

impl ResolvedDep {
    /// Buffers in position order (one for a scalar ref)
    pub fn buffers(&self) -> &[SharedBuffer] {
        match self {
            ResolvedDep::Single(b) => std::slice::from_ref(b),
            ResolvedDep::Group(v) => v.as_slice(),
        }
    }

    /// Total byte size across all buffers
    pub fn byte_len(&self) -> usize {
        self.buffers().iter().map(SharedBuffer::len).sum()
    }
}

/// Everything a runner needs to execute one task
#[derive(Debug, Clone)]
pub struct TaskAssignment {
    pub request_id: RequestId,
    pub task_id: Arc<str>,
    pub task_type: String,
    pub config: Option<serde_json::Map<String, Value>>,
    pub inputs: ResolvedInputs,
    pub output_type: BufferType,
}

impl TaskAssignment {
    /// Total resolved input size in bytes
    pub fn input_bytes(&self) -> usize {
        self.inputs.values().map(ResolvedDep::byte_len).sum()
    }
}

/// engine→runner messages
#[derive(Debug)]
pub enum RunnerRequest {
    Run(TaskAssignment),
    Abort {
        request_id: RequestId,
        reason: String,
    },
}

/// runner→engine messages
#[derive(Debug)]
pub enum RunnerResponse {
    /// Sent once at startup; the pool admits the runner after this
    Ready { runner_id: u64 },
    /// Zero or more intermediates; may be dropped under backpressure
    Progress {
        request_id: RequestId,
        payload: Value,
    },
    /// Exactly one on success; never dropped
    Final {
        request_id: RequestId,
        output: SharedBuffer,
    },
    /// Terminal on failure; never dropped
    Error {
        request_id: RequestId,
        message: String,
    },
}

impl RunnerResponse {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Ready { .. } => None,
            Self::Progress { request_id, .. }
            | Self::Final { request_id, .. }
            | Self::Error { request_id, .. } => Some(*request_id),
        }
    }

    /// Final and Error end a request; Progress does not
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final { .. } | Self::Error { .. })
    }
}

/// Message type for caller-facing result envelopes
pub const WORKFLOW_RESULT: &str = "workflow:result";

/// Serialisable wire envelope for the result stream.
///
/// Every message carries `id` (run correlation), `type` and `ok`;
/// `finish`, `payload` and `error` are present when meaningful.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// One task's published output
    pub fn intermediate(run_id: &str, task_id: &str, output: &SharedBuffer) -> Self {
        Self {
            id: run_id.to_string(),
            kind: WORKFLOW_RESULT,
            ok: true,
            finish: Some(false),
            payload: Some(json!({
                "taskId": task_id,
                "output": output,
            })),
            error: None,
        }
    }

    /// The final aggregate of every task's output
    pub fn final_result(run_id: &str, results: &FxHashMap<Arc<str>, SharedBuffer>) -> Self {
        let map: serde_json::Map<String, Value> = results
            .iter()
            .map(|(id, buf)| {
                (
                    id.to_string(),
                    serde_json::to_value(buf).unwrap_or(Value::Null),
                )
            })
            .collect();
        Self {
            id: run_id.to_string(),
            kind: WORKFLOW_RESULT,
            ok: true,
            finish: Some(true),
            payload: Some(json!({ "results": map })),
            error: None,
        }
    }

    /// Terminal failure envelope
    pub fn failure(run_id: &str, error: &RunaError) -> Self {
        Self {
            id: run_id.to_string(),
            kind: WORKFLOW_RESULT,
            ok: false,
            finish: Some(true),
            payload: None,
            error: Some(error.to_string()),
        }
    }
}
