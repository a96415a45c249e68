//! Client for queue-based generation services: join a work queue, then wait
//! on a session-scoped event stream for the job to complete.

mod poller;
mod source;
mod state;

pub use poller::{await_completion, QueuePoller};
pub use source::{EventSource, HttpEventSource};
pub use state::{QueueFailure, QueueState};

use serde::Deserialize;
use serde_json::Value;

pub const MSG_PROCESS_COMPLETED: &str = "process_completed";
pub const MSG_CLOSE_STREAM: &str = "close_stream";

/// A job enqueued with the queue service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSession {
    pub session_hash: String,
    pub event_id: String,
}

/// One message from the queue event stream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueueMessage {
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub output: Option<Value>,
}

impl QueueMessage {
    /// URL of the first output file of a completed job.
    #[must_use]
    pub fn result_url(&self) -> Option<&str> {
        self.output
            .as_ref()?
            .get("data")?
            .get(0)?
            .get("url")?
            .as_str()
    }

    /// Error text reported by the service for a failed job.
    #[must_use]
    pub fn error_text(&self) -> Option<&str> {
        self.output.as_ref()?.get("error")?.as_str()
    }
}
