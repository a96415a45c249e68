use std::fmt;

use super::{QueueMessage, MSG_CLOSE_STREAM, MSG_PROCESS_COMPLETED};
use crate::error::ProxyError;

/// Why a queued job did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueFailure {
    /// The event stream broke at the transport level.
    StreamError(String),
    /// The service sent `close_stream` before completing the job.
    ClosedByServer,
    /// The job completed without a usable result.
    GenerationFailed(String),
    /// The stream ended without a terminal message.
    EndedEarly,
}

impl fmt::Display for QueueFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueFailure::StreamError(err) => write!(f, "queue event stream error: {err}"),
            QueueFailure::ClosedByServer => write!(f, "queue service closed the stream"),
            QueueFailure::GenerationFailed(err) => write!(f, "queued generation failed: {err}"),
            QueueFailure::EndedEarly => write!(f, "queue event stream ended before completion"),
        }
    }
}

/// Lifecycle of one queued job.
///
/// `Joined` → `AwaitingEvent` → `Completed` | `Failed`; once the stream has
/// been closed and the outcome taken, the state is `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueState {
    Joined,
    AwaitingEvent,
    Completed(String),
    Failed(QueueFailure),
    Closed,
}

impl QueueState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueState::Completed(_) | QueueState::Failed(_) | QueueState::Closed
        )
    }

    #[must_use]
    pub fn on_stream_opened(self) -> Self {
        match self {
            QueueState::Joined => QueueState::AwaitingEvent,
            other => other,
        }
    }

    /// Apply a stream message.
    ///
    /// Messages for another event id are ignored. A `close_stream` without an
    /// event id applies to the whole session.
    #[must_use]
    pub fn on_message(self, message: &QueueMessage, expected_event_id: &str) -> Self {
        if self.is_terminal() {
            return self;
        }
        match message.event_id.as_deref() {
            Some(event_id) if event_id != expected_event_id => return self,
            None if message.msg != MSG_CLOSE_STREAM => return self,
            _ => {}
        }

        match message.msg.as_str() {
            MSG_PROCESS_COMPLETED => {
                if message.success == Some(false) {
                    let reason = message.error_text().unwrap_or("no error detail");
                    return QueueState::Failed(QueueFailure::GenerationFailed(reason.to_string()));
                }
                match message.result_url() {
                    Some(url) => QueueState::Completed(url.to_string()),
                    None => QueueState::Failed(QueueFailure::GenerationFailed(
                        "completion message carried no output url".to_string(),
                    )),
                }
            }
            MSG_CLOSE_STREAM => QueueState::Failed(QueueFailure::ClosedByServer),
            _ => QueueState::AwaitingEvent,
        }
    }

    #[must_use]
    pub fn on_stream_error(self, error: &ProxyError) -> Self {
        if self.is_terminal() {
            return self;
        }
        QueueState::Failed(QueueFailure::StreamError(error.to_string()))
    }

    #[must_use]
    pub fn on_stream_end(self) -> Self {
        if self.is_terminal() {
            return self;
        }
        QueueState::Failed(QueueFailure::EndedEarly)
    }

    /// Move to `Closed` and return the job outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::BackendUnavailable`] for stream failures and
    /// [`ProxyError::Backend`] when the service reported a failed job.
    pub fn take_outcome(&mut self) -> Result<String, ProxyError> {
        match std::mem::replace(self, QueueState::Closed) {
            QueueState::Completed(url) => Ok(url),
            QueueState::Failed(failure @ QueueFailure::StreamError(_)) => {
                Err(ProxyError::BackendUnavailable(failure.to_string()))
            }
            QueueState::Failed(failure) => Err(ProxyError::Backend {
                status: 502,
                message: failure.to_string(),
            }),
            QueueState::Closed => Err(ProxyError::Internal(
                "queue outcome was already taken".to_string(),
            )),
            QueueState::Joined | QueueState::AwaitingEvent => Err(ProxyError::Internal(
                "queue job has not finished".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(msg: &str, event_id: Option<&str>) -> QueueMessage {
        QueueMessage {
            msg: msg.to_string(),
            event_id: event_id.map(ToString::to_string),
            success: Some(true),
            output: Some(json!({"data": [{"url": "https://space/file=out.webp"}]})),
        }
    }

    #[test]
    fn test_mismatched_event_is_ignored() {
        let state = QueueState::Joined.on_stream_opened();
        let next = state.on_message(&message(MSG_PROCESS_COMPLETED, Some("other")), "e1");
        assert_eq!(next, QueueState::AwaitingEvent);
    }

    #[test]
    fn test_matching_completion_resolves_url() {
        let state = QueueState::AwaitingEvent
            .on_message(&message("process_generating", Some("e1")), "e1")
            .on_message(&message(MSG_PROCESS_COMPLETED, Some("e1")), "e1");
        assert_eq!(
            state,
            QueueState::Completed("https://space/file=out.webp".to_string())
        );
    }

    #[test]
    fn test_close_stream_fails() {
        let state =
            QueueState::AwaitingEvent.on_message(&message(MSG_CLOSE_STREAM, None), "e1");
        assert_eq!(state, QueueState::Failed(QueueFailure::ClosedByServer));

        let state =
            QueueState::AwaitingEvent.on_message(&message(MSG_CLOSE_STREAM, Some("e2")), "e1");
        assert_eq!(state, QueueState::AwaitingEvent);
    }

    #[test]
    fn test_unsuccessful_completion_fails_with_detail() {
        let mut failed = message(MSG_PROCESS_COMPLETED, Some("e1"));
        failed.success = Some(false);
        failed.output = Some(json!({"error": "GPU quota exceeded"}));
        let state = QueueState::AwaitingEvent.on_message(&failed, "e1");
        assert_eq!(
            state,
            QueueState::Failed(QueueFailure::GenerationFailed(
                "GPU quota exceeded".to_string()
            ))
        );
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let done = QueueState::Completed("u".into());
        assert_eq!(
            done.clone()
                .on_message(&message(MSG_CLOSE_STREAM, None), "e1"),
            done
        );
        assert_eq!(done.clone().on_stream_end(), done);
    }

    #[test]
    fn test_take_outcome_closes() {
        let mut state = QueueState::Failed(QueueFailure::StreamError("reset".into()));
        assert!(matches!(
            state.take_outcome(),
            Err(ProxyError::BackendUnavailable(_))
        ));
        assert_eq!(state, QueueState::Closed);

        let mut state = QueueState::Completed("u".into());
        assert_eq!(state.take_outcome().unwrap(), "u");
        assert!(state.take_outcome().is_err());
    }
}
