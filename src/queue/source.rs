use std::future::Future;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use super::QueueMessage;
use crate::error::ProxyError;
use crate::stream::{sse_event_stream, SseEvent};

/// A stream of queue messages that must be closed when the caller is done.
pub trait EventSource: Send {
    /// Next message; `None` once the stream has ended or been closed.
    fn next_message(
        &mut self,
    ) -> impl Future<Output = Option<Result<QueueMessage, ProxyError>>> + Send;

    fn close(&mut self);
}

type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent, reqwest::Error>> + Send>>;

/// Queue messages read from an SSE response body.
pub struct HttpEventSource {
    events: Option<EventStream>,
}

impl HttpEventSource {
    #[must_use]
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            events: Some(Box::pin(sse_event_stream(response.bytes_stream()))),
        }
    }
}

impl EventSource for HttpEventSource {
    async fn next_message(&mut self) -> Option<Result<QueueMessage, ProxyError>> {
        loop {
            let event = match self.events.as_mut()?.next().await? {
                Ok(event) => event,
                Err(err) => return Some(Err(ProxyError::BackendUnavailable(err.to_string()))),
            };
            match serde_json::from_str::<QueueMessage>(&event.data) {
                Ok(message) => return Some(Ok(message)),
                Err(err) => {
                    tracing::debug!(error = %err, data = %event.data, "skipping undecodable queue event");
                }
            }
        }
    }

    fn close(&mut self) {
        // Dropping the body stream releases the connection.
        self.events = None;
    }
}
