use serde::Serialize;

use super::{EventSource, HttpEventSource, QueueSession, QueueState};
use crate::error::ProxyError;
use crate::transport::{upstream_error_message, HttpTransport};
use crate::util::random_base36;

const SESSION_HASH_LEN: usize = 11;

#[derive(Serialize)]
struct JoinRequest<'a, D> {
    data: &'a D,
    fn_index: u32,
    session_hash: &'a str,
}

/// Closes the wrapped source exactly once, on every exit path.
struct CloseGuard<'a, S: EventSource> {
    source: &'a mut S,
    closed: bool,
}

impl<'a, S: EventSource> CloseGuard<'a, S> {
    fn new(source: &'a mut S) -> Self {
        Self {
            source,
            closed: false,
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.source.close();
        }
    }
}

impl<S: EventSource> Drop for CloseGuard<'_, S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Wait on `source` until the job identified by `session.event_id` finishes.
///
/// # Errors
///
/// Returns [`ProxyError::BackendUnavailable`] when the stream breaks and
/// [`ProxyError::Backend`] when the service closes the stream or reports a
/// failed job.
pub async fn await_completion<S: EventSource>(
    source: &mut S,
    session: &QueueSession,
) -> Result<String, ProxyError> {
    let mut guard = CloseGuard::new(source);
    let mut state = QueueState::Joined.on_stream_opened();

    while !state.is_terminal() {
        state = match guard.source.next_message().await {
            Some(Ok(message)) => state.on_message(&message, &session.event_id),
            Some(Err(err)) => state.on_stream_error(&err),
            None => state.on_stream_end(),
        };
    }

    guard.close();
    tracing::debug!(
        session = %session.session_hash,
        event_id = %session.event_id,
        state = ?state,
        "queue job finished"
    );
    state.take_outcome()
}

/// Join-then-listen client for one queue service.
pub struct QueuePoller<'a> {
    transport: &'a HttpTransport,
    base_url: &'a str,
    fn_index: u32,
}

impl<'a> QueuePoller<'a> {
    #[must_use]
    pub fn new(transport: &'a HttpTransport, base_url: &'a str, fn_index: u32) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/'),
            fn_index,
        }
    }

    /// Enqueue a job with positional `data` under a fresh session.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::BackendUnavailable`] when the join call fails,
    /// answers with a non-2xx status, or carries no `event_id`.
    pub async fn join<D: Serialize>(&self, data: &D) -> Result<QueueSession, ProxyError> {
        let session_hash = random_base36(SESSION_HASH_LEN);
        let body = serde_json::to_vec(&JoinRequest {
            data,
            fn_index: self.fn_index,
            session_hash: &session_hash,
        })
        .map_err(|err| ProxyError::Internal(format!("Failed to encode queue payload: {err}")))?;

        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        let url = format!("{}/gradio_api/queue/join", self.base_url);
        let response = self
            .transport
            .send_request(&url, http::Method::POST, &headers, body.into())
            .await?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ProxyError::BackendUnavailable(format!("queue join body: {err}")))?;
        if !status.is_success() {
            return Err(ProxyError::BackendUnavailable(format!(
                "queue join returned {status}: {}",
                upstream_error_message(&bytes)
            )));
        }

        let event_id = serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()
            .and_then(|json| json.get("event_id")?.as_str().map(ToString::to_string))
            .ok_or_else(|| {
                ProxyError::BackendUnavailable("queue join response has no event_id".to_string())
            })?;

        tracing::debug!(session = %session_hash, event_id = %event_id, "joined generation queue");
        Ok(QueueSession {
            session_hash,
            event_id,
        })
    }

    /// Open the session-scoped event stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::BackendUnavailable`] when the stream cannot be opened.
    pub async fn open(&self, session: &QueueSession) -> Result<HttpEventSource, ProxyError> {
        let mut url = url::Url::parse(&format!("{}/gradio_api/queue/data", self.base_url))
            .map_err(|err| ProxyError::Internal(format!("Invalid queue URL: {err}")))?;
        url.query_pairs_mut()
            .append_pair("session_hash", &session.session_hash);

        let response = self.transport.open_event_stream(&url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::BackendUnavailable(format!(
                "queue event stream returned {status}"
            )));
        }
        Ok(HttpEventSource::new(response))
    }

    /// Join, listen and return the result URL of the job.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`QueuePoller::join`], [`QueuePoller::open`] and
    /// [`await_completion`].
    pub async fn run<D: Serialize>(&self, data: &D) -> Result<String, ProxyError> {
        let session = self.join(data).await?;
        let mut source = self.open(&session).await?;
        await_completion(&mut source, &session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{QueueMessage, MSG_CLOSE_STREAM, MSG_PROCESS_COMPLETED};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::future::Future;

    struct ScriptedSource {
        items: VecDeque<Result<QueueMessage, ProxyError>>,
        close_calls: usize,
        reads_after_close: usize,
    }

    impl ScriptedSource {
        fn new(items: Vec<Result<QueueMessage, ProxyError>>) -> Self {
            Self {
                items: items.into(),
                close_calls: 0,
                reads_after_close: 0,
            }
        }
    }

    impl EventSource for ScriptedSource {
        fn next_message(
            &mut self,
        ) -> impl Future<Output = Option<Result<QueueMessage, ProxyError>>> + Send {
            if self.close_calls > 0 {
                self.reads_after_close += 1;
            }
            let next = self.items.pop_front();
            async move { next }
        }

        fn close(&mut self) {
            self.close_calls += 1;
        }
    }

    fn session() -> QueueSession {
        QueueSession {
            session_hash: "abc123".into(),
            event_id: "e1".into(),
        }
    }

    fn completed(event_id: &str, url: &str) -> QueueMessage {
        QueueMessage {
            msg: MSG_PROCESS_COMPLETED.into(),
            event_id: Some(event_id.into()),
            success: Some(true),
            output: Some(json!({"data": [{"url": url}]})),
        }
    }

    #[tokio::test]
    async fn test_resolves_on_matching_completion_and_closes_once() {
        let mut source = ScriptedSource::new(vec![
            Ok(QueueMessage {
                msg: "estimation".into(),
                event_id: Some("e1".into()),
                ..QueueMessage::default()
            }),
            Ok(completed("e2", "https://space/wrong.webp")),
            Ok(completed("e1", "https://space/right.webp")),
            Ok(completed("e1", "https://space/late.webp")),
        ]);

        let url = await_completion(&mut source, &session()).await.unwrap();
        assert_eq!(url, "https://space/right.webp");
        assert_eq!(source.close_calls, 1);
        assert_eq!(source.reads_after_close, 0);
        assert_eq!(source.items.len(), 1);
    }

    #[tokio::test]
    async fn test_close_stream_rejects_and_closes_once() {
        let mut source = ScriptedSource::new(vec![Ok(QueueMessage {
            msg: MSG_CLOSE_STREAM.into(),
            ..QueueMessage::default()
        })]);
        let err = await_completion(&mut source, &session()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Backend { .. }));
        assert_eq!(source.close_calls, 1);
    }

    #[tokio::test]
    async fn test_stream_error_surfaces_and_closes_once() {
        let mut source = ScriptedSource::new(vec![Err(ProxyError::BackendUnavailable(
            "connection reset".into(),
        ))]);
        let err = await_completion(&mut source, &session()).await.unwrap_err();
        let ProxyError::BackendUnavailable(message) = err else {
            panic!("expected BackendUnavailable, got {err:?}");
        };
        assert!(message.contains("connection reset"));
        assert_eq!(source.close_calls, 1);
    }

    #[tokio::test]
    async fn test_end_of_stream_fails_and_closes_once() {
        let mut source = ScriptedSource::new(vec![]);
        assert!(await_completion(&mut source, &session()).await.is_err());
        assert_eq!(source.close_calls, 1);
    }
}
