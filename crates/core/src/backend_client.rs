use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::future::retry;
use layra_model::{
    BackendError, ChatBackend, ChatRequest, HistoryTurn, ReplyStream,
    StreamEvent,
};
use tracing::Instrument;

type BoxedError = Box<dyn BackendError>;
type BoxedFuture<T> =
    Pin<Box<dyn Future<Output = Result<T, BoxedError>> + Send>>;

/// Default time budget for retrying a history fetch.
pub const DEFAULT_HISTORY_RETRY: Duration = Duration::from_secs(10);

trait ErasedBackend: Send + Sync {
    fn fetch_history(&self, conversation_id: &str)
    -> BoxedFuture<Vec<HistoryTurn>>;

    fn send_message(&self, req: &ChatRequest) -> BoxedFuture<Reply>;
}

impl<B: ChatBackend + 'static> ErasedBackend for B {
    fn fetch_history(
        &self,
        conversation_id: &str,
    ) -> BoxedFuture<Vec<HistoryTurn>> {
        let fut = ChatBackend::fetch_history(self, conversation_id);
        Box::pin(async move {
            fut.await.map_err(|err| Box::new(err) as BoxedError)
        })
    }

    fn send_message(&self, req: &ChatRequest) -> BoxedFuture<Reply> {
        let fut = ChatBackend::send_message(self, req);
        Box::pin(async move {
            match fut.await {
                Ok(reply) => Ok(Reply {
                    inner: Box::pin(reply),
                }),
                Err(err) => Err(Box::new(err) as BoxedError),
            }
        })
    }
}

trait ErasedReply: Send {
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, BoxedError>>;
}

impl<R: ReplyStream> ErasedReply for R {
    #[inline]
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, BoxedError>> {
        ReplyStream::poll_next_event(self, cx)
            .map_err(|err| Box::new(err) as BoxedError)
    }
}

/// A type-erased reply stream.
pub struct Reply {
    inner: Pin<Box<dyn ErasedReply>>,
}

impl Reply {
    /// Waits for the next event, returns `None` when the reply completes.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. No event is lost if the returned
    /// future is dropped before it completes.
    #[inline]
    pub async fn next_event(
        &mut self,
    ) -> Result<Option<StreamEvent>, BoxedError> {
        poll_fn(|cx| self.inner.as_mut().poll_next_event(cx)).await
    }
}

/// A wrapper around a chat backend that retries the idempotent calls and
/// provides a type-erased interface for the other modules.
#[derive(Clone)]
pub struct BackendClient {
    backend: Arc<dyn ErasedBackend>,
    history_retry: Duration,
}

impl BackendClient {
    #[inline]
    pub fn new<B: ChatBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            history_retry: DEFAULT_HISTORY_RETRY,
        }
    }

    /// Sets how long transient history fetch failures are retried.
    #[inline]
    pub fn with_history_retry(mut self, duration: Duration) -> Self {
        self.history_retry = duration;
        self
    }

    /// Fetches the history of a conversation.
    ///
    /// Transient failures are retried with exponential backoff until the
    /// retry budget runs out, other failures are returned immediately.
    pub async fn fetch_history(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<HistoryTurn>, BoxedError> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.history_retry),
            ..Default::default()
        };
        let operation = || {
            let fut = self.backend.fetch_history(conversation_id);
            async move {
                fut.await.map_err(|err| {
                    if err.kind().is_transient() {
                        warn!("failed to fetch history, will retry: {err}");
                        backoff::Error::transient(err)
                    } else {
                        error!("failed to fetch history: {err}");
                        backoff::Error::permanent(err)
                    }
                })
            }
        };

        let turns = retry(policy, operation)
            .instrument(trace_span!("fetch history", conversation_id))
            .await?;
        debug!("fetched {} history turns", turns.len());
        Ok(turns)
    }

    /// Sends a user message and returns the reply stream.
    ///
    /// Sending is not idempotent, so it's never retried.
    pub async fn send_message(
        &self,
        req: &ChatRequest,
    ) -> Result<Reply, BoxedError> {
        trace!("sending a request: {req:?}");
        self.backend
            .send_message(req)
            .instrument(trace_span!("send message"))
            .await
            .inspect_err(|err| error!("got an error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use layra_model::ErrorKind;
    use layra_test_backend::{
        PresetEnding, PresetHistory, PresetReply, TestBackend,
    };

    use super::*;

    fn request(text: &str) -> ChatRequest {
        ChatRequest {
            conversation_id: "alice_1".to_owned(),
            parent_id: "root".to_owned(),
            user_message: text.to_owned(),
            temp_knowledge_base: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_history_retries() {
        let backend = TestBackend::default();
        backend.set_history(
            "alice_1",
            PresetHistory::with_turns([HistoryTurn::default()])
                .with_failures(3),
        );
        let client = BackendClient::new(backend);

        let turns = client.fetch_history("alice_1").await.unwrap();
        assert_eq!(turns.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_history_permanent_error() {
        let client = BackendClient::new(TestBackend::default());
        let err = client.fetch_history("alice_1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_message() {
        let backend = TestBackend::default();
        backend.add_reply(
            PresetReply::with_events([StreamEvent::Text {
                message_id: "r1".to_owned(),
                delta: "Hello".to_owned(),
            }])
            .with_ending(PresetEnding::Fail),
        );
        let client = BackendClient::new(backend.clone());

        let mut reply = client.send_message(&request("Hi")).await.unwrap();
        let event = reply.next_event().await.unwrap().unwrap();
        assert_eq!(event.message_id(), Some("r1"));
        let err = reply.next_event().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);

        assert!(client.send_message(&request("Again")).await.is_err());
        assert_eq!(backend.requests().len(), 2);
    }
}
