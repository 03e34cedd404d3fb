use std::sync::Arc;
use std::time::Duration;

use layra_model::{ChatBackend, StreamEvent};

use super::Session;
use crate::backend_client::BackendClient;
use crate::tree::ConversationBlock;

/// [`Session`] builder.
pub struct SessionBuilder {
    pub(crate) client: BackendClient,
    pub(crate) conversation_id: String,
    pub(crate) on_event: Option<super::EventCallback>,
    pub(crate) on_path_changed: Option<super::PathCallback>,
}

impl SessionBuilder {
    /// Creates a new builder with the specified backend and conversation.
    #[inline]
    pub fn with_backend<B: ChatBackend + 'static>(
        backend: B,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self {
            client: BackendClient::new(backend),
            conversation_id: conversation_id.into(),
            on_event: None,
            on_path_changed: None,
        }
    }

    /// Sets how long transient failures are retried when loading the
    /// history.
    #[inline]
    pub fn with_history_retry(mut self, duration: Duration) -> Self {
        self.client = self.client.with_history_retry(duration);
        self
    }

    /// Attaches a callback to be invoked for every received stream event.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(&StreamEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Box::new(on_event));
        self
    }

    /// Attaches a callback to be invoked when the displayed thread may
    /// have changed.
    #[inline]
    pub fn on_path_changed(
        mut self,
        on_path_changed: impl Fn(&[Arc<ConversationBlock>])
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.on_path_changed = Some(Box::new(on_path_changed));
        self
    }

    /// Builds the session.
    #[inline]
    pub fn build(self) -> Session {
        Session::from_builder(self)
    }
}
