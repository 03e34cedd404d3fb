use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};

use crate::backend::BackendError;
use crate::{FileCitation, TokenUsage};

/// A streamed assistant reply.
pub trait ReplyStream: Sized + Send + 'static {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// Attempts to pull out the next event from the reply.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct reply state:
    ///
    /// - `Poll::Pending` means that this reply is still waiting for the
    ///   next event. Implementations will ensure that the current task
    ///   will be notified when the next event may be ready.
    /// - `Poll::Ready(Ok(Some(event)))` means the reply has an event to
    ///   deliver, and may produce further events on subsequent
    ///   `poll_next_event` calls.
    /// - `Poll::Ready(Ok(None))` means the reply has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while
    ///   receiving the reply.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<StreamEvent>, Self::Error>>;
}

/// An incremental update of a streamed reply.
///
/// Every content event carries the backend id of the reply, which stays
/// the same for the whole stream once assigned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Received a reasoning delta.
    Thinking {
        /// Id of the reply.
        message_id: String,
        /// Text to append.
        delta: String,
    },
    /// Received an answer delta.
    Text {
        /// Id of the reply.
        message_id: String,
        /// Text to append.
        delta: String,
    },
    /// Received the knowledge base files used by the reply.
    FilesUsed {
        /// Id of the reply.
        message_id: String,
        /// The complete citation batch.
        files: Vec<FileCitation>,
    },
    /// Received the final token usage.
    Usage(TokenUsage),
}

impl StreamEvent {
    /// Returns the reply id carried by this event, if any.
    #[inline]
    pub fn message_id(&self) -> Option<&str> {
        match self {
            StreamEvent::Thinking { message_id, .. }
            | StreamEvent::Text { message_id, .. }
            | StreamEvent::FilesUsed { message_id, .. } => Some(message_id),
            StreamEvent::Usage(_) => None,
        }
    }
}
