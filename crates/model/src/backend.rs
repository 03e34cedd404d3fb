use std::error::Error;

use crate::error::ErrorKind;
use crate::request::{ChatRequest, HistoryTurn};
use crate::response::ReplyStream;

/// The error type for a chat backend.
pub trait BackendError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents the chat backend, which stores conversations
/// and produces assistant replies.
///
/// Once the backend is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the backend should be prepared for being dropped anytime.
pub trait ChatBackend: Send + Sync {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// The reply stream type for this backend.
    type Reply: ReplyStream<Error = Self::Error>;

    /// Fetches the completed turns of a conversation, in the order they
    /// were created.
    fn fetch_history(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Vec<HistoryTurn>, Self::Error>> + Send + 'static;

    /// Sends a user message and starts streaming the reply.
    fn send_message(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Reply, Self::Error>> + Send + 'static;
}
