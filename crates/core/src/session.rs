mod builder;
#[cfg(test)]
mod tests;

use std::pin::pin;
use std::sync::Arc;

use layra_model::StreamEvent;

use crate::backend_client::BackendClient;
use crate::chat::ChatState;
use crate::error::Error;
use crate::receiving::{OutgoingMessage, ReplyOutcome};
use crate::tree::ConversationBlock;
pub use builder::SessionBuilder;

type EventCallback = Box<dyn Fn(&StreamEvent) + Send + Sync>;
type PathCallback = Box<dyn Fn(&[Arc<ConversationBlock>]) + Send + Sync>;

/// A chat session, which connects a conversation to a backend.
///
/// The session owns the [`ChatState`] of the conversation. Replies are
/// streamed into it as they arrive, and the path change callback is
/// invoked every time the displayed thread may have changed.
pub struct Session {
    client: BackendClient,
    state: ChatState,
    on_event: Option<EventCallback>,
    on_path_changed: Option<PathCallback>,
}

impl Session {
    fn from_builder(builder: SessionBuilder) -> Self {
        let SessionBuilder {
            client,
            conversation_id,
            on_event,
            on_path_changed,
        } = builder;

        Self {
            client,
            state: ChatState::new(conversation_id),
            on_event,
            on_path_changed,
        }
    }

    /// Returns the state of the conversation.
    #[inline]
    pub fn state(&self) -> &ChatState {
        &self.state
    }

    /// Returns the thread currently displayed.
    #[inline]
    pub fn path(&self) -> &[Arc<ConversationBlock>] {
        self.state.path()
    }

    /// Fetches the history of the conversation and shows its newest
    /// thread.
    pub async fn load(&mut self) -> Result<(), Error> {
        let turns =
            self.client.fetch_history(self.state.conversation_id()).await?;
        self.state.load_history(&turns);
        self.notify_path_changed();
        Ok(())
    }

    /// Sends a user message and receives the reply.
    ///
    /// The reply is received until the stream ends, fails, or `cancel`
    /// completes. A cancelled reply is kept with an abort marker. On
    /// failure the pending turn is dropped and the history is fetched
    /// again, since the backend may not have stored it.
    pub async fn send_message<F>(
        &mut self,
        outgoing: OutgoingMessage,
        cancel: F,
    ) -> Result<ReplyOutcome, Error>
    where
        F: Future<Output = ()>,
    {
        let req = self.state.begin_reply(outgoing)?;
        self.notify_path_changed();
        let mut cancel = pin!(cancel);

        let sent = tokio::select! {
            _ = &mut cancel => None,
            result = self.client.send_message(&req) => Some(result),
        };
        let mut reply = match sent {
            None => return Ok(self.finish(ReplyOutcome::Aborted)),
            Some(Ok(reply)) => reply,
            Some(Err(err)) => return Err(self.fail(err.into()).await),
        };

        loop {
            let received = tokio::select! {
                _ = &mut cancel => None,
                event = reply.next_event() => Some(event),
            };
            match received {
                None => return Ok(self.finish(ReplyOutcome::Aborted)),
                Some(Ok(Some(event))) => {
                    trace!("got an event: {event:?}");
                    if let Some(on_event) = &self.on_event {
                        on_event(&event);
                    }
                    self.state.apply_event(event);
                    self.notify_path_changed();
                }
                Some(Ok(None)) => {
                    return Ok(self.finish(ReplyOutcome::Completed));
                }
                Some(Err(err)) => return Err(self.fail(err.into()).await),
            }
        }
    }

    fn finish(&mut self, outcome: ReplyOutcome) -> ReplyOutcome {
        if self.state.finish_reply(outcome) {
            self.notify_path_changed();
        }
        outcome
    }

    async fn fail(&mut self, err: Error) -> Error {
        if self.state.discard_reply() {
            self.notify_path_changed();
        }
        if let Err(reload_err) = self.load().await {
            warn!("failed to reload history after an error: {reload_err}");
        }
        err
    }

    /// Selects the sibling at `index` among the blocks answering
    /// `parent_id`.
    pub fn select_branch(&mut self, parent_id: &str, index: usize) -> bool {
        let changed = self.state.select_branch(parent_id, index);
        if changed {
            self.notify_path_changed();
        }
        changed
    }

    /// Shows the next sibling of the fork at `parent_id`.
    #[inline]
    pub fn next_branch(&mut self, parent_id: &str) -> bool {
        self.step_branch(parent_id, 1)
    }

    /// Shows the previous sibling of the fork at `parent_id`.
    #[inline]
    pub fn previous_branch(&mut self, parent_id: &str) -> bool {
        self.step_branch(parent_id, -1)
    }

    fn step_branch(&mut self, parent_id: &str, delta: isize) -> bool {
        let changed = self.state.step_branch(parent_id, delta);
        if changed {
            self.notify_path_changed();
        }
        changed
    }

    #[inline]
    fn notify_path_changed(&self) {
        if let Some(on_path_changed) = &self.on_path_changed {
            on_path_changed(self.state.path());
        }
    }
}
