use std::sync::Arc;

use layra_model::{
    ChatRequest, HistoryTurn, Message, ROOT_PARENT_ID, StreamEvent,
};

use crate::error::Error;
use crate::history::expand_history;
use crate::receiving::{OutgoingMessage, ReceivingBuffer, ReplyOutcome};
use crate::tree::{
    BranchSelection, ConversationBlock, ConversationTree, build_blocks,
};

/// All mutable state of one conversation.
///
/// The committed history is the source of truth, the tree, the selection
/// and the path are derived from it (plus the receiving buffer while a
/// reply is streaming).
#[derive(Clone, Debug)]
pub struct ChatState {
    conversation_id: String,
    history: Vec<Arc<Message>>,
    receiving: Option<ReceivingBuffer>,
    tree: ConversationTree,
    previous_len: usize,
    selection: BranchSelection,
    // The selection before the pending reply started.
    committed_selection: BranchSelection,
    path: Vec<Arc<ConversationBlock>>,
}

impl ChatState {
    /// Creates an empty state for a conversation.
    pub fn new<S: Into<String>>(conversation_id: S) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            history: Vec::new(),
            receiving: None,
            tree: ConversationTree::default(),
            previous_len: 0,
            selection: BranchSelection::new(),
            committed_selection: BranchSelection::new(),
            path: Vec::new(),
        }
    }

    /// Returns the conversation id.
    #[inline]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Returns the committed messages.
    #[inline]
    pub fn history(&self) -> &[Arc<Message>] {
        &self.history
    }

    /// Returns `true` while a reply is streaming.
    #[inline]
    pub fn is_receiving(&self) -> bool {
        self.receiving.is_some()
    }

    /// Returns the current tree.
    #[inline]
    pub fn tree(&self) -> &ConversationTree {
        &self.tree
    }

    /// Returns the current branch selection.
    #[inline]
    pub fn selection(&self) -> &BranchSelection {
        &self.selection
    }

    /// Returns the thread currently displayed.
    #[inline]
    pub fn path(&self) -> &[Arc<ConversationBlock>] {
        &self.path
    }

    /// Replaces the history with the stored turns and selects the newest
    /// thread.
    ///
    /// A reply being streamed is discarded.
    pub fn load_history(&mut self, turns: &[HistoryTurn]) {
        self.history = expand_history(turns);
        self.receiving = None;
        self.previous_len = 0;
        self.tree = build_blocks(&self.history, &self.tree, 0, false);
        self.selection = self.tree.default_branch_selection();
        self.resolve_path();
        debug!(
            "loaded {} messages into {} blocks",
            self.history.len(),
            self.tree.len()
        );
    }

    /// Starts receiving a reply to `outgoing` and returns the request to
    /// send.
    pub fn begin_reply(
        &mut self,
        outgoing: OutgoingMessage,
    ) -> Result<ChatRequest, Error> {
        if self.is_receiving() {
            return Err(Error::Busy);
        }

        let parent_id = match outgoing.parent_id.as_deref() {
            Some(parent_id) if !parent_id.is_empty() => parent_id.to_owned(),
            _ => self.last_reply_id().to_owned(),
        };
        let buffer =
            ReceivingBuffer::begin(&self.history, &outgoing, &parent_id);
        self.committed_selection = self.selection.clone();
        self.rebuild_streaming(buffer.messages());
        self.receiving = Some(buffer);

        Ok(ChatRequest {
            conversation_id: self.conversation_id.clone(),
            parent_id,
            user_message: outgoing.text,
            temp_knowledge_base: outgoing.temp_knowledge_base,
        })
    }

    fn last_reply_id(&self) -> &str {
        self.path
            .iter()
            .rev()
            .find_map(|block| block.reply_id())
            .unwrap_or(ROOT_PARENT_ID)
    }

    /// Applies a stream event to the reply being received.
    ///
    /// Does nothing if no reply is streaming.
    pub fn apply_event(&mut self, event: StreamEvent) {
        let Some(mut buffer) = self.receiving.take() else {
            warn!("dropped an event without a pending reply: {event:?}");
            return;
        };
        buffer.apply(event);
        self.rebuild_streaming(buffer.messages());
        self.receiving = Some(buffer);
    }

    fn rebuild_streaming(&mut self, raw: &[Arc<Message>]) {
        self.tree = build_blocks(raw, &self.tree, self.previous_len, true);
        if raw.len() != self.previous_len {
            self.selection = self.tree.default_branch_selection();
        }
        self.previous_len = raw.len();
        self.resolve_path();
    }

    /// Ends the reply being received and commits it to the history.
    ///
    /// Returns `false` if no reply is streaming.
    pub fn finish_reply(&mut self, outcome: ReplyOutcome) -> bool {
        let Some(buffer) = self.receiving.take() else {
            return false;
        };
        debug!("reply finished: {outcome:?}");
        self.history.extend(buffer.finish(outcome));
        self.previous_len = 0;
        self.tree = build_blocks(&self.history, &self.tree, 0, false);
        self.resolve_path();
        true
    }

    /// Drops the reply being received without committing anything, and
    /// restores the thread shown before it started.
    ///
    /// Returns `false` if no reply is streaming.
    pub fn discard_reply(&mut self) -> bool {
        if self.receiving.take().is_none() {
            return false;
        }
        debug!("reply discarded");
        self.previous_len = 0;
        self.tree = build_blocks(&self.history, &self.tree, 0, false);
        self.selection = std::mem::take(&mut self.committed_selection);
        self.resolve_path();
        true
    }

    /// Selects the sibling at `index` (clamped into range) among the
    /// blocks answering `parent_id`.
    ///
    /// Returns `false` if there is no such fork.
    pub fn select_branch(&mut self, parent_id: &str, index: usize) -> bool {
        let count = self.tree.sibling_count(parent_id);
        if count == 0 {
            return false;
        }
        self.selection.select(parent_id, index.min(count - 1));
        self.resolve_path();
        true
    }

    /// Moves the selection of the fork at `parent_id` by `delta`
    /// siblings, stopping at either end.
    ///
    /// Returns `false` if the selection didn't change.
    pub fn step_branch(&mut self, parent_id: &str, delta: isize) -> bool {
        let count = self.tree.sibling_count(parent_id);
        if !self.selection.step(parent_id, delta, count) {
            return false;
        }
        self.resolve_path();
        true
    }

    #[inline]
    fn resolve_path(&mut self) {
        self.path = self.tree.resolve_path(&self.selection);
    }
}

#[cfg(test)]
mod tests {
    use layra_model::TokenUsage;

    use super::*;

    fn turn(id: &str, parent: &str, text: &str) -> HistoryTurn {
        HistoryTurn {
            message_id: id.to_owned(),
            parent_message_id: parent.to_owned(),
            user_text: text.to_owned(),
            ai_text: format!("re: {text}"),
            ..Default::default()
        }
    }

    fn text(id: &str, delta: &str) -> StreamEvent {
        StreamEvent::Text {
            message_id: id.to_owned(),
            delta: delta.to_owned(),
        }
    }

    fn path_texts(state: &ChatState) -> Vec<String> {
        state
            .path()
            .iter()
            .filter_map(|block| block.user_message.as_ref())
            .map(|msg| msg.content.clone())
            .collect()
    }

    fn loaded() -> ChatState {
        let mut state = ChatState::new("alice_1");
        state.load_history(&[
            turn("m1", "", "Hi"),
            turn("m2", "m1", "First"),
            turn("m3", "m1", "Second"),
        ]);
        state
    }

    #[test]
    fn test_load_history_selects_newest() {
        let state = loaded();
        assert_eq!(state.tree().len(), 3);
        assert_eq!(path_texts(&state), ["Hi", "Second"]);
        assert_eq!(state.selection().get("m1"), Some(1));
    }

    #[test]
    fn test_begin_reply_answers_last_reply() {
        let mut state = loaded();
        let req = state.begin_reply(OutgoingMessage::new("Third")).unwrap();
        assert_eq!(req.conversation_id, "alice_1");
        assert_eq!(req.parent_id, "m3");
        assert_eq!(req.user_message, "Third");

        assert!(state.is_receiving());
        assert_eq!(path_texts(&state), ["Hi", "Second", "Third"]);
        assert!(matches!(
            state.begin_reply(OutgoingMessage::new("Again")),
            Err(Error::Busy)
        ));
    }

    #[test]
    fn test_begin_reply_empty_conversation() {
        let mut state = ChatState::new("alice_2");
        let req = state.begin_reply(OutgoingMessage::new("Hi")).unwrap();
        assert_eq!(req.parent_id, ROOT_PARENT_ID);
        assert_eq!(state.path().len(), 1);
        assert!(!state.path()[0].is_awaiting_reply());
    }

    #[test]
    fn test_streaming_reuses_earlier_blocks() {
        let mut state = loaded();
        state.begin_reply(OutgoingMessage::new("Third")).unwrap();
        let before = state.tree().blocks().to_vec();

        state.apply_event(text("m4", "Hello"));
        state.apply_event(text("m4", ", there"));
        let after = state.tree().blocks();
        assert_eq!(after.len(), before.len());
        for (old, new) in before.iter().zip(after).take(before.len() - 1) {
            assert!(Arc::ptr_eq(old, new));
        }

        let last = state.path().last().unwrap();
        assert_eq!(last.reply_id(), Some("m4"));
        assert_eq!(last.ai_messages[0].content, "Hello, there");
    }

    #[test]
    fn test_finish_reply_commits() {
        let mut state = loaded();
        state.begin_reply(OutgoingMessage::new("Third")).unwrap();
        state.apply_event(text("m4", "Done"));
        state.apply_event(StreamEvent::Usage(TokenUsage {
            total_tokens: 5,
            completion_tokens: 2,
            prompt_tokens: 3,
        }));
        assert!(state.finish_reply(ReplyOutcome::Completed));
        assert!(!state.finish_reply(ReplyOutcome::Completed));

        assert!(!state.is_receiving());
        assert_eq!(state.history().len(), 8);
        assert_eq!(path_texts(&state), ["Hi", "Second", "Third"]);
        let reply = &state.path()[2].ai_messages[0];
        assert_eq!(reply.message_id(), Some("m4"));
        assert_eq!(reply.usage.map(|u| u.total_tokens), Some(5));

        let req = state.begin_reply(OutgoingMessage::new("Next")).unwrap();
        assert_eq!(req.parent_id, "m4");
    }

    #[test]
    fn test_regenerate_adds_sibling() {
        let mut state = loaded();
        state
            .begin_reply(OutgoingMessage::new("Third").with_parent("m1"))
            .unwrap();
        state.apply_event(text("m4", "Another take"));
        state.finish_reply(ReplyOutcome::Completed);

        assert_eq!(state.tree().sibling_count("m1"), 3);
        assert_eq!(path_texts(&state), ["Hi", "Third"]);
        assert_eq!(state.path()[1].branch_index, 2);
    }

    #[test]
    fn test_branch_navigation() {
        let mut state = loaded();
        assert!(state.step_branch("m1", -1));
        assert_eq!(path_texts(&state), ["Hi", "First"]);
        assert!(!state.step_branch("m1", -1));
        assert!(state.step_branch("m1", 5));
        assert_eq!(path_texts(&state), ["Hi", "Second"]);

        assert!(state.select_branch("m1", 9));
        assert_eq!(state.selection().get("m1"), Some(1));
        assert!(state.select_branch("m1", 0));
        assert_eq!(path_texts(&state), ["Hi", "First"]);

        assert!(!state.select_branch("nope", 0));
        assert!(!state.step_branch("nope", 1));
    }

    #[test]
    fn test_selection_kept_after_finish() {
        let mut state = loaded();
        state.select_branch("m1", 0);
        state.begin_reply(OutgoingMessage::new("Deeper")).unwrap();
        assert_eq!(path_texts(&state), ["Hi", "First", "Deeper"]);

        state.apply_event(text("m5", "Sure"));
        state.finish_reply(ReplyOutcome::Aborted);
        assert_eq!(path_texts(&state), ["Hi", "First", "Deeper"]);
        let reply = &state.path()[2].ai_messages[0];
        assert!(reply.content.ends_with("Abort By User"));
    }

    #[test]
    fn test_discard_reply() {
        let mut state = loaded();
        state.select_branch("m1", 0);
        state.begin_reply(OutgoingMessage::new("Lost")).unwrap();
        state.apply_event(text("m5", "Half"));
        assert_eq!(path_texts(&state), ["Hi", "First", "Lost"]);

        assert!(state.discard_reply());
        assert!(!state.discard_reply());
        assert!(!state.is_receiving());
        assert_eq!(state.history().len(), 6);
        assert_eq!(state.tree().len(), 3);
        assert_eq!(path_texts(&state), ["Hi", "First"]);
    }

    #[test]
    fn test_event_without_reply_is_ignored() {
        let mut state = loaded();
        let path = state.path().to_vec();
        state.apply_event(text("m9", "stray"));
        assert_eq!(state.path(), path.as_slice());
    }
}
