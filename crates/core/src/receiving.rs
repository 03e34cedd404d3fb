//! The message list of a reply that is being streamed.

use std::sync::Arc;

use layra_model::{
    Attachment, FileCitation, Message, StreamEvent, TokenUsage,
};

/// Content of the reply placeholder shown until the first event arrives.
pub const PENDING_REPLY_TEXT: &str = "Parsing in progress, please wait...";

/// Appended to a reply that was aborted by the user.
pub const ABORT_MARKER: &str = " ⚠️ Abort By User";

/// A user message waiting to be sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// The user text.
    pub text: String,
    /// Files uploaded with the text.
    pub attachments: Vec<Attachment>,
    /// The reply to answer. Defaults to the last reply on the current path.
    pub parent_id: Option<String>,
    /// Temporary knowledge base holding the uploaded files.
    pub temp_knowledge_base: String,
}

impl OutgoingMessage {
    /// Creates an outgoing message with the given text.
    #[inline]
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Attaches uploaded files.
    #[inline]
    pub fn with_attachments(
        mut self,
        attachments: Vec<Attachment>,
        temp_knowledge_base: impl Into<String>,
    ) -> Self {
        self.attachments = attachments;
        self.temp_knowledge_base = temp_knowledge_base.into();
        self
    }

    /// Answers a specific reply instead of the last one on the path.
    #[inline]
    pub fn with_parent<S: Into<String>>(mut self, parent_id: S) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// How a streamed reply ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReplyOutcome {
    /// The stream ended normally.
    Completed,
    /// The user cancelled the stream.
    Aborted,
}

/// The message list while a reply is streaming.
///
/// It holds the committed history, the new user messages and one assistant
/// message for the reply. Events rewrite the reply message in place, so
/// the length of the list stays the same for the whole stream.
#[derive(Clone, Debug)]
pub struct ReceivingBuffer {
    messages: Vec<Arc<Message>>,
    prompt_start: usize,
    parent_id: String,
    text: String,
    thinking: String,
    message_id: String,
    usage: TokenUsage,
    citations: Vec<FileCitation>,
}

impl ReceivingBuffer {
    /// Starts a reply to `outgoing`, answering `parent_id`.
    pub fn begin(
        history: &[Arc<Message>],
        outgoing: &OutgoingMessage,
        parent_id: &str,
    ) -> Self {
        let mut messages = history.to_vec();
        let prompt_start = messages.len();
        messages.extend(
            outgoing
                .attachments
                .iter()
                .map(|file| Arc::new(Message::attachment(file))),
        );
        messages.push(Arc::new(
            Message::user_text(outgoing.text.as_str()).with_parent(parent_id),
        ));
        messages.push(Arc::new(
            Message::ai_text(PENDING_REPLY_TEXT).with_parent(parent_id),
        ));

        Self {
            messages,
            prompt_start,
            parent_id: parent_id.to_owned(),
            text: String::new(),
            thinking: String::new(),
            message_id: String::new(),
            usage: TokenUsage::default(),
            citations: Vec::new(),
        }
    }

    /// Returns the current message list.
    #[inline]
    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    /// Applies a stream event to the reply message.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Thinking { message_id, delta } => {
                self.thinking.push_str(&delta);
                self.set_message_id(message_id);
            }
            StreamEvent::Text { message_id, delta } => {
                self.text.push_str(&delta);
                self.set_message_id(message_id);
            }
            StreamEvent::FilesUsed { message_id, files } => {
                self.citations = files;
                self.set_message_id(message_id);
            }
            StreamEvent::Usage(usage) => {
                self.usage = usage;
            }
        }

        let reply = Arc::new(self.reply_message());
        if let Some(last) = self.messages.last_mut() {
            *last = reply;
        }
    }

    #[inline]
    fn set_message_id(&mut self, message_id: String) {
        if !message_id.is_empty() {
            self.message_id = message_id;
        }
    }

    fn reply_message(&self) -> Message {
        let mut msg = Message::ai_text(self.text.as_str())
            .with_parent(self.parent_id.as_str())
            .with_usage(self.usage);
        if !self.thinking.is_empty() {
            msg = msg.with_thinking(self.thinking.as_str());
        }
        if !self.message_id.is_empty() {
            msg = msg.with_message_id(self.message_id.as_str());
        }
        msg
    }

    /// Ends the stream and returns the messages to append to the history:
    /// the new user messages, the reply, and its citations.
    ///
    /// An aborted reply keeps its partial content with an abort marker.
    pub fn finish(mut self, outcome: ReplyOutcome) -> Vec<Arc<Message>> {
        if outcome == ReplyOutcome::Aborted {
            if self.text.is_empty() {
                self.thinking.push_str(ABORT_MARKER);
            } else {
                self.text.push_str(ABORT_MARKER);
            }
        }

        let prompt_end = self.messages.len() - 1;
        let mut committed =
            self.messages[self.prompt_start..prompt_end].to_vec();
        committed.push(Arc::new(self.reply_message()));

        let citations = std::mem::take(&mut self.citations);
        committed.extend(citations.into_iter().enumerate().map(
            |(idx, citation)| {
                let mut msg = Message::citation(idx, citation);
                if !self.message_id.is_empty() {
                    msg = msg.with_message_id(self.message_id.as_str());
                }
                Arc::new(msg)
            },
        ));
        committed
    }
}
