use serde::{Deserialize, Serialize};

/// The parent id of a message that starts a new thread.
pub const ROOT_PARENT_ID: &str = "root";

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// The side of the conversation a message comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The human user.
    User,
    /// The assistant.
    Ai,
}

/// The kind of content a message carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// An uploaded image.
    Image,
    /// An uploaded non-image file.
    File,
    /// A reasoning trace of the assistant.
    Thinking,
    /// A knowledge base file cited by the assistant.
    BaseFile,
}

/// Token usage reported by the backend for one reply.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct TokenUsage {
    /// Total tokens consumed.
    pub total_tokens: u64,
    /// Tokens of the generated reply.
    pub completion_tokens: u64,
    /// Tokens of the prompt.
    pub prompt_tokens: u64,
}

/// A knowledge base file that was retrieved to produce a reply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileCitation {
    /// Name of the cited file.
    pub file_name: String,
    /// The knowledge base the file belongs to.
    pub knowledge_base_id: String,
    /// Download URL of the file.
    pub file_url: String,
    /// URL of the page image that was matched.
    pub image_url: String,
    /// Retrieval score.
    pub score: f64,
}

/// A file uploaded by the user along with a message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attachment {
    /// Original file name.
    pub file_name: String,
    /// Object storage URL of the file.
    pub url: String,
}

impl Attachment {
    /// Creates a new `Attachment`.
    #[inline]
    pub fn new<N: Into<String>, U: Into<String>>(file_name: N, url: U) -> Self {
        Self {
            file_name: file_name.into(),
            url: url.into(),
        }
    }

    /// Returns the lowercased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Returns `true` if the file is displayed as an image.
    #[inline]
    pub fn is_image(&self) -> bool {
        self.extension()
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }
}

/// An atomic fragment of a conversation turn.
///
/// Within a flat message list, a user text message is followed by the
/// assistant messages of the same turn. Attachments of a turn are placed
/// before its text message. The position in the list is the only ordering
/// signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The kind of content.
    pub kind: MessageKind,
    /// Who sent the message.
    pub from: Sender,
    /// Text content, or an opaque reference for non-text kinds.
    pub content: String,
    /// Reasoning trace attached to an assistant answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Backend id of the assistant reply, unset while streaming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Id of the reply this user message answers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    /// Token usage of an assistant reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// File name of an attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Object storage URL of an attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Citation metadata of a `BaseFile` message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<FileCitation>,
}

impl Message {
    #[inline]
    fn new(kind: MessageKind, from: Sender, content: String) -> Self {
        Self {
            kind,
            from,
            content,
            thinking: None,
            message_id: None,
            parent_message_id: None,
            usage: None,
            file_name: None,
            url: None,
            citation: None,
        }
    }

    /// Creates a user text message.
    #[inline]
    pub fn user_text<S: Into<String>>(content: S) -> Self {
        Self::new(MessageKind::Text, Sender::User, content.into())
    }

    /// Creates an assistant text message.
    #[inline]
    pub fn ai_text<S: Into<String>>(content: S) -> Self {
        Self::new(MessageKind::Text, Sender::Ai, content.into())
    }

    /// Creates a user message for an uploaded file.
    ///
    /// Images get the `Image` kind, everything else is a `File`.
    pub fn attachment(attachment: &Attachment) -> Self {
        let kind = if attachment.is_image() {
            MessageKind::Image
        } else {
            MessageKind::File
        };
        let mut msg =
            Self::new(kind, Sender::User, attachment.file_name.clone());
        msg.file_name = Some(attachment.file_name.clone());
        msg.url = Some(attachment.url.clone());
        msg
    }

    /// Creates an assistant message that cites a knowledge base file.
    ///
    /// `index` is the position of the citation in its batch.
    pub fn citation(index: usize, citation: FileCitation) -> Self {
        let mut msg = Self::new(
            MessageKind::BaseFile,
            Sender::Ai,
            format!("image_{index}"),
        );
        msg.file_name = Some(citation.file_name.clone());
        msg.url = Some(citation.file_url.clone());
        msg.citation = Some(citation);
        msg
    }

    /// Sets the message id.
    #[inline]
    pub fn with_message_id<S: Into<String>>(mut self, id: S) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Sets the parent message id.
    #[inline]
    pub fn with_parent<S: Into<String>>(mut self, parent: S) -> Self {
        self.parent_message_id = Some(parent.into());
        self
    }

    /// Sets the reasoning trace.
    #[inline]
    pub fn with_thinking<S: Into<String>>(mut self, thinking: S) -> Self {
        self.thinking = Some(thinking.into());
        self
    }

    /// Sets the token usage.
    #[inline]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Returns `true` if the message is from the user.
    #[inline]
    pub fn is_user(&self) -> bool {
        self.from == Sender::User
    }

    /// Returns the message id, treating an empty id as absent.
    #[inline]
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Returns the parent id, defaulting to [`ROOT_PARENT_ID`].
    #[inline]
    pub fn parent_id(&self) -> &str {
        self.parent_message_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(ROOT_PARENT_ID)
    }
}
