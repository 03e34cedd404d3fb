use serde::{Deserialize, Serialize};

use crate::{Attachment, FileCitation, TokenUsage};

/// A request that asks the backend to reply to a new user message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The conversation to append to.
    pub conversation_id: String,
    /// Id of the reply being answered, or [`crate::ROOT_PARENT_ID`].
    pub parent_id: String,
    /// The user text.
    pub user_message: String,
    /// Temporary knowledge base holding the uploaded files, may be empty.
    pub temp_knowledge_base: String,
}

/// One completed turn of a conversation, as stored by the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    /// Id of the assistant reply of this turn.
    pub message_id: String,
    /// Id of the reply this turn answers to, empty for a new thread.
    pub parent_message_id: String,
    /// The user text.
    pub user_text: String,
    /// Files uploaded with the user text.
    pub user_files: Vec<Attachment>,
    /// The assistant answer.
    pub ai_text: String,
    /// Knowledge base files cited by the answer.
    pub files_used: Vec<FileCitation>,
    /// Token usage of the answer.
    pub usage: TokenUsage,
}
