use layra_model::{
    Attachment, ChatRequest, FileCitation, HistoryTurn, ROOT_PARENT_ID,
    StreamEvent, TokenUsage,
};
use serde::{Deserialize, Serialize};

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FileUsed {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub knowledge_db_id: String,
    #[serde(default)]
    pub file_url: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub score: f64,
}

/// Payload of one server-sent event of a reply.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamPayload {
    Thinking {
        data: String,
        #[serde(default)]
        message_id: String,
    },
    Text {
        data: String,
        #[serde(default)]
        message_id: String,
    },
    FileUsed {
        data: Vec<FileUsed>,
        #[serde(default)]
        message_id: String,
    },
    Token {
        #[serde(default)]
        total_token: u64,
        #[serde(default)]
        completion_tokens: u64,
        #[serde(default)]
        prompt_tokens: u64,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ConversationContent {
    #[serde(default)]
    pub turns: Vec<Turn>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Turn {
    pub message_id: String,
    #[serde(default)]
    pub parent_message_id: Option<String>,
    pub user_message: UserMessage,
    #[serde(default)]
    pub user_file: Vec<UserFile>,
    pub ai_message: AiMessage,
    #[serde(default)]
    pub file_used: Vec<FileUsed>,
    #[serde(default)]
    pub total_token: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub prompt_tokens: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserMessage {
    #[serde(default)]
    pub content: Vec<Content>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Content {
    pub r#type: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserFile {
    pub filename: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AiMessage {
    #[serde(default)]
    pub content: String,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SseChatRequest {
    conversation_id: String,
    parent_id: String,
    user_message: String,
    temp_db: String,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(req: &ChatRequest) -> SseChatRequest {
    // The server expects an empty parent id for a new thread.
    let parent_id = if req.parent_id == ROOT_PARENT_ID {
        String::new()
    } else {
        req.parent_id.clone()
    };
    SseChatRequest {
        conversation_id: req.conversation_id.clone(),
        parent_id,
        user_message: req.user_message.clone(),
        temp_db: req.temp_knowledge_base.clone(),
    }
}

#[inline]
fn create_citation(file: FileUsed) -> FileCitation {
    FileCitation {
        file_name: file.file_name,
        knowledge_base_id: file.knowledge_db_id,
        file_url: file.file_url,
        image_url: file.image_url,
        score: file.score,
    }
}

/// Converts a payload into an event, `None` for unknown payloads.
pub fn create_event(payload: StreamPayload) -> Option<StreamEvent> {
    let event = match payload {
        StreamPayload::Thinking { data, message_id } => StreamEvent::Thinking {
            message_id,
            delta: data,
        },
        StreamPayload::Text { data, message_id } => StreamEvent::Text {
            message_id,
            delta: data,
        },
        StreamPayload::FileUsed { data, message_id } => {
            StreamEvent::FilesUsed {
                message_id,
                files: data.into_iter().map(create_citation).collect(),
            }
        }
        StreamPayload::Token {
            total_token,
            completion_tokens,
            prompt_tokens,
        } => StreamEvent::Usage(TokenUsage {
            total_tokens: total_token,
            completion_tokens,
            prompt_tokens,
        }),
        StreamPayload::Unknown => return None,
    };
    Some(event)
}

pub fn create_history(content: ConversationContent) -> Vec<HistoryTurn> {
    content.turns.into_iter().map(create_turn).collect()
}

fn create_turn(turn: Turn) -> HistoryTurn {
    let user_text = turn
        .user_message
        .content
        .into_iter()
        .find(|content| content.r#type == "text")
        .and_then(|content| content.text)
        .unwrap_or_default();
    HistoryTurn {
        message_id: turn.message_id,
        parent_message_id: turn.parent_message_id.unwrap_or_default(),
        user_text,
        user_files: turn
            .user_file
            .into_iter()
            .map(|file| Attachment::new(file.filename, file.url))
            .collect(),
        ai_text: turn.ai_message.content,
        files_used: turn.file_used.into_iter().map(create_citation).collect(),
        usage: TokenUsage {
            total_tokens: turn.total_token,
            completion_tokens: turn.completion_tokens,
            prompt_tokens: turn.prompt_tokens,
        },
    }
}
