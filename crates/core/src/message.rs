use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a participant, mirroring `querymt::chat::ChatRole` — the
/// teacher's provider-facing chat role enum this crate's messages eventually
/// map onto when handed to the inference engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Running,
    Completed,
}

/// A single tool invocation as it appears both in `StreamingState.toolCalls`
/// and in a persisted message's `tool_call` part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub args: Value,
    pub result: Option<String>,
    pub status: ToolCallStatus,
}

impl ToolCallRecord {
    pub fn new(id: String, name: String, args: Value) -> Self {
        ToolCallRecord {
            id,
            name,
            args,
            result: None,
            status: ToolCallStatus::Running,
        }
    }
}

/// Ordered interleaving of stream events, as persisted in both
/// `StreamingState.parts` and the final assistant `Message.parts`. A sum
/// type, per §3's note that the source flattens this to parallel fields —
/// we keep the tagged-union representation directly (§9's design note
/// recommends exactly this).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum MessagePart {
    Text { content: String },
    Reasoning { content: String },
    ToolCall {
        id: String,
        name: String,
        args: Value,
        result: Option<String>,
        status: ToolCallStatusOwned,
    },
    SubagentStart { id: String, label: String },
    SubagentEnd { id: String },
}

/// Serde-friendly mirror of `ToolCallStatus` used inside `MessagePart` so
/// the part type doesn't need to borrow from `message.rs`'s other enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatusOwned {
    Running,
    Completed,
}

impl From<ToolCallStatus> for ToolCallStatusOwned {
    fn from(s: ToolCallStatus) -> Self {
        match s {
            ToolCallStatus::Running => ToolCallStatusOwned::Running,
            ToolCallStatus::Completed => ToolCallStatusOwned::Completed,
        }
    }
}

/// An immutable message once written, ordered by `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub session_id: String,
    pub role: ChatRole,
    pub content: String,
    pub parts: Vec<MessagePart>,
    pub created_at: i64,
}

impl AgentMessage {
    pub fn new(session_id: String, role: ChatRole) -> Self {
        AgentMessage {
            id: crate::new_id(),
            session_id,
            role,
            content: String::new(),
            parts: Vec::new(),
            created_at: crate::now_unix(),
        }
    }

    pub fn user_text(session_id: String, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut msg = AgentMessage::new(session_id, ChatRole::User);
        msg.content = text.clone();
        msg.parts.push(MessagePart::Text { content: text });
        msg
    }

    /// Flatten the ordered parts into a single preview string, used for
    /// `Session.last_message` (truncated to 200 chars by the caller).
    pub fn text_preview(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}
