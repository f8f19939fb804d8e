use serde::{Deserialize, Serialize};

/// Progress of one chat exchange, streamed to the caller as SSE frames.
///
/// The frame's `event:` line carries [`TurnEvent::name`]; `data:` carries the
/// whole value, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A user-authored message was persisted.
    UserMessage { message: serde_json::Value },
    /// A streamed completion fragment.
    Delta { text: String },
    /// An assistant message was persisted.
    AssistantMessage { message: serde_json::Value },
    /// A generation record was written.
    Generation { generation: serde_json::Value },
    /// The requested model cannot read files; the turn uses `to` instead.
    ModelSwitched {
        from: String,
        to: String,
        notice: String,
    },
    /// The chat was retitled.
    Title { chat: serde_json::Value },
    Error { message: String },
    Done,
}

impl TurnEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user_message",
            Self::Delta { .. } => "delta",
            Self::AssistantMessage { .. } => "assistant_message",
            Self::Generation { .. } => "generation",
            Self::ModelSwitched { .. } => "model_switched",
            Self::Title { .. } => "title",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }
}
