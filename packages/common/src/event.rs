use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted collection a change event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Users,
    Chats,
    Message,
    Generations,
}

impl Resource {
    pub const ALL: [Resource; 4] = [Self::Users, Self::Chats, Self::Message, Self::Generations];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Chats => "chats",
            Self::Message => "message",
            Self::Generations => "generations",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("Unknown resource '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Patched,
    Removed,
}

/// A create/patch/remove notification delivered to the owner's listeners.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ChangeEvent {
    pub resource: Resource,
    pub kind: ChangeKind,
    /// User the record belongs to; only this user's listeners receive the event.
    pub owner_id: Uuid,
    /// Parent chat for `message` and `generations` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<Uuid>,
    /// The record as the API returns it (for `removed`, the last known state).
    pub data: serde_json::Value,
}

impl ChangeEvent {
    pub fn new(resource: Resource, kind: ChangeKind, owner_id: Uuid, data: &impl Serialize) -> Self {
        Self {
            resource,
            kind,
            owner_id,
            chat_id: None,
            data: serde_json::to_value(data).unwrap_or_default(),
        }
    }

    pub fn in_chat(mut self, chat_id: Uuid) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    /// Deserialize `data` into a typed record.
    pub fn record<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}
