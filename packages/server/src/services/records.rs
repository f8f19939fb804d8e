use chrono::Utc;
use common::{ChangeKind, ContentKind, Resource};
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use uuid::Uuid;

use crate::entity::{chat, generation, message};
use crate::error::AppError;
use crate::models::chat::ChatResponse;
use crate::models::generation::{
    DEFAULT_HEIGHT, DEFAULT_WIDTH, GenerationResponse, STATUS_COMPLETED,
};
use crate::models::message::MessageResponse;
use crate::state::AppState;

/// Fields of a message about to be written.
pub struct NewMessage {
    pub role: &'static str,
    pub content: String,
    pub kind: ContentKind,
    pub metadata: serde_json::Value,
}

/// Fields of a generation row about to be written.
pub struct NewGeneration {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub prompt: String,
    pub url: String,
    pub model: String,
    pub width: i32,
    pub height: i32,
    pub status: String,
    pub metadata: serde_json::Value,
}

impl NewGeneration {
    /// A completed generation at the default 1024x768 size.
    pub fn completed(chat_id: Uuid, prompt: String, url: String, model: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            chat_id,
            prompt,
            url,
            model,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            status: STATUS_COMPLETED.into(),
            metadata: serde_json::json!({}),
        }
    }
}

/// Writes chat, message and generation rows for one user and publishes the
/// matching change events.
pub struct ChatService<'a> {
    state: &'a AppState,
    owner_id: Uuid,
}

impl<'a> ChatService<'a> {
    pub fn new(state: &'a AppState, owner_id: Uuid) -> Self {
        Self { state, owner_id }
    }

    /// Insert a message and bump the chat's `updated_at` in one transaction.
    pub async fn insert_message(
        &self,
        chat: &chat::Model,
        new: NewMessage,
    ) -> Result<(message::Model, chat::Model), AppError> {
        let now = Utc::now();
        let txn = self.state.db.begin().await?;

        let message = message::ActiveModel {
            id: Set(Uuid::now_v7()),
            chat_id: Set(chat.id),
            role: Set(new.role.to_string()),
            content: Set(new.content),
            content_type: Set(new.kind.as_str().to_string()),
            metadata: Set(new.metadata),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut active: chat::ActiveModel = chat.clone().into();
        active.updated_at = Set(now);
        let chat = active.update(&txn).await?;

        txn.commit().await?;

        self.publish_message(ChangeKind::Created, &message);
        self.publish_chat(ChangeKind::Patched, &chat);
        Ok((message, chat))
    }

    /// Update title and/or model, bumping `updated_at`.
    pub async fn update_chat(
        &self,
        chat: &chat::Model,
        title: Option<String>,
        model: Option<Option<String>>,
    ) -> Result<chat::Model, AppError> {
        let mut active: chat::ActiveModel = chat.clone().into();
        if let Some(title) = title {
            active.title = Set(title);
        }
        if let Some(model) = model {
            active.model = Set(model);
        }
        active.updated_at = Set(Utc::now());
        let chat = active.update(&self.state.db).await?;
        self.publish_chat(ChangeKind::Patched, &chat);
        Ok(chat)
    }

    pub async fn insert_generation(
        &self,
        new: NewGeneration,
    ) -> Result<generation::Model, AppError> {
        let generation = generation::ActiveModel {
            id: Set(new.id),
            user_id: Set(self.owner_id),
            chat_id: Set(new.chat_id),
            prompt: Set(new.prompt),
            url: Set(new.url),
            model: Set(new.model),
            width: Set(new.width),
            height: Set(new.height),
            status: Set(new.status),
            metadata: Set(new.metadata),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.state.db)
        .await?;

        self.publish_generation(ChangeKind::Created, &generation);
        Ok(generation)
    }

    pub fn publish_chat(&self, kind: ChangeKind, chat: &chat::Model) {
        self.state.events.emit(
            Resource::Chats,
            kind,
            self.owner_id,
            Some(chat.id),
            &ChatResponse::from(chat.clone()),
        );
    }

    pub fn publish_message(&self, kind: ChangeKind, message: &message::Model) {
        self.state.events.emit(
            Resource::Message,
            kind,
            self.owner_id,
            Some(message.chat_id),
            &MessageResponse::from(message.clone()),
        );
    }

    pub fn publish_generation(&self, kind: ChangeKind, generation: &generation::Model) {
        self.state.events.emit(
            Resource::Generations,
            kind,
            self.owner_id,
            Some(generation.chat_id),
            &GenerationResponse::from(generation.clone()),
        );
    }
}
