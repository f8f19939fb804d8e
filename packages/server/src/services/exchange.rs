use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use common::storage::ObjectOrigin;
use common::{ContentKind, TurnEvent};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use super::records::{ChatService, NewGeneration, NewMessage};
use super::storage::{self, Artifact};
use crate::entity::{chat, message};
use crate::error::AppError;
use crate::inference::ChatMessage;
use crate::models::chat::ChatResponse;
use crate::models::generation::GenerationResponse;
use crate::models::message::{MessageResponse, ROLE_ASSISTANT, ROLE_USER};
use crate::state::AppState;
use crate::utils::title::{clean_title, fallback_title, needs_title};

const TITLE_SOURCE_MESSAGES: u64 = 6;
const TITLE_MAX_TOKENS: u32 = 50;

/// One in-flight exchange on a chat: persists records, publishes change
/// events and reports progress as [`TurnEvent`]s.
///
/// The exchange keeps running when the receiving side goes away.
pub struct Exchange {
    state: AppState,
    owner_id: Uuid,
    chat: chat::Model,
    events: UnboundedSender<TurnEvent>,
}

impl Exchange {
    pub fn new(
        state: AppState,
        owner_id: Uuid,
        chat: chat::Model,
        events: UnboundedSender<TurnEvent>,
    ) -> Self {
        Self {
            state,
            owner_id,
            chat,
            events,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn chat(&self) -> &chat::Model {
        &self.chat
    }

    fn records(&self) -> ChatService<'_> {
        ChatService::new(&self.state, self.owner_id)
    }

    pub fn send(&self, event: TurnEvent) {
        let _ = self.events.send(event);
    }

    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(chat_id = %self.chat.id, error = %message, "Exchange step failed");
        self.send(TurnEvent::Error { message });
    }

    pub fn finish(self) {
        self.send(TurnEvent::Done);
    }

    async fn persist(&mut self, new: NewMessage) -> Result<message::Model, AppError> {
        let (message, chat) = self.records().insert_message(&self.chat, new).await?;
        self.chat = chat;
        Ok(message)
    }

    /// Persist a user message and report it.
    pub async fn persist_user(
        &mut self,
        content: String,
        kind: ContentKind,
        metadata: serde_json::Value,
    ) -> Result<message::Model, AppError> {
        let message = self
            .persist(NewMessage {
                role: ROLE_USER,
                content,
                kind,
                metadata,
            })
            .await?;
        self.send(TurnEvent::UserMessage {
            message: to_value(MessageResponse::from(message.clone())),
        });
        Ok(message)
    }

    /// Persist an assistant message and report it.
    pub async fn persist_assistant(
        &mut self,
        content: String,
        kind: ContentKind,
        metadata: serde_json::Value,
    ) -> Result<message::Model, AppError> {
        let message = self
            .persist(NewMessage {
                role: ROLE_ASSISTANT,
                content,
                kind,
                metadata,
            })
            .await?;
        self.send(TurnEvent::AssistantMessage {
            message: to_value(MessageResponse::from(message.clone())),
        });
        Ok(message)
    }

    /// Point the chat at `model` if it is not already.
    pub async fn use_model(&mut self, model: &str) -> Result<(), AppError> {
        if self.chat.model.as_deref() != Some(model) {
            self.chat = self
                .records()
                .update_chat(&self.chat, None, Some(Some(model.to_string())))
                .await?;
        }
        Ok(())
    }

    /// Model for this exchange: the requested one, else the chat's, else the default.
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        requested
            .or(self.chat.model.as_deref())
            .unwrap_or(&self.state.config.inference.default_model)
            .to_string()
    }

    /// The last `history_window` text messages, oldest first, skipping `exclude`.
    pub async fn history(&self, exclude: &[Uuid]) -> Result<Vec<ChatMessage>, AppError> {
        let window = self.state.config.inference.history_window;
        let mut rows = message::Entity::find()
            .filter(message::Column::ChatId.eq(self.chat.id))
            .filter(message::Column::Role.is_in([ROLE_USER, ROLE_ASSISTANT]))
            .filter(message::Column::ContentType.eq(ContentKind::Text.as_str()))
            .filter(message::Column::Id.is_not_in(exclude.to_vec()))
            .order_by_desc(message::Column::CreatedAt)
            .order_by_desc(message::Column::Id)
            .limit(Some(window))
            .all(&self.state.db)
            .await?;
        rows.reverse();
        Ok(rows
            .into_iter()
            .map(|m| ChatMessage::text(&m.role, m.content))
            .collect())
    }

    /// Stream a completion, forwarding each fragment as a `delta`, then
    /// persist the full reply. Returns `None` (after reporting) on failure.
    pub async fn stream_reply(
        &mut self,
        model: &str,
        messages: Vec<ChatMessage>,
    ) -> Option<message::Model> {
        let events = self.events.clone();
        let result = self
            .state
            .inference
            .chat_stream(model, &messages, move |text| {
                let _ = events.send(TurnEvent::Delta {
                    text: text.to_string(),
                });
            })
            .await;

        let text = match result {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                self.fail("The model returned an empty response");
                return None;
            }
            Err(e) => {
                self.fail(e.to_string());
                return None;
            }
        };

        match self
            .persist_assistant(text, ContentKind::Text, json!({ "model": model }))
            .await
        {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::error!(error = ?e, "Failed to persist assistant reply");
                self.fail("Failed to save the response");
                None
            }
        }
    }

    /// Acknowledge, generate an image for `prompt`, store it and record it.
    pub async fn generate_image(&mut self, prompt: &str, acknowledgement: String) {
        if let Err(e) = self
            .persist_assistant(acknowledgement, ContentKind::Text, json!({ "prompt": prompt }))
            .await
        {
            tracing::error!(error = ?e, "Failed to persist image acknowledgement");
            self.fail("Failed to save the response");
            return;
        }

        let image = match self.state.inference.generate_image(prompt).await {
            Ok(image) => image,
            Err(e) => {
                self.fail(e.to_string());
                return;
            }
        };

        let bytes = match STANDARD.decode(image.b64_json.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail(format!("Image generation returned invalid data: {e}"));
                return;
            }
        };

        let artifact = storage::store_or_inline(
            self.state.objects.as_ref(),
            ObjectOrigin::Generated,
            &bytes,
            "image/png",
        )
        .await;

        let generation_id = artifact.is_durable().then(Uuid::now_v7);
        let metadata = match &artifact {
            Artifact::Stored(obj) => json!({
                "prompt": prompt,
                "model": image.model,
                "generation_id": generation_id,
                "storage_key": obj.key,
            }),
            Artifact::Inline { .. } => json!({
                "prompt": prompt,
                "model": image.model,
                "upload_failed": true,
            }),
        };

        let message = match self
            .persist_assistant(artifact.url().to_string(), ContentKind::Image, metadata)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = ?e, "Failed to persist image message");
                self.fail("Failed to save the image");
                return;
            }
        };

        let (Some(id), Some(key)) = (generation_id, artifact.storage_key()) else {
            return;
        };
        let mut new = NewGeneration::completed(
            self.chat.id,
            prompt.to_string(),
            artifact.url().to_string(),
            image.model.clone(),
        );
        new.id = id;
        new.width = image.width as i32;
        new.height = image.height as i32;
        new.metadata = json!({
            "storage_key": key,
            "content_hash": artifact.content_hash().to_hex(),
            "message_id": message.id,
            "is_generated": true,
        });

        self.record_generation(new).await;
    }

    /// Write a generation row and report it.
    pub async fn record_generation(&self, new: NewGeneration) {
        match self.records().insert_generation(new).await {
            Ok(generation) => self.send(TurnEvent::Generation {
                generation: to_value(GenerationResponse::from(generation)),
            }),
            Err(e) => {
                tracing::error!(error = ?e, "Failed to record generation");
                self.fail("Failed to record the generation");
            }
        }
    }

    /// Replace a placeholder chat title with a model-suggested one.
    pub async fn refresh_title(&mut self) {
        if let Err(e) = self.try_refresh_title().await {
            tracing::warn!(chat_id = %self.chat.id, error = ?e, "Title refresh failed");
        }
    }

    async fn try_refresh_title(&mut self) -> Result<(), AppError> {
        let count = message::Entity::find()
            .filter(message::Column::ChatId.eq(self.chat.id))
            .count(&self.state.db)
            .await?;
        if !needs_title(&self.chat.title, count) {
            return Ok(());
        }

        let source = message::Entity::find()
            .filter(message::Column::ChatId.eq(self.chat.id))
            .filter(message::Column::ContentType.eq(ContentKind::Text.as_str()))
            .order_by_asc(message::Column::CreatedAt)
            .order_by_asc(message::Column::Id)
            .limit(Some(TITLE_SOURCE_MESSAGES))
            .all(&self.state.db)
            .await?;

        let conversation = source
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = vec![
            ChatMessage::text(
                "system",
                "Generate a concise title of at most 6 words for this conversation. \
                 Reply with the title only.",
            ),
            ChatMessage::text("user", conversation),
        ];

        let inference = &self.state.inference;
        let suggested = match inference
            .complete(&inference.config().title_model, &prompt, Some(TITLE_MAX_TOKENS))
            .await
        {
            Ok(raw) => clean_title(&raw),
            Err(e) => {
                tracing::warn!(error = %e, "Title model failed, using fallback title");
                None
            }
        };
        let title = suggested.unwrap_or_else(|| fallback_title(Utc::now()));

        self.chat = self
            .records()
            .update_chat(&self.chat, Some(title), None)
            .await?;
        self.send(TurnEvent::Title {
            chat: to_value(ChatResponse::from(self.chat.clone())),
        });
        Ok(())
    }
}

fn to_value(record: impl serde::Serialize) -> serde_json::Value {
    serde_json::to_value(record).unwrap_or_default()
}
