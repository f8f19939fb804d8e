use common::{ContentKind, intent};
use serde_json::json;
use uuid::Uuid;

use super::exchange::Exchange;
use crate::inference::ChatMessage;
use crate::models::message::ROLE_USER;

/// Acknowledgement persisted when the assistant itself offered an image.
pub const PROPOSAL_ACKNOWLEDGEMENT: &str = "I'll generate that image for you...";

pub fn image_acknowledgement(prompt: &str) -> String {
    format!("I'll generate an image based on: \"{prompt}\"")
}

/// A user message to answer.
pub struct TurnInput {
    pub content: String,
    pub model: Option<String>,
    pub client_ref: Option<Uuid>,
}

/// Run one chat turn to completion, always ending with `done`.
pub async fn run_turn(mut exchange: Exchange, input: TurnInput) {
    run(&mut exchange, input).await;
    exchange.finish();
}

async fn run(exchange: &mut Exchange, input: TurnInput) {
    let model = exchange.resolve_model(input.model.as_deref());
    if input.model.is_some()
        && let Err(e) = exchange.use_model(&model).await
    {
        tracing::error!(error = ?e, "Failed to update chat model");
        exchange.fail("Failed to update the chat");
        return;
    }

    let metadata = match input.client_ref {
        Some(client_ref) => json!({ "client_ref": client_ref }),
        None => json!({}),
    };
    let user_message = match exchange
        .persist_user(input.content.clone(), ContentKind::Text, metadata)
        .await
    {
        Ok(message) => message,
        Err(e) => {
            tracing::error!(error = ?e, "Failed to persist user message");
            exchange.fail("Failed to save your message");
            return;
        }
    };

    if let Some(image) = intent::classify(&input.content) {
        tracing::info!(chat_id = %exchange.chat().id, locale = ?image.locale, "Image request detected");
        exchange
            .generate_image(&image.prompt, image_acknowledgement(&image.prompt))
            .await;
    } else {
        let mut messages = match exchange.history(&[user_message.id]).await {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(error = ?e, "Failed to load history");
                exchange.fail("Failed to load the conversation");
                return;
            }
        };
        messages.push(ChatMessage::text(ROLE_USER, input.content));

        if let Some(reply) = exchange.stream_reply(&model, messages).await
            && intent::proposes_image(&reply.content)
        {
            let prompt = intent::extract_proposed_prompt(&reply.content);
            exchange
                .generate_image(&prompt, PROPOSAL_ACKNOWLEDGEMENT.to_string())
                .await;
        }
    }

    exchange.refresh_title().await;
}
