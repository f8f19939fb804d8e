use common::storage::ObjectOrigin;
use common::{ContentKind, TurnEvent};
use serde_json::json;
use uuid::Uuid;

use super::exchange::Exchange;
use super::records::NewGeneration;
use super::storage;
use crate::config::InferenceConfig;
use crate::inference::ChatMessage;
use crate::utils::multipart::FilePart;

/// A file to analyse, with the optional question about it.
pub struct AttachmentInput {
    pub file: FilePart,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub client_ref: Option<Uuid>,
}

/// A model switch forced by a model that cannot read files.
#[derive(Debug, PartialEq)]
pub struct VisionSwitch {
    pub to: String,
    pub notice: String,
}

/// Pick a vision-capable model for `requested`, if it is not one already.
pub fn vision_switch(config: &InferenceConfig, requested: &str) -> Option<VisionSwitch> {
    if config.supports_vision(requested) {
        return None;
    }
    config.vision_model().map(|fallback| VisionSwitch {
        to: fallback.id.clone(),
        notice: format!("Switched to {} to process files", fallback.name),
    })
}

/// Store a file, record it in the chat and stream a vision model's analysis.
pub async fn run_attachment(mut exchange: Exchange, input: AttachmentInput) {
    run(&mut exchange, input).await;
    exchange.finish();
}

async fn run(exchange: &mut Exchange, input: AttachmentInput) {
    let AttachmentInput {
        file,
        prompt,
        model,
        client_ref,
    } = input;
    let kind = ContentKind::classify(&file.mime, &file.file_name);

    let mut model = exchange.resolve_model(model.as_deref());
    if let Some(switch) = vision_switch(&exchange.state().config.inference, &model) {
        tracing::info!(from = %model, to = %switch.to, "Switching to a vision model");
        exchange.send(TurnEvent::ModelSwitched {
            from: model.clone(),
            to: switch.to.clone(),
            notice: switch.notice,
        });
        model = switch.to;
    }
    if let Err(e) = exchange.use_model(&model).await {
        tracing::error!(error = ?e, "Failed to update chat model");
        exchange.fail("Failed to update the chat");
        return;
    }

    let artifact = storage::store_or_inline(
        exchange.state().objects.as_ref(),
        ObjectOrigin::Uploaded,
        &file.data,
        &file.mime,
    )
    .await;

    let mut metadata = json!({
        "file_name": file.file_name,
        "file_type": file.mime,
        "file_url": artifact.url(),
        "storage_key": artifact.storage_key(),
        "size": file.size(),
    });
    if let Some(obj) = metadata.as_object_mut() {
        if let Some(client_ref) = client_ref {
            obj.insert("client_ref".into(), json!(client_ref));
        }
        if !artifact.is_durable() {
            obj.insert("upload_failed".into(), json!(true));
        }
    }

    let file_message = match exchange
        .persist_user(file.file_name.clone(), kind, metadata)
        .await
    {
        Ok(message) => message,
        Err(e) => {
            tracing::error!(error = ?e, "Failed to persist file message");
            exchange.fail("Failed to save the file");
            return;
        }
    };

    let prompt = prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| kind.default_prompt().to_string());

    if kind == ContentKind::Image
        && let Some(key) = artifact.storage_key()
    {
        let mut new = NewGeneration::completed(
            exchange.chat().id,
            prompt.clone(),
            artifact.url().to_string(),
            "upload".into(),
        );
        new.metadata = json!({
            "file_type": file.mime,
            "file_name": file.file_name,
            "is_generated": false,
            "storage_key": key,
            "content_hash": artifact.content_hash().to_hex(),
            "message_id": file_message.id,
        });
        exchange.record_generation(new).await;
    }

    let prompt_message = match exchange
        .persist_user(prompt.clone(), ContentKind::Text, json!({}))
        .await
    {
        Ok(message) => message,
        Err(e) => {
            tracing::error!(error = ?e, "Failed to persist prompt message");
            exchange.fail("Failed to save your message");
            return;
        }
    };

    let mut messages = match exchange
        .history(&[file_message.id, prompt_message.id])
        .await
    {
        Ok(history) => history,
        Err(e) => {
            tracing::error!(error = ?e, "Failed to load history");
            exchange.fail("Failed to load the conversation");
            return;
        }
    };
    messages.push(ChatMessage::vision(&prompt, artifact.url()));

    exchange.stream_reply(&model, messages).await;
}
