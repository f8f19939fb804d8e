use sea_orm::{ConnectionTrait, EntityTrait};
use uuid::Uuid;

use crate::entity::{chat, generation, message};
use crate::error::AppError;

/// Look up a chat by ID, returning 404 if not found.
pub async fn find_chat<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<chat::Model, AppError> {
    chat::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Chat not found".into()))
}

/// Look up a chat the caller owns: 404 if missing, 403 if someone else's.
pub async fn find_owned_chat<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    id: Uuid,
) -> Result<chat::Model, AppError> {
    let chat = find_chat(db, id).await?;
    if chat.user_id != user_id {
        return Err(AppError::PermissionDenied);
    }
    Ok(chat)
}

/// Look up a message through its parent chat's ownership.
pub async fn find_owned_message<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    id: Uuid,
) -> Result<(message::Model, chat::Model), AppError> {
    let message = message::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".into()))?;
    let chat = find_chat(db, message.chat_id).await?;
    if chat.user_id != user_id {
        return Err(AppError::PermissionDenied);
    }
    Ok((message, chat))
}

pub async fn find_owned_generation<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    id: Uuid,
) -> Result<generation::Model, AppError> {
    let generation = generation::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Generation not found".into()))?;
    if generation.user_id != user_id {
        return Err(AppError::PermissionDenied);
    }
    Ok(generation)
}
