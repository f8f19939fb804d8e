use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Stored trimmed and lowercased.
    #[sea_orm(unique)]
    pub email: String,
    /// Argon2 PHC string. NULL for accounts created through OAuth.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,

    #[sea_orm(unique)]
    pub google_id: Option<String>,
    #[sea_orm(unique)]
    pub facebook_id: Option<String>,

    #[sea_orm(has_many)]
    pub chats: HasMany<super::chat::Entity>,

    #[sea_orm(has_many)]
    pub generations: HasMany<super::generation::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
