use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A produced or uploaded artifact. `chat_id` is a loose reference: the row
/// outlives its chat and stays in the owner's gallery.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "generations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub user_id: Uuid,
    #[sea_orm(belongs_to, from = "user_id", to = "id")]
    pub user: HasOne<super::user::Entity>,

    #[sea_orm(indexed)]
    pub chat_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub prompt: String,
    #[sea_orm(column_type = "Text")]
    pub url: String,
    pub model: String,
    pub width: i32,
    pub height: i32,
    /// `completed` for everything this service writes; clients may patch it.
    pub status: String,
    #[sea_orm(column_type = "Json")]
    pub metadata: Json,

    #[sea_orm(indexed)]
    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
