use std::sync::Arc;

use common::storage::ObjectStore;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::events::EventHub;
use crate::inference::InferenceClient;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub objects: Arc<dyn ObjectStore>,
    pub inference: Arc<InferenceClient>,
    pub events: EventHub,
}
