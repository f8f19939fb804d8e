use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::storage::ObjectStore;
use common::storage::filesystem::FilesystemObjectStore;
use common::storage::s3::S3ObjectStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_server::config::{AppConfig, StorageBackend, StorageConfig};
use parley_server::database::init_db;
use parley_server::events::EventHub;
use parley_server::inference::InferenceClient;
use parley_server::state::AppState;

async fn object_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config.backend {
        StorageBackend::Filesystem => Arc::new(
            FilesystemObjectStore::new(
                config.root.clone(),
                config.public_base_url.clone(),
                config.max_upload_bytes,
            )
            .await
            .with_context(|| format!("Failed to open object store at {}", config.root.display()))?,
        ),
        StorageBackend::S3 => {
            let options = config
                .s3
                .as_ref()
                .context("storage.backend is s3 but storage.s3 is not configured")?;
            Arc::new(S3ObjectStore::new(options, config.max_upload_bytes)?)
        }
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = init_db(&config.database)
        .await
        .context("Failed to initialize database")?;
    info!("Database ready");

    let objects = object_store(&config.storage).await?;
    info!(backend = objects.backend(), "Object store ready");

    let inference = InferenceClient::new(config.inference.clone())
        .context("Failed to build inference client")?;
    let events = EventHub::new(
        config.events.capacity,
        Duration::from_secs(config.events.keepalive_secs),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState {
        db,
        config: Arc::new(config),
        objects,
        inference: Arc::new(inference),
        events,
    };

    let app = parley_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
