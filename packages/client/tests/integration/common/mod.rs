use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Json as JsonBody;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};
use tempfile::TempDir;

use ::common::storage::filesystem::FilesystemObjectStore;
use parley_client::{ApiClient, ChatSession};
use parley_server::config::{
    AppConfig, AuthConfig, CorsConfig, DatabaseConfig, EventsConfig, InferenceConfig,
    ServerConfig, StorageConfig,
};
use parley_server::events::EventHub;
use parley_server::inference::InferenceClient;
use parley_server::state::AppState;

pub const UPLOAD_LIMIT: u64 = 32 * 1024;

fn last_user_text(body: &Value) -> String {
    let last = body["messages"].as_array().and_then(|m| m.last());
    match last.map(|m| &m["content"]) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

/// Streams "Hello world" in three fragments; `fail-upstream` gives a 500 and
/// non-streaming calls answer with a title.
async fn stub_completions(JsonBody(body): JsonBody<Value>) -> Response {
    if last_user_text(&body).contains("fail-upstream") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model exploded").into_response();
    }
    if body["stream"] != json!(true) {
        return JsonBody(json!({"choices": [{"message": {"role": "assistant", "content": "Greeting Chat"}}]}))
            .into_response();
    }

    let mut sse = String::new();
    for fragment in ["Hel", "lo", " world"] {
        let chunk = json!({"choices": [{"delta": {"content": fragment}}]});
        sse.push_str(&format!("data: {chunk}\n\n"));
    }
    sse.push_str("data: [DONE]\n\n");
    ([("content-type", "text/event-stream")], sse).into_response()
}

async fn spawn_stub_upstream() -> SocketAddr {
    let app = Router::new().route("/v1/chat/completions", post(stub_completions));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub upstream");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A running Parley server on a random port.
pub struct TestServer {
    pub addr: SocketAddr,
    _dir: TempDir,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let upstream = spawn_stub_upstream().await;

        let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("parley.db").display());
        let mut database = DatabaseConfig::new(db_url);
        database.max_connections = 1;
        let db = parley_server::database::init_db(&database)
            .await
            .expect("Failed to initialize test database");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
                cors: CorsConfig::default(),
            },
            database,
            auth: AuthConfig::new("client-test-secret"),
            storage: StorageConfig {
                root: dir.path().join("objects"),
                public_base_url: format!("http://{addr}/api/v1/files"),
                max_upload_bytes: UPLOAD_LIMIT,
                ..Default::default()
            },
            inference: InferenceConfig {
                base_url: format!("http://{upstream}/v1"),
                api_key: "stub-key".into(),
                request_timeout_secs: 10,
                ..Default::default()
            },
            events: EventsConfig {
                capacity: 64,
                keepalive_secs: 1,
            },
        };

        let objects = FilesystemObjectStore::new(
            config.storage.root.clone(),
            config.storage.public_base_url.clone(),
            config.storage.max_upload_bytes,
        )
        .await
        .expect("Failed to create object store");

        let state = AppState {
            db,
            inference: Arc::new(
                InferenceClient::new(config.inference.clone())
                    .expect("Failed to build inference client"),
            ),
            objects: Arc::new(objects),
            events: EventHub::new(
                config.events.capacity,
                Duration::from_secs(config.events.keepalive_secs),
            ),
            config: Arc::new(config),
        };

        let app = parley_server::build_router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, _dir: dir }
    }

    pub fn api(&self) -> ApiClient {
        ApiClient::new(format!("http://{}", self.addr))
    }

    /// A session signed in as a freshly registered user.
    pub async fn session(&self, email: &str) -> ChatSession {
        let mut session = ChatSession::new(self.api()).with_upload_limit(UPLOAD_LIMIT);
        let outcome = session.register(email, "securepass", Some("Test User")).await;
        assert!(outcome.is_success(), "{:?}", outcome.error());
        session
    }
}

/// Poll `check` after pumping events until it holds or `wait` passes.
pub async fn eventually(session: &mut ChatSession, wait: Duration, check: impl Fn(&ChatSession) -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        session.pump_events();
        if check(session) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
