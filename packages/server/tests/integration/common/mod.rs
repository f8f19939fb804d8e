use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Json as JsonBody;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use eventsource_stream::{Event as MessageEvent, EventStreamError, Eventsource};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use tempfile::TempDir;

use ::common::storage::filesystem::FilesystemObjectStore;
use parley_server::config::{
    AppConfig, AuthConfig, CorsConfig, DatabaseConfig, EventsConfig, InferenceConfig,
    ServerConfig, StorageConfig,
};
use parley_server::events::EventHub;
use parley_server::inference::InferenceClient;
use parley_server::state::AppState;

pub mod routes {
    use uuid::Uuid;

    pub const REGISTER: &str = "/api/v1/auth/register";
    pub const LOGIN: &str = "/api/v1/auth/login";
    pub const ME: &str = "/api/v1/auth/me";
    pub const PROFILE: &str = "/api/v1/users/me";
    pub const CHATS: &str = "/api/v1/chats";
    pub const GENERATIONS: &str = "/api/v1/generations";
    pub const UPLOAD: &str = "/api/v1/upload";
    pub const MODELS: &str = "/api/v1/models";
    pub const COMPLETIONS: &str = "/api/v1/inference/completions";
    pub const IMAGES: &str = "/api/v1/inference/images";
    pub const EVENTS: &str = "/api/v1/events";

    pub fn oauth(provider: &str) -> String {
        format!("/api/v1/auth/oauth/{provider}")
    }

    pub fn chat(id: Uuid) -> String {
        format!("/api/v1/chats/{id}")
    }

    pub fn chat_messages(id: Uuid) -> String {
        format!("/api/v1/chats/{id}/messages")
    }

    pub fn chat_generations(id: Uuid) -> String {
        format!("/api/v1/chats/{id}/generations")
    }

    pub fn turns(id: Uuid) -> String {
        format!("/api/v1/chats/{id}/turns")
    }

    pub fn attachments(id: Uuid) -> String {
        format!("/api/v1/chats/{id}/attachments")
    }

    pub fn message(id: Uuid) -> String {
        format!("/api/v1/messages/{id}")
    }

    pub fn generation(id: Uuid) -> String {
        format!("/api/v1/generations/{id}")
    }

    pub fn file(key: &str) -> String {
        format!("/api/v1/files/{key}")
    }
}

/// Upload cap used by every test server.
pub const MAX_UPLOAD_BYTES: u64 = 64 * 1024;

/// Bytes the stub image endpoint returns (base64-encoded).
pub const STUB_PNG: &[u8] = b"\x89PNG\r\n\x1a\nstub-image";

/// Access token the stub OAuth provider accepts.
pub const GOOD_OAUTH_TOKEN: &str = "good-provider-token";

fn last_user_text(body: &Value) -> String {
    body["messages"]
        .as_array()
        .and_then(|msgs| msgs.last())
        .map(|m| match &m["content"] {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        })
        .unwrap_or_default()
}

fn sse_chunks(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let chunk = json!({"choices": [{"delta": {"content": fragment}, "finish_reason": null}]});
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}

/// OpenAI-compatible completion stub.
///
/// The last user message steers it: `fail-upstream` gives a 500, `propose`
/// makes the reply offer an image, anything else streams "Hello world".
async fn stub_completions(JsonBody(body): JsonBody<Value>) -> Response {
    let text = last_user_text(&body);
    if text.contains("fail-upstream") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model exploded").into_response();
    }

    if body["stream"] != json!(true) {
        let reply = if body["max_tokens"] == json!(50) {
            "Title: \"Red Fox Chat\"".to_string()
        } else {
            "Hello world".to_string()
        };
        return JsonBody(json!({"choices": [{"message": {"role": "assistant", "content": reply}}]}))
            .into_response();
    }

    let fragments: Vec<&str> = if text.contains("propose") {
        vec!["Sure! ", "I'll generate an image ", "of \"a misty forest\" for you."]
    } else {
        vec!["Hel", "lo", " world"]
    };
    (
        [("content-type", "text/event-stream")],
        sse_chunks(&fragments),
    )
        .into_response()
}

async fn stub_images(JsonBody(body): JsonBody<Value>) -> Response {
    if body["prompt"].as_str().unwrap_or_default().contains("fail-upstream") {
        return (StatusCode::BAD_GATEWAY, "no capacity").into_response();
    }
    JsonBody(json!({"data": [{"b64_json": STANDARD.encode(STUB_PNG)}]})).into_response()
}

async fn stub_userinfo(headers: HeaderMap) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {GOOD_OAUTH_TOKEN}"));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    JsonBody(json!({
        "sub": "google-123",
        "email": "Oauth.User@Example.com",
        "name": "OAuth User",
        "picture": "https://example.com/a.png"
    }))
    .into_response()
}

async fn spawn_stub_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/v1/chat/completions", post(stub_completions))
        .route("/v1/images/generations", post(stub_images))
        .route("/google/userinfo", get(stub_userinfo));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub upstream");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.expect("Failed to read response body");
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }
}

/// One decoded SSE frame from a turn or completion stream.
#[derive(Debug)]
pub struct SseEvent {
    pub event: String,
    pub data: Value,
}

/// Split a finished `text/event-stream` body into frames, skipping comments.
pub fn parse_sse(body: &str) -> Vec<SseEvent> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = String::new();
            for line in block.lines() {
                if let Some(rest) = line.strip_prefix("event:") {
                    event = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data.push_str(rest.trim_start());
                }
            }
            event.map(|event| SseEvent {
                event,
                data: serde_json::from_str(&data).unwrap_or(Value::String(data)),
            })
        })
        .collect()
}

/// A running test server with its own database, object store and upstream stub.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    pub state: AppState,
    _dir: TempDir,
}

impl TestApp {
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

        let mut auth = AuthConfig::new("test-secret-for-integration-tests");
        auth.oauth.google_userinfo_url = format!("http://{upstream}/google/userinfo");
        auth.oauth.facebook_userinfo_url = format!("http://{upstream}/facebook/me");

        let storage = StorageConfig {
            root: dir.path().join("objects"),
            public_base_url: format!("http://{addr}/api/v1/files"),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            ..Default::default()
        };
        let inference = InferenceConfig {
            base_url: format!("http://{upstream}/v1"),
            api_key: "stub-key".into(),
            request_timeout_secs: 10,
            ..Default::default()
        };

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig::default(),
            },
            database,
            auth,
            storage,
            inference,
            events: EventsConfig {
                capacity: 64,
                keepalive_secs: 1,
            },
        };

        let objects = FilesystemObjectStore::new(
            app_config.storage.root.clone(),
            app_config.storage.public_base_url.clone(),
            app_config.storage.max_upload_bytes,
        )
        .await
        .expect("Failed to create object store");

        let state = AppState {
            db: db.clone(),
            inference: Arc::new(
                InferenceClient::new(app_config.inference.clone())
                    .expect("Failed to build inference client"),
            ),
            objects: Arc::new(objects),
            events: EventHub::new(
                app_config.events.capacity,
                Duration::from_secs(app_config.events.keepalive_secs),
            ),
            config: Arc::new(app_config),
        };

        let app = parley_server::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            state,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_without_token(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_without_token(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn patch_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .patch(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to send PATCH request");

        TestResponse::from_response(res).await
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    /// POST a multipart form with a `file` part plus text fields.
    pub async fn multipart_with_token(
        &self,
        path: &str,
        file_name: &str,
        mime: &str,
        file_bytes: Vec<u8>,
        fields: &[(&str, String)],
        token: &str,
    ) -> TestResponse {
        let part = Part::bytes(file_bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .expect("Failed to set MIME type");
        let mut form = Form::new().part("file", part);
        for (name, value) in fields {
            form = form.text(name.to_string(), value.clone());
        }

        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart request");

        TestResponse::from_response(res).await
    }

    /// Send a turn and read the event stream to its end.
    pub async fn send_turn(&self, chat_id: uuid::Uuid, body: &Value, token: &str) -> Vec<SseEvent> {
        let res = self
            .post_with_token(&routes::turns(chat_id), body, token)
            .await;
        assert_eq!(res.status, 200, "Turn failed: {}", res.text);
        parse_sse(&res.text)
    }

    /// Register a user and log in, returning the auth token.
    pub async fn create_authenticated_user(&self, email: &str) -> String {
        let body = json!({"email": email, "password": "securepass", "full_name": "Test User"});

        let reg = self.post_without_token(routes::REGISTER, &body).await;
        assert_eq!(reg.status, 201, "Registration failed: {}", reg.text);

        let res = self.post_without_token(routes::LOGIN, &body).await;
        assert_eq!(res.status, 200, "Login failed: {}", res.text);

        res.body["token"]
            .as_str()
            .expect("Login response missing token")
            .to_string()
    }

    /// Create a chat and return its id.
    pub async fn create_chat(&self, token: &str, title: &str) -> uuid::Uuid {
        let res = self
            .post_with_token(routes::CHATS, &json!({"title": title}), token)
            .await;
        assert_eq!(res.status, 201, "Chat creation failed: {}", res.text);
        res.body["id"].as_str().unwrap().parse().unwrap()
    }
}

/// A live `/events` subscription.
pub struct EventReader {
    stream: BoxStream<'static, Result<MessageEvent, EventStreamError<reqwest::Error>>>,
}

impl EventReader {
    /// Next `event: <resource>` frame, or `None` if nothing arrives in time.
    pub async fn next(&mut self, wait: Duration) -> Option<SseEvent> {
        let frame = tokio::time::timeout(wait, self.stream.next())
            .await
            .ok()??
            .ok()?;
        Some(SseEvent {
            event: frame.event,
            data: serde_json::from_str(&frame.data).unwrap_or(Value::String(frame.data)),
        })
    }
}

impl TestApp {
    pub async fn open_events(&self, token: &str, resources: Option<&str>) -> EventReader {
        let path = match resources {
            Some(r) => format!("{}?resources={r}", routes::EVENTS),
            None => routes::EVENTS.to_string(),
        };
        let res = self
            .client
            .get(self.url(&path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to open event stream");
        assert_eq!(res.status(), 200);
        EventReader {
            stream: res.bytes_stream().eventsource().boxed(),
        }
    }
}
