use std::path::PathBuf;

use common::storage::s3::S3Options;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default)]
    pub allow_origins: Vec<String>,
    #[serde(default = "default_cors_max_age")]
    pub max_age: u64,
}

fn default_cors_max_age() -> u64 {
    3600
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            max_age: default_cors_max_age(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
    #[serde(default)]
    pub sqlx_logging: bool,
}

fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    8
}
fn default_max_lifetime_secs() -> u64 {
    1800
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_timeout_secs(),
            idle_timeout_secs: default_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
            sqlx_logging: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OAuthConfig {
    /// Userinfo endpoint queried with the provider access token.
    #[serde(default = "default_google_userinfo_url")]
    pub google_userinfo_url: String,
    #[serde(default = "default_facebook_userinfo_url")]
    pub facebook_userinfo_url: String,
}

fn default_google_userinfo_url() -> String {
    "https://www.googleapis.com/oauth2/v3/userinfo".into()
}
fn default_facebook_userinfo_url() -> String {
    "https://graph.facebook.com/me?fields=id,name,email,picture".into()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    #[serde(default)]
    pub oauth: OAuthConfig,
}

fn default_token_ttl_hours() -> i64 {
    24 * 7
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            token_ttl_hours: default_token_ttl_hours(),
            oauth: OAuthConfig {
                google_userinfo_url: default_google_userinfo_url(),
                facebook_userinfo_url: default_facebook_userinfo_url(),
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Filesystem,
    S3,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    /// Root directory for the filesystem backend.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Origin the filesystem backend's `/files` route is reachable at.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    pub s3: Option<S3Options>,
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Filesystem
}
fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/objects")
}
fn default_public_base_url() -> String {
    "http://127.0.0.1:3000/api/v1/files".into()
}
fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            root: default_storage_root(),
            public_base_url: default_public_base_url(),
            max_upload_bytes: default_max_upload_bytes(),
            s3: None,
        }
    }
}

/// One entry of the model catalog.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, utoipa::ToSchema)]
pub struct ModelInfo {
    #[schema(example = "meta-llama/Llama-3-70b-chat-hf")]
    pub id: String,
    #[schema(example = "Llama 3 70B")]
    pub name: String,
    /// Whether the model accepts image input.
    #[serde(default)]
    pub vision: bool,
}

impl ModelInfo {
    fn text(id: &str, name: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            vision: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageGenerationConfig {
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default = "default_image_width")]
    pub width: u32,
    #[serde(default = "default_image_height")]
    pub height: u32,
    #[serde(default = "default_image_steps")]
    pub steps: u32,
    #[serde(default = "default_image_count")]
    pub n: u32,
}

fn default_image_model() -> String {
    "black-forest-labs/FLUX.1-schnell-Free".into()
}
fn default_image_width() -> u32 {
    1024
}
fn default_image_height() -> u32 {
    768
}
fn default_image_steps() -> u32 {
    1
}
fn default_image_count() -> u32 {
    1
}

impl Default for ImageGenerationConfig {
    fn default() -> Self {
        Self {
            model: default_image_model(),
            width: default_image_width(),
            height: default_image_height(),
            steps: default_image_steps(),
            n: default_image_count(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_chat_model")]
    pub default_model: String,
    /// Number of prior messages sent as context.
    #[serde(default = "default_history_window")]
    pub history_window: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
    #[serde(default = "default_stop")]
    pub stop: Vec<String>,
    #[serde(default = "default_title_model")]
    pub title_model: String,
    #[serde(default)]
    pub image: ImageGenerationConfig,
    #[serde(default = "default_models")]
    pub models: Vec<ModelInfo>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_inference_base_url() -> String {
    "https://api.together.xyz/v1".into()
}
fn default_chat_model() -> String {
    "mistralai/Mixtral-8x7B-Instruct-v0.1".into()
}
fn default_history_window() -> u64 {
    10
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.7
}
fn default_top_k() -> u32 {
    50
}
fn default_repetition_penalty() -> f32 {
    1.0
}
fn default_stop() -> Vec<String> {
    vec!["<｜end▁of▁sentence｜>".into()]
}
fn default_title_model() -> String {
    "meta-llama/Llama-3.3-70B-Instruct-Turbo-Free".into()
}
fn default_request_timeout_secs() -> u64 {
    120
}

fn default_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::text("mistralai/Mixtral-8x7B-Instruct-v0.1", "Mixtral 8x7B"),
        ModelInfo::text("meta-llama/Llama-3-8b-chat-hf", "Llama 3 8B"),
        ModelInfo::text("meta-llama/Llama-3-70b-chat-hf", "Llama 3 70B"),
        ModelInfo::text("anthropic/claude-3-opus:beta", "Claude 3 Opus"),
        ModelInfo::text("anthropic/claude-3-sonnet:beta", "Claude 3 Sonnet"),
        ModelInfo::text("anthropic/claude-3-haiku:beta", "Claude 3 Haiku"),
        ModelInfo::text("meta-llama/Llama-3-8b-instruct", "Llama 3 8B Instruct"),
        ModelInfo::text("Qwen/Qwen1.5-72B-Chat", "Qwen 1.5 72B"),
        ModelInfo::text("google/gemma-7b-it", "Gemma 7B"),
        ModelInfo::text("deepseek-ai/deepseek-chat", "DeepSeek Chat"),
        ModelInfo {
            id: "meta-llama/Llama-3.2-11B-Vision-Instruct-Turbo".into(),
            name: "Llama 3.2 Vision".into(),
            vision: true,
        },
    ]
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_inference_base_url(),
            api_key: String::new(),
            default_model: default_chat_model(),
            history_window: default_history_window(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            repetition_penalty: default_repetition_penalty(),
            stop: default_stop(),
            title_model: default_title_model(),
            image: ImageGenerationConfig::default(),
            models: default_models(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl InferenceConfig {
    pub fn find_model(&self, id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == id)
    }

    /// First vision-capable model, or the first catalog entry if none is.
    pub fn vision_model(&self) -> Option<&ModelInfo> {
        self.models
            .iter()
            .find(|m| m.vision)
            .or_else(|| self.models.first())
    }

    pub fn supports_vision(&self, id: &str) -> bool {
        self.find_model(id).is_some_and(|m| m.vision)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

fn default_event_capacity() -> usize {
    256
}
fn default_keepalive_secs() -> u64 {
    15
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("database.url", "sqlite://./data/parley.db?mode=rwc")?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., PARLEY__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("PARLEY").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
