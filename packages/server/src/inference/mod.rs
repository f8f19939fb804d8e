mod accumulator;

use std::time::Duration;

use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt, retry};
use serde::{Deserialize, Serialize};

use crate::config::{InferenceConfig, ModelInfo};

pub use accumulator::TokenAccumulator;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Completion request failed: {status}")]
    Completion { status: u16, body: String },
    #[error("Image generation failed: {status}")]
    ImageGeneration { status: u16, body: String },
    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid upstream response: {0}")]
    Parse(String),
}

impl InferenceError {
    async fn from_stream(error: reqwest_eventsource::Error) -> Self {
        match error {
            reqwest_eventsource::Error::InvalidStatusCode(status, resp) => Self::Completion {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            },
            reqwest_eventsource::Error::Transport(e) => Self::Transport(e),
            other => Self::Parse(other.to_string()),
        }
    }
}

/// Message content: plain text, or a multi-part array for vision requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ChatMessage {
    #[schema(example = "user")]
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// A user turn asking a vision model about the file at `url`.
    pub fn vision(prompt: &str, url: &str) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: prompt.into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: url.into(),
                        detail: Some("high".into()),
                    },
                },
            ]),
        }
    }
}

/// Base64 image returned by the generation endpoint.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct GeneratedImage {
    pub b64_json: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    repetition_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    width: u32,
    height: u32,
    steps: u32,
    n: u32,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

/// Outcome of one decoded stream event.
#[derive(Debug, PartialEq)]
enum StreamStep {
    Delta(String),
    /// Final fragment sent together with its `finish_reason`.
    Last(String),
    Finished,
    Skip,
}

fn parse_stream_data(data: &str) -> StreamStep {
    let data = data.trim();
    if data == "[DONE]" {
        return StreamStep::Finished;
    }
    let Ok(parsed) = serde_json::from_str::<StreamResponse>(data) else {
        return StreamStep::Skip;
    };
    let Some(choice) = parsed.choices.into_iter().next() else {
        return StreamStep::Skip;
    };
    let content = choice.delta.and_then(|d| d.content).unwrap_or_default();
    match (content.is_empty(), choice.finish_reason.is_some()) {
        (false, false) => StreamStep::Delta(content),
        (false, true) => StreamStep::Last(content),
        (true, true) => StreamStep::Finished,
        (true, false) => StreamStep::Skip,
    }
}

/// Client for an OpenAI-compatible completion and image-generation API.
pub struct InferenceClient {
    http: reqwest::Client,
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn models(&self) -> &[ModelInfo] {
        &self.config.models
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let req = self.http.post(url);
        if self.config.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.config.api_key)
        }
    }

    fn completion_body<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [ChatMessage],
        max_tokens: Option<u32>,
        stream: bool,
    ) -> CompletionRequest<'a> {
        CompletionRequest {
            model,
            messages,
            max_tokens: max_tokens.unwrap_or(self.config.max_tokens),
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            top_k: self.config.top_k,
            repetition_penalty: self.config.repetition_penalty,
            stop: (!self.config.stop.is_empty()).then_some(self.config.stop.as_slice()),
            stream,
        }
    }

    /// Non-streaming completion; returns the first choice's text.
    pub async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: Option<u32>,
    ) -> Result<String, InferenceError> {
        let resp = self
            .post("chat/completions")
            .json(&self.completion_body(model, messages, max_tokens, false))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Completion { status, body });
        }

        let data: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))?;
        Ok(data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    /// Streaming completion. Each non-empty fragment is passed to `on_delta`
    /// as it arrives; the full text is returned once the stream ends.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        mut on_delta: impl FnMut(&str) + Send,
    ) -> Result<String, InferenceError> {
        let mut source = self
            .post("chat/completions")
            .json(&self.completion_body(model, messages, None, true))
            .eventsource()
            .map_err(|e| InferenceError::Parse(e.to_string()))?;
        source.set_retry_policy(Box::new(retry::Never));

        let mut accumulator = TokenAccumulator::new();
        while let Some(event) = source.next().await {
            let message = match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => message,
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    source.close();
                    return Err(InferenceError::from_stream(e).await);
                }
            };
            match parse_stream_data(&message.data) {
                StreamStep::Delta(text) => {
                    on_delta(&text);
                    accumulator.push(&text);
                }
                StreamStep::Last(text) => {
                    on_delta(&text);
                    accumulator.push(&text);
                    break;
                }
                StreamStep::Finished => break,
                StreamStep::Skip => {}
            }
        }

        source.close();
        Ok(accumulator.into_text())
    }

    /// Generate one image with the configured model and dimensions.
    pub async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, InferenceError> {
        let image = &self.config.image;
        let body = ImageRequest {
            model: &image.model,
            prompt,
            width: image.width,
            height: image.height,
            steps: image.steps,
            n: image.n,
            response_format: "b64_json",
        };

        let resp = self.post("images/generations").json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::ImageGeneration { status, body });
        }

        let data: ImageResponse = resp
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))?;
        let b64_json = data
            .data
            .into_iter()
            .find_map(|d| d.b64_json)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| InferenceError::Parse("no image data in response".into()))?;

        Ok(GeneratedImage {
            b64_json,
            model: image.model.clone(),
            width: image.width,
            height: image.height,
        })
    }
}
