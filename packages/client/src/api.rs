use common::{ChangeEvent, Resource, TurnEvent};
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::types::{
    Attachment, Chat, ChatQuery, Generation, Message, ModelInfo, Page, Registered, Session,
    TurnRequest, Upload, User,
};

/// Events of one turn or attachment exchange, ending with `done`.
pub type TurnStream = BoxStream<'static, Result<TurnEvent>>;
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent>>;

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Typed wrapper over the Parley HTTP API.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let res = self.authed(builder).send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        Err(api_error(status, res).await)
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let bytes = self.send(builder).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<Registered> {
        let body = json!({"email": email, "password": password, "full_name": full_name});
        self.json(self.http.post(self.url("/auth/register")).json(&body))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let body = json!({"email": email, "password": password});
        self.json(self.http.post(self.url("/auth/login")).json(&body))
            .await
    }

    /// Exchange an identity-provider access token for a session.
    pub async fn oauth(&self, provider: &str, access_token: &str) -> Result<Session> {
        let body = json!({"access_token": access_token});
        self.json(
            self.http
                .post(self.url(&format!("/auth/oauth/{provider}")))
                .json(&body),
        )
        .await
    }

    pub async fn me(&self) -> Result<User> {
        self.json(self.http.get(self.url("/auth/me"))).await
    }

    pub async fn models(&self) -> Result<Vec<ModelInfo>> {
        self.json(self.http.get(self.url("/models"))).await
    }

    pub async fn list_chats(&self, query: &ChatQuery) -> Result<Page<Chat>> {
        self.json(self.http.get(self.url("/chats")).query(query))
            .await
    }

    pub async fn create_chat(&self, title: &str, model: Option<&str>) -> Result<Chat> {
        let body = json!({"title": title, "model": model});
        self.json(self.http.post(self.url("/chats")).json(&body))
            .await
    }

    pub async fn rename_chat(&self, id: Uuid, title: &str) -> Result<Chat> {
        let body = json!({"title": title});
        self.json(self.http.patch(self.url(&format!("/chats/{id}"))).json(&body))
            .await
    }

    pub async fn delete_chat(&self, id: Uuid) -> Result<()> {
        self.send(self.http.delete(self.url(&format!("/chats/{id}"))))
            .await?;
        Ok(())
    }

    /// The latest [`HISTORY_LIMIT`] messages of a chat, oldest first.
    pub async fn list_messages(&self, chat_id: Uuid) -> Result<Vec<Message>> {
        let limit = HISTORY_LIMIT.to_string();
        let mut messages: Vec<Message> = self
            .json(
                self.http
                    .get(self.url(&format!("/chats/{chat_id}/messages")))
                    .query(&[("sort_order", "desc"), ("limit", limit.as_str())]),
            )
            .await?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn delete_message(&self, id: Uuid) -> Result<()> {
        self.send(self.http.delete(self.url(&format!("/messages/{id}"))))
            .await?;
        Ok(())
    }

    pub async fn list_generations(&self, chat_id: Uuid) -> Result<Page<Generation>> {
        self.json(
            self.http
                .get(self.url(&format!("/chats/{chat_id}/generations"))),
        )
        .await
    }

    /// Store a file through the upload relay.
    pub async fn upload(
        &self,
        file_name: &str,
        mime: &str,
        data: Vec<u8>,
        chat_id: Option<Uuid>,
    ) -> Result<Upload> {
        let part = Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let mut form = Form::new().part("file", part);
        if let Some(chat_id) = chat_id {
            form = form.text("chat_id", chat_id.to_string());
        }
        self.json(self.http.post(self.url("/upload")).multipart(form))
            .await
    }

    pub async fn send_turn(&self, chat_id: Uuid, request: &TurnRequest) -> Result<TurnStream> {
        let res = self
            .send(
                self.http
                    .post(self.url(&format!("/chats/{chat_id}/turns")))
                    .json(request),
            )
            .await?;
        Ok(decode_frames::<TurnEvent>(res))
    }

    pub async fn attach(&self, chat_id: Uuid, attachment: Attachment) -> Result<TurnStream> {
        let part = Part::bytes(attachment.data)
            .file_name(attachment.file_name)
            .mime_str(&attachment.mime)?;
        let mut form = Form::new().part("file", part);
        if let Some(prompt) = attachment.prompt {
            form = form.text("prompt", prompt);
        }
        if let Some(model) = attachment.model {
            form = form.text("model", model);
        }
        if let Some(client_ref) = attachment.client_ref {
            form = form.text("client_ref", client_ref.to_string());
        }

        let res = self
            .send(
                self.http
                    .post(self.url(&format!("/chats/{chat_id}/attachments")))
                    .multipart(form),
            )
            .await?;
        Ok(decode_frames::<TurnEvent>(res))
    }

    /// Open the change-event stream for `resources` (all when empty).
    ///
    /// Resolves once the server has accepted the stream, so every change made
    /// after this returns is delivered.
    pub async fn events(&self, resources: &[Resource]) -> Result<ChangeStream> {
        let mut request = self.http.get(self.url("/events"));
        if !resources.is_empty() {
            let names = resources
                .iter()
                .map(Resource::as_str)
                .collect::<Vec<_>>()
                .join(",");
            request = request.query(&[("resources", names)]);
        }
        let mut source = self
            .authed(request)
            .eventsource()
            .map_err(|e| ClientError::EventStream(e.to_string()))?;

        match source.next().await {
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                source.close();
                return Err(open_failure(e).await);
            }
            None => return Err(ClientError::StreamClosed),
        }

        // A closed stream is reopened by the event source; only other errors surface.
        Ok(source
            .filter_map(|event| async move {
                match event {
                    Ok(Event::Open) | Err(reqwest_eventsource::Error::StreamEnded) => None,
                    Ok(Event::Message(message)) if message.data.is_empty() => None,
                    Ok(Event::Message(message)) => {
                        Some(serde_json::from_str::<ChangeEvent>(&message.data).map_err(ClientError::from))
                    }
                    Err(reqwest_eventsource::Error::Transport(e)) => Some(Err(ClientError::Http(e))),
                    Err(e) => Some(Err(ClientError::EventStream(e.to_string()))),
                }
            })
            .boxed())
    }
}

/// Most recent messages loaded when a chat is opened; the server's maximum.
pub const HISTORY_LIMIT: u32 = 500;

async fn api_error(status: StatusCode, res: Response) -> ClientError {
    let text = res.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.code, body.message),
        Err(_) => (
            "HTTP_ERROR".to_string(),
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
        ),
    };
    tracing::debug!(status = status.as_u16(), %code, "API request failed");
    ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

async fn open_failure(error: reqwest_eventsource::Error) -> ClientError {
    match error {
        reqwest_eventsource::Error::InvalidStatusCode(status, res) => api_error(status, res).await,
        reqwest_eventsource::Error::Transport(e) => ClientError::Http(e),
        other => ClientError::EventStream(other.to_string()),
    }
}

/// JSON payloads of a one-shot `text/event-stream` response.
fn decode_frames<T: DeserializeOwned + Send + 'static>(res: Response) -> BoxStream<'static, Result<T>> {
    res.bytes_stream()
        .eventsource()
        .filter_map(|frame| async move {
            match frame {
                Ok(event) if event.data.is_empty() => None,
                Ok(event) => Some(serde_json::from_str::<T>(&event.data).map_err(ClientError::from)),
                Err(EventStreamError::Transport(e)) => Some(Err(ClientError::Http(e))),
                Err(e) => Some(Err(ClientError::EventStream(e.to_string()))),
            }
        })
        .boxed()
}
