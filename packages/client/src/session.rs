use std::path::Path;

use common::{ChangeEvent, ChangeKind, Resource, TurnEvent};
use futures::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::api::{ApiClient, TurnStream};
use crate::error::{ClientError, Result};
use crate::outcome::Outcome;
use crate::store::{ActiveChat, ChatStore, StoreAction};
use crate::subscriptions::{SubscriptionKey, SubscriptionManager};
use crate::types::{Attachment, Chat, ChatQuery, Generation, Message, TurnRequest, User};

pub const DEFAULT_CHAT_TITLE: &str = "New Chat";
pub const DEFAULT_UPLOAD_LIMIT: u64 = 10 * 1024 * 1024;
const CHAT_PAGE: u64 = 100;
const TITLE_CHARS: usize = 30;

/// What one exchange produced.
#[derive(Debug, Default, Clone)]
pub struct TurnSummary {
    pub user_messages: Vec<Message>,
    pub replies: Vec<Message>,
    pub generations: Vec<Generation>,
    /// Set when the server switched to a vision model.
    pub switched_model: Option<String>,
}

impl TurnSummary {
    pub fn reply_text(&self) -> Option<&str> {
        self.replies.first().map(|m| m.content.as_str())
    }
}

/// Title for a chat created from its first message.
pub fn title_for(content: &str) -> String {
    let content = content.trim();
    if content.is_empty() {
        return DEFAULT_CHAT_TITLE.into();
    }
    if content.chars().count() > TITLE_CHARS {
        let cut: String = content.chars().take(TITLE_CHARS).collect();
        format!("{cut}...")
    } else {
        content.to_string()
    }
}

/// Keeps a [`ChatStore`] in step with the server for one signed-in user.
pub struct ChatSession {
    api: ApiClient,
    store: ChatStore,
    user: Option<User>,
    subscriptions: SubscriptionManager,
    events_rx: UnboundedReceiver<ChangeEvent>,
    upload_limit: u64,
}

impl ChatSession {
    pub fn new(api: ApiClient) -> Self {
        let (tx, rx): (UnboundedSender<ChangeEvent>, _) = mpsc::unbounded_channel();
        Self {
            subscriptions: SubscriptionManager::new(tx),
            api,
            store: ChatStore::new(),
            user: None,
            events_rx: rx,
            upload_limit: DEFAULT_UPLOAD_LIMIT,
        }
    }

    pub fn with_upload_limit(mut self, bytes: u64) -> Self {
        self.upload_limit = bytes;
        self
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn dismiss_notice(&mut self, id: u64) {
        self.store.apply(StoreAction::NoticeDismissed(id));
    }

    /// Report `result`'s error as a notice and convert it to an [`Outcome`].
    fn settle<T>(&mut self, result: Result<T>) -> Outcome<T> {
        if let Err(ref e) = result {
            tracing::warn!(code = e.code(), error = %e, "Client operation failed");
            self.store.apply(StoreAction::NoticeRaised(e.user_message()));
        }
        result.into()
    }

    fn set_session(&mut self, token: String, user: User) {
        self.api.set_token(Some(token));
        self.user = Some(user);
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Outcome<User> {
        let result = self.api.login(email, password).await.map(|session| {
            self.set_session(session.token, session.user.clone());
            session.user
        });
        self.settle(result)
    }

    /// Create an account and sign in with it.
    pub async fn register(
        &mut self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Outcome<User> {
        if let Err(e) = self.api.register(email, password, full_name).await {
            return self.settle(Err(e));
        }
        self.sign_in(email, password).await
    }

    pub async fn sign_in_with_provider(&mut self, provider: &str, access_token: &str) -> Outcome<User> {
        let result = self.api.oauth(provider, access_token).await.map(|session| {
            self.set_session(session.token, session.user.clone());
            session.user
        });
        self.settle(result)
    }

    /// Adopt the token the API client already carries.
    pub async fn resume(&mut self) -> Outcome<User> {
        let result = self.api.me().await.inspect(|user| {
            self.user = Some(user.clone());
        });
        self.settle(result)
    }

    fn owner_id(&self) -> Result<Uuid> {
        self.user.as_ref().map(|u| u.id).ok_or(ClientError::NotSignedIn)
    }

    /// Load chats, select the most recent (creating one if none exist),
    /// load its messages and subscribe to the user's chat and message events.
    pub async fn bootstrap(&mut self) -> Outcome<()> {
        let result = self.try_bootstrap().await;
        self.settle(result)
    }

    async fn try_bootstrap(&mut self) -> Result<()> {
        let owner_id = self.owner_id()?;
        // Listen before loading so changes made while loading are not missed.
        for resource in [Resource::Chats, Resource::Message] {
            self.subscriptions
                .subscribe(&self.api, SubscriptionKey::new(resource, owner_id))
                .await?;
        }

        let page = self.api.list_chats(&ChatQuery::recent(CHAT_PAGE)).await?;
        let mut chats = page.data;
        if chats.is_empty() {
            chats.push(self.api.create_chat(DEFAULT_CHAT_TITLE, None).await?);
        }
        let selected = chats[0].id;
        let messages = self.api.list_messages(selected).await?;

        self.store.apply(StoreAction::ChatsLoaded(chats));
        self.store
            .apply(StoreAction::ChatSelected(ActiveChat::Chat(selected)));
        self.store.apply(StoreAction::MessagesLoaded {
            chat_id: selected,
            messages,
        });
        tracing::info!(chat_id = %selected, "Session ready");
        Ok(())
    }

    /// Select a chat and replace the message list with its history.
    pub async fn switch_chat(&mut self, chat_id: Uuid) -> Outcome<()> {
        let result = self.api.list_messages(chat_id).await;
        let result = result.map(|messages| {
            self.store
                .apply(StoreAction::ChatSelected(ActiveChat::Chat(chat_id)));
            self.store
                .apply(StoreAction::MessagesLoaded { chat_id, messages });
        });
        self.settle(result)
    }

    /// Start over with no chat selected.
    pub fn new_chat(&mut self) {
        self.store.apply(StoreAction::ChatSelected(ActiveChat::New));
    }

    pub async fn delete_chat(&mut self, chat_id: Uuid) -> Outcome<()> {
        let result = self.api.delete_chat(chat_id).await;
        if result.is_ok() {
            self.store.apply(StoreAction::ChatRemoved(chat_id));
            if let ActiveChat::Chat(next) = self.store.active() {
                return self.switch_chat(next).await;
            }
        }
        self.settle(result)
    }

    /// Apply every change event received so far. Returns how many were applied.
    pub fn pump_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_change(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next change event, apply it and hand it back.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        let event = self.events_rx.recv().await?;
        self.apply_change(event.clone());
        Some(event)
    }

    fn apply_change(&mut self, event: ChangeEvent) {
        let action = match (event.resource, event.kind) {
            (Resource::Chats, ChangeKind::Removed) => event.record::<Chat>().map(|c| StoreAction::ChatRemoved(c.id)),
            (Resource::Chats, _) => event.record::<Chat>().map(StoreAction::ChatUpserted),
            (Resource::Message, ChangeKind::Removed) => event
                .record::<Message>()
                .map(|m| StoreAction::MessageRemoved {
                    chat_id: m.chat_id,
                    id: m.id,
                }),
            (Resource::Message, _) => event.record::<Message>().map(StoreAction::MessageUpserted),
            _ => return,
        };
        match action {
            Ok(action) => self.store.apply(action),
            Err(e) => {
                tracing::warn!(resource = %event.resource, error = %e, "Undecodable change event")
            }
        }
    }

    /// Active chat id, creating a chat titled after `content` when none is selected.
    async fn ensure_chat(&mut self, content: &str, model: Option<&str>) -> Result<Uuid> {
        if let Some(id) = self.store.active_chat_id() {
            return Ok(id);
        }
        let chat = self.api.create_chat(&title_for(content), model).await?;
        let id = chat.id;
        self.store.apply(StoreAction::ChatUpserted(chat));
        self.store
            .apply(StoreAction::ChatSelected(ActiveChat::Chat(id)));
        Ok(id)
    }

    /// Send a message and stream the reply into the store.
    pub async fn send_message(&mut self, content: &str, model: Option<&str>) -> Outcome<TurnSummary> {
        self.send_message_with(content, model, |_| {}).await
    }

    /// [`send_message`](Self::send_message), calling `observe` for every turn event.
    pub async fn send_message_with(
        &mut self,
        content: &str,
        model: Option<&str>,
        observe: impl FnMut(&TurnEvent),
    ) -> Outcome<TurnSummary> {
        let result = self.try_send(content, model, observe).await;
        self.settle(result)
    }

    async fn try_send(
        &mut self,
        content: &str,
        model: Option<&str>,
        observe: impl FnMut(&TurnEvent),
    ) -> Result<TurnSummary> {
        self.owner_id()?;
        let chat_id = self.ensure_chat(content, model).await?;
        let client_ref = Uuid::new_v4();
        let reply_ref = Uuid::new_v4();
        self.start_exchange(chat_id, client_ref, reply_ref, content);

        let request = TurnRequest {
            content: content.to_string(),
            model: model.map(str::to_string),
            client_ref: Some(client_ref),
        };
        match self.api.send_turn(chat_id, &request).await {
            Ok(stream) => self.consume(stream, client_ref, reply_ref, observe).await,
            Err(e) => {
                self.abandon(&[client_ref, reply_ref]);
                Err(e)
            }
        }
    }

    /// Upload a file into the active chat and stream its analysis.
    ///
    /// Files over the upload limit fail locally without any request.
    pub async fn attach_file(
        &mut self,
        path: &Path,
        prompt: Option<&str>,
        model: Option<&str>,
    ) -> Outcome<TurnSummary> {
        self.attach_file_with(path, prompt, model, |_| {}).await
    }

    pub async fn attach_file_with(
        &mut self,
        path: &Path,
        prompt: Option<&str>,
        model: Option<&str>,
        observe: impl FnMut(&TurnEvent),
    ) -> Outcome<TurnSummary> {
        let result = self.try_attach(path, prompt, model, observe).await;
        self.settle(result)
    }

    async fn try_attach(
        &mut self,
        path: &Path,
        prompt: Option<&str>,
        model: Option<&str>,
        observe: impl FnMut(&TurnEvent),
    ) -> Result<TurnSummary> {
        let size = tokio::fs::metadata(path).await?.len();
        if size > self.upload_limit {
            return Err(ClientError::FileTooLarge {
                size,
                limit: self.upload_limit,
            });
        }
        self.owner_id()?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".into());
        let data = tokio::fs::read(path).await?;
        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        let chat_id = self.ensure_chat(&file_name, model).await?;
        let client_ref = Uuid::new_v4();
        let reply_ref = Uuid::new_v4();
        self.start_exchange(chat_id, client_ref, reply_ref, &file_name);

        let attachment = Attachment {
            file_name,
            mime,
            data,
            prompt: prompt.map(str::to_string),
            model: model.map(str::to_string),
            client_ref: Some(client_ref),
        };
        match self.api.attach(chat_id, attachment).await {
            Ok(stream) => self.consume(stream, client_ref, reply_ref, observe).await,
            Err(e) => {
                self.abandon(&[client_ref, reply_ref]);
                Err(e)
            }
        }
    }

    fn start_exchange(&mut self, chat_id: Uuid, client_ref: Uuid, reply_ref: Uuid, content: &str) {
        self.store.apply(StoreAction::PlaceholderStarted {
            client_ref,
            chat_id,
            role: "user".into(),
            content: content.to_string(),
        });
        self.store.apply(StoreAction::PlaceholderStarted {
            client_ref: reply_ref,
            chat_id,
            role: "assistant".into(),
            content: String::new(),
        });
    }

    fn abandon(&mut self, refs: &[Uuid]) {
        for client_ref in refs {
            self.store.apply(StoreAction::PlaceholderDiscarded {
                client_ref: *client_ref,
            });
        }
    }

    async fn consume(
        &mut self,
        mut stream: TurnStream,
        client_ref: Uuid,
        reply_ref: Uuid,
        mut observe: impl FnMut(&TurnEvent),
    ) -> Result<TurnSummary> {
        let mut summary = TurnSummary::default();
        let mut failure = None;
        let mut finished = false;

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            observe(&event);

            match event {
                TurnEvent::Done => {
                    finished = true;
                    break;
                }
                TurnEvent::Error { message } => {
                    failure.get_or_insert(ClientError::Turn(message));
                }
                event => {
                    if let Err(e) = self.apply_turn_event(event, reply_ref, &mut summary) {
                        failure.get_or_insert(e);
                        break;
                    }
                }
            }
        }

        // Placeholders the server never answered.
        self.abandon(&[client_ref, reply_ref]);

        match failure {
            Some(e) => Err(e),
            None if !finished => Err(ClientError::StreamClosed),
            None => Ok(summary),
        }
    }

    /// Fold one record-carrying turn event into the store and `summary`.
    fn apply_turn_event(&mut self, event: TurnEvent, reply_ref: Uuid, summary: &mut TurnSummary) -> Result<()> {
        match event {
            TurnEvent::UserMessage { message } => {
                let message: Message = serde_json::from_value(message)?;
                summary.user_messages.push(message.clone());
                self.store.apply(StoreAction::MessageUpserted(message));
            }
            TurnEvent::Delta { text } => {
                self.store.apply(StoreAction::PlaceholderAppended {
                    client_ref: reply_ref,
                    text,
                });
            }
            TurnEvent::AssistantMessage { message } => {
                let message: Message = serde_json::from_value(message)?;
                if summary.replies.is_empty() {
                    self.store.apply(StoreAction::PlaceholderSettled {
                        client_ref: reply_ref,
                        message: message.clone(),
                    });
                } else {
                    self.store.apply(StoreAction::MessageUpserted(message.clone()));
                }
                summary.replies.push(message);
            }
            TurnEvent::Generation { generation } => {
                summary.generations.push(serde_json::from_value(generation)?);
            }
            TurnEvent::ModelSwitched { to, notice, .. } => {
                self.store.apply(StoreAction::NoticeRaised(notice));
                summary.switched_model = Some(to);
            }
            TurnEvent::Title { chat } => {
                let chat: Chat = serde_json::from_value(chat)?;
                self.store.apply(StoreAction::ChatUpserted(chat));
            }
            TurnEvent::Error { .. } | TurnEvent::Done => {}
        }
        Ok(())
    }

    /// Tear down subscriptions and forget the user.
    pub fn sign_out(&mut self) {
        if let Some(user) = self.user.take() {
            let stopped = self.subscriptions.teardown_owner(user.id);
            tracing::debug!(stopped, "Signed out");
        }
        self.api.set_token(None);
        self.store.apply(StoreAction::Reset);
        while self.events_rx.try_recv().is_ok() {}
    }
}
