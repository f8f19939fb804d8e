use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::pending::{PendingKind, PendingOps};
use crate::types::{Chat, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveChat {
    /// Nothing selected; the next message creates a chat.
    #[default]
    New,
    Chat(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Synced,
    /// Optimistic copy waiting for its server record.
    Pending,
    /// Assistant placeholder receiving deltas.
    Streaming,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageEntry {
    pub message: Message,
    pub status: EntryStatus,
}

/// A dismissible user-facing notice.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub id: u64,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Every way the store can change.
#[derive(Debug, Clone)]
pub enum StoreAction {
    ChatsLoaded(Vec<Chat>),
    ChatUpserted(Chat),
    ChatRemoved(Uuid),
    ChatSelected(ActiveChat),
    /// Replace the active chat's messages wholesale.
    MessagesLoaded {
        chat_id: Uuid,
        messages: Vec<Message>,
    },
    MessageUpserted(Message),
    MessageRemoved {
        chat_id: Uuid,
        id: Uuid,
    },
    PlaceholderStarted {
        client_ref: Uuid,
        chat_id: Uuid,
        role: String,
        content: String,
    },
    PlaceholderAppended {
        client_ref: Uuid,
        text: String,
    },
    /// The server record for a placeholder arrived.
    PlaceholderSettled {
        client_ref: Uuid,
        message: Message,
    },
    PlaceholderDiscarded {
        client_ref: Uuid,
    },
    NoticeRaised(String),
    NoticeDismissed(u64),
    Reset,
}

/// Chat list, active chat and its messages, changed only through [`ChatStore::apply`].
#[derive(Debug, Default)]
pub struct ChatStore {
    chats: Vec<Chat>,
    active: ActiveChat,
    messages: Vec<MessageEntry>,
    notices: Vec<Notice>,
    pending: PendingOps,
    next_notice: u64,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chats, most recently updated first.
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn chat(&self, id: Uuid) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    pub fn active(&self) -> ActiveChat {
        self.active
    }

    pub fn active_chat_id(&self) -> Option<Uuid> {
        match self.active {
            ActiveChat::Chat(id) => Some(id),
            ActiveChat::New => None,
        }
    }

    pub fn messages(&self) -> &[MessageEntry] {
        &self.messages
    }

    pub fn message(&self, id: Uuid) -> Option<&MessageEntry> {
        self.messages.iter().find(|e| e.message.id == id)
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn pending(&self) -> &PendingOps {
        &self.pending
    }

    pub fn apply(&mut self, action: StoreAction) {
        match action {
            StoreAction::ChatsLoaded(chats) => {
                self.chats = chats;
                self.sort_chats();
            }
            StoreAction::ChatUpserted(chat) => {
                match self.chats.iter_mut().find(|c| c.id == chat.id) {
                    Some(existing) => *existing = chat,
                    None => self.chats.push(chat),
                }
                self.sort_chats();
            }
            StoreAction::ChatRemoved(id) => self.remove_chat(id),
            StoreAction::ChatSelected(active) => {
                self.active = active;
                self.messages.clear();
            }
            StoreAction::MessagesLoaded { chat_id, messages } => {
                if self.active != ActiveChat::Chat(chat_id) {
                    return;
                }
                self.pending.clear_chat(chat_id);
                self.messages = messages
                    .into_iter()
                    .map(|message| MessageEntry {
                        message,
                        status: EntryStatus::Synced,
                    })
                    .collect();
            }
            StoreAction::MessageUpserted(message) => self.upsert_message(message),
            StoreAction::MessageRemoved { chat_id, id } => {
                if self.active == ActiveChat::Chat(chat_id) {
                    self.messages.retain(|e| e.message.id != id);
                }
            }
            StoreAction::PlaceholderStarted {
                client_ref,
                chat_id,
                role,
                content,
            } => self.start_placeholder(client_ref, chat_id, role, content),
            StoreAction::PlaceholderAppended { client_ref, text } => {
                if let Some(entry) = self.open_placeholder_mut(client_ref) {
                    entry.message.content.push_str(&text);
                }
            }
            StoreAction::PlaceholderSettled {
                client_ref,
                message,
            } => self.settle_placeholder(client_ref, message),
            StoreAction::PlaceholderDiscarded { client_ref } => {
                if self.pending.is_open(client_ref) {
                    self.messages.retain(|e| e.message.id != client_ref);
                }
                self.pending.remove(client_ref);
            }
            StoreAction::NoticeRaised(message) => {
                self.next_notice += 1;
                self.notices.push(Notice {
                    id: self.next_notice,
                    message,
                    raised_at: Utc::now(),
                });
            }
            StoreAction::NoticeDismissed(id) => self.notices.retain(|n| n.id != id),
            StoreAction::Reset => *self = Self::default(),
        }
    }

    fn sort_chats(&mut self) {
        self.chats.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });
    }

    fn remove_chat(&mut self, id: Uuid) {
        self.chats.retain(|c| c.id != id);
        self.pending.clear_chat(id);
        if self.active == ActiveChat::Chat(id) {
            self.active = self
                .chats
                .first()
                .map_or(ActiveChat::New, |c| ActiveChat::Chat(c.id));
            self.messages.clear();
        }
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.messages.iter().position(|e| e.message.id == id)
    }

    fn open_placeholder(&self, client_ref: Uuid) -> Option<usize> {
        if self.pending.is_open(client_ref) {
            self.position(client_ref)
        } else {
            None
        }
    }

    fn open_placeholder_mut(&mut self, client_ref: Uuid) -> Option<&mut MessageEntry> {
        let idx = self.open_placeholder(client_ref)?;
        self.messages.get_mut(idx)
    }

    fn upsert_message(&mut self, message: Message) {
        if self.active != ActiveChat::Chat(message.chat_id) {
            return;
        }
        let synced = |message| MessageEntry {
            message,
            status: EntryStatus::Synced,
        };

        if let Some(idx) = self.position(message.id) {
            self.messages[idx] = synced(message);
            return;
        }
        if let Some(client_ref) = message.client_ref()
            && let Some(idx) = self.open_placeholder(client_ref)
        {
            self.pending.resolve(client_ref, message.id);
            self.messages[idx] = synced(message);
            return;
        }
        self.messages.push(synced(message));
    }

    fn start_placeholder(&mut self, client_ref: Uuid, chat_id: Uuid, role: String, content: String) {
        if self.active != ActiveChat::Chat(chat_id) {
            return;
        }
        let kind = if role == "assistant" {
            PendingKind::Reply
        } else {
            PendingKind::UserMessage
        };
        let status = match kind {
            PendingKind::Reply => EntryStatus::Streaming,
            PendingKind::UserMessage => EntryStatus::Pending,
        };
        self.pending.begin(client_ref, kind, chat_id);
        self.messages.push(MessageEntry {
            message: Message {
                id: client_ref,
                chat_id,
                role,
                content,
                content_type: "text".into(),
                metadata: json!({ "client_ref": client_ref }),
                created_at: Utc::now(),
            },
            status,
        });
    }

    fn settle_placeholder(&mut self, client_ref: Uuid, message: Message) {
        let placeholder = self.open_placeholder(client_ref);
        self.pending.resolve(client_ref, message.id);
        if self.active != ActiveChat::Chat(message.chat_id) {
            return;
        }

        let entry = MessageEntry {
            message,
            status: EntryStatus::Synced,
        };
        match (placeholder, self.position(entry.message.id)) {
            (Some(p), Some(existing)) => {
                self.messages[existing] = entry;
                self.messages.remove(p);
            }
            (Some(p), None) => self.messages[p] = entry,
            (None, Some(existing)) => self.messages[existing] = entry,
            (None, None) => self.messages.push(entry),
        }
    }
}
