use std::collections::HashMap;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// Optimistic copy of a message the user sent.
    UserMessage,
    /// Assistant reply being streamed in.
    Reply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOp {
    pub kind: PendingKind,
    pub chat_id: Uuid,
    /// Set once the server record arrives.
    pub server_id: Option<Uuid>,
}

/// Client correlation id to server id, for optimistic entries.
#[derive(Debug, Default)]
pub struct PendingOps {
    ops: HashMap<Uuid, PendingOp>,
}

impl PendingOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, client_ref: Uuid, kind: PendingKind, chat_id: Uuid) {
        self.ops.insert(
            client_ref,
            PendingOp {
                kind,
                chat_id,
                server_id: None,
            },
        );
    }

    /// Record the server id; `false` if `client_ref` is unknown or already resolved.
    pub fn resolve(&mut self, client_ref: Uuid, server_id: Uuid) -> bool {
        match self.ops.get_mut(&client_ref) {
            Some(op) if op.server_id.is_none() => {
                op.server_id = Some(server_id);
                true
            }
            _ => false,
        }
    }

    /// Whether `client_ref` still waits for its server record.
    pub fn is_open(&self, client_ref: Uuid) -> bool {
        self.ops
            .get(&client_ref)
            .is_some_and(|op| op.server_id.is_none())
    }

    pub fn server_id(&self, client_ref: Uuid) -> Option<Uuid> {
        self.ops.get(&client_ref).and_then(|op| op.server_id)
    }

    pub fn remove(&mut self, client_ref: Uuid) -> Option<PendingOp> {
        self.ops.remove(&client_ref)
    }

    /// Drop every entry belonging to `chat_id`.
    pub fn clear_chat(&mut self, chat_id: Uuid) {
        self.ops.retain(|_, op| op.chat_id != chat_id);
    }

    pub fn open_count(&self) -> usize {
        self.ops.values().filter(|op| op.server_id.is_none()).count()
    }
}
