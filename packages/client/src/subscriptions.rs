use std::collections::HashMap;

use common::{ChangeEvent, Resource};
use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::{ApiClient, ChangeStream};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub resource: Resource,
    pub owner_id: Uuid,
}

impl SubscriptionKey {
    pub fn new(resource: Resource, owner_id: Uuid) -> Self {
        Self { resource, owner_id }
    }
}

/// One event-stream listener per `(resource, owner)`, forwarding into a
/// single channel. Listeners are aborted on unsubscribe and on drop.
pub struct SubscriptionManager {
    tx: UnboundedSender<ChangeEvent>,
    listeners: HashMap<SubscriptionKey, JoinHandle<()>>,
}

impl SubscriptionManager {
    pub fn new(tx: UnboundedSender<ChangeEvent>) -> Self {
        Self {
            tx,
            listeners: HashMap::new(),
        }
    }

    /// Open the event stream for `key` with `api`'s credentials and start
    /// forwarding it. Returns `Ok(false)` when a listener is already running.
    ///
    /// The stream is open on the server by the time this returns.
    pub async fn subscribe(&mut self, api: &ApiClient, key: SubscriptionKey) -> Result<bool> {
        if self.is_running(key) {
            tracing::debug!(resource = %key.resource, owner_id = %key.owner_id, "Already subscribed");
            return Ok(false);
        }

        let stream = api.events(&[key.resource]).await?;
        let handle = tokio::spawn(forward(stream, key, self.tx.clone()));
        self.listeners.insert(key, handle);
        Ok(true)
    }

    fn is_running(&self, key: SubscriptionKey) -> bool {
        self.listeners
            .get(&key)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn unsubscribe(&mut self, key: SubscriptionKey) -> bool {
        match self.listeners.remove(&key) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Stop every listener belonging to `owner_id`.
    pub fn teardown_owner(&mut self, owner_id: Uuid) -> usize {
        let keys: Vec<_> = self
            .listeners
            .keys()
            .filter(|k| k.owner_id == owner_id)
            .copied()
            .collect();
        for key in &keys {
            self.unsubscribe(*key);
        }
        keys.len()
    }

    pub fn is_subscribed(&self, key: SubscriptionKey) -> bool {
        self.listeners.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        for (_, handle) in self.listeners.drain() {
            handle.abort();
        }
    }
}

async fn forward(mut stream: ChangeStream, key: SubscriptionKey, tx: UnboundedSender<ChangeEvent>) {
    while let Some(event) = stream.next().await {
        match event {
            Ok(event) if event.owner_id == key.owner_id => {
                if tx.send(event).is_err() {
                    return;
                }
            }
            Ok(event) => {
                tracing::debug!(
                    resource = %key.resource,
                    owner_id = %event.owner_id,
                    "Ignoring event for another owner"
                );
            }
            Err(e) => {
                tracing::warn!(resource = %key.resource, error = %e, "Event stream failed");
                return;
            }
        }
    }
    tracing::debug!(resource = %key.resource, "Event stream closed");
}
