use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use common::{ChangeEvent, ChangeKind, Resource};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

/// Fan-out of [`ChangeEvent`]s to every open `/events` stream.
///
/// Bounded: a listener that falls more than `capacity` events behind loses
/// the oldest ones.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<ChangeEvent>,
    keepalive: Duration,
}

impl EventHub {
    pub fn new(capacity: usize, keepalive: Duration) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx, keepalive }
    }

    /// Broadcast to current listeners. Having none is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        tracing::debug!(
            resource = %event.resource,
            kind = ?event.kind,
            owner_id = %event.owner_id,
            "change event"
        );
        let _ = self.tx.send(event);
    }

    pub fn emit(
        &self,
        resource: Resource,
        kind: ChangeKind,
        owner_id: Uuid,
        chat_id: Option<Uuid>,
        record: &impl Serialize,
    ) {
        let mut event = ChangeEvent::new(resource, kind, owner_id, record);
        event.chat_id = chat_id;
        self.publish(event);
    }

    /// Events owned by `owner_id` for the given resources; lagged gaps are skipped.
    pub fn subscribe(
        &self,
        owner_id: Uuid,
        resources: Vec<Resource>,
    ) -> impl Stream<Item = ChangeEvent> + Send + 'static + use<> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |res| {
            let keep = res
                .ok()
                .filter(|e| e.owner_id == owner_id && resources.contains(&e.resource));
            async move { keep }
        })
    }

    /// SSE response with `event: <resource>` frames and periodic keepalives.
    pub fn sse_response(
        &self,
        owner_id: Uuid,
        resources: Vec<Resource>,
    ) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
        let stream = self.subscribe(owner_id, resources).map(|event| {
            let ev = Event::default()
                .event(event.resource.as_str())
                .json_data(&event)
                .unwrap_or_else(|_| {
                    Event::default()
                        .event(event.resource.as_str())
                        .data("serialization_error")
                });
            Ok(ev)
        });
        Sse::new(stream).keep_alive(KeepAlive::new().interval(self.keepalive).text("keepalive"))
    }

    /// Interval between keepalive comments on SSE responses.
    pub fn keepalive(&self) -> Duration {
        self.keepalive
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
