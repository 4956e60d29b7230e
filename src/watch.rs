//! Change notifications for collection keys.
//!
//! Store backends publish a [`WatchEvent`] after every write or removal. A
//! presentation layer subscribes to a collection key (or a `prefix*`
//! pattern) and refreshes its list when an event arrives, instead of polling.

use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// The key did not exist before the write.
    Created,
    Updated,
    Deleted,
}

/// One change to one key. Values are the raw stored JSON text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub key: String,
    pub event_type: EventType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl WatchEvent {
    pub fn created(key: impl Into<String>, value: String) -> Self {
        Self {
            key: key.into(),
            event_type: EventType::Created,
            old_value: None,
            new_value: Some(value),
        }
    }

    pub fn updated(key: impl Into<String>, old_value: String, new_value: String) -> Self {
        Self {
            key: key.into(),
            event_type: EventType::Updated,
            old_value: Some(old_value),
            new_value: Some(new_value),
        }
    }

    pub fn deleted(key: impl Into<String>, old_value: String) -> Self {
        Self {
            key: key.into(),
            event_type: EventType::Deleted,
            old_value: Some(old_value),
            new_value: None,
        }
    }

    /// Event for a write that replaced `previous` (if any) with `value`.
    pub fn for_write(key: impl Into<String>, previous: Option<String>, value: String) -> Self {
        match previous {
            Some(old) => Self::updated(key, old, value),
            None => Self::created(key, value),
        }
    }
}

/// Events for keys matching one pattern: an exact key, or a prefix ending in `*`.
///
/// A subscriber that falls too far behind loses the oldest events; the loss
/// is logged and the stream carries on with the newest ones.
pub struct WatchStream {
    inner: BroadcastStream<WatchEvent>,
    pattern: String,
}

impl WatchStream {
    fn new(receiver: broadcast::Receiver<WatchEvent>, pattern: String) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            pattern,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn matches(&self, key: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == self.pattern,
        }
    }

    /// Next matching event, or `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.next().await
    }
}

impl Stream for WatchStream {
    type Item = WatchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<WatchEvent>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(event)) if self.matches(&event.key) => return Poll::Ready(Some(event)),
                Some(Ok(_)) => {}
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(pattern = %self.pattern, skipped, "watch subscriber lagged");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

/// Publishing side, owned by a store backend.
#[derive(Clone)]
pub struct WatchSender {
    sender: broadcast::Sender<WatchEvent>,
}

impl WatchSender {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn send(&self, event: WatchEvent) {
        // Err only means nobody is subscribed.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self, pattern: &str) -> WatchStream {
        WatchStream::new(self.sender.subscribe(), pattern.to_string())
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for WatchSender {
    fn default() -> Self {
        Self::new(256)
    }
}
