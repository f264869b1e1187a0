//! Store change notifications.
//!
//! Events fan out over a `tokio::sync::broadcast` channel. Emitting with no
//! subscribers is not an error, and a subscriber that falls behind sees
//! `RecvError::Lagged` instead of blocking writers.

use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Something that happened to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A write landed at `key` (resolved).
    Changed { key: String },
    /// The whole tree was replaced.
    Reset,
    /// A load completed and its body was written.
    Fetched { key: String, status: u16 },
    /// The store was destroyed.
    Destroyed,
}

#[derive(Debug)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_silent() {
        EventBus::new().emit(StoreEvent::Reset);
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(StoreEvent::Changed { key: "a".into() });
        bus.emit(StoreEvent::Destroyed);
        assert_eq!(rx.recv().await.unwrap(), StoreEvent::Changed { key: "a".into() });
        assert_eq!(rx.recv().await.unwrap(), StoreEvent::Destroyed);
    }
}
