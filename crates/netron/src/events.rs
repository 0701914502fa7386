//! Subscription-based event bus.
//!
//! No global emitter: `subscribe` hands back a [`Subscription`] that
//! receives payloads and unsubscribes itself on drop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use netron_core::Value;

pub const EVENT_CONTEXT_ATTACH: &str = "context:attach";
pub const EVENT_CONTEXT_DETACH: &str = "context:detach";
pub const EVENT_PEER_CONNECT: &str = "peer:connect";
pub const EVENT_PEER_DISCONNECT: &str = "peer:disconnect";

type Listeners = HashMap<String, HashMap<u64, mpsc::UnboundedSender<Value>>>;

#[derive(Default)]
struct BusInner {
    listeners: Mutex<Listeners>,
    next_id: AtomicU64,
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event: &str) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .listeners
            .lock()
            .entry(event.to_string())
            .or_default()
            .insert(id, tx);
        Subscription {
            bus: Arc::downgrade(&self.inner),
            event: event.to_string(),
            id,
            rx,
        }
    }

    pub fn emit(&self, event: &str, payload: Value) {
        let mut listeners = self.inner.listeners.lock();
        if let Some(subs) = listeners.get_mut(event) {
            subs.retain(|_, tx| tx.send(payload.clone()).is_ok());
            if subs.is_empty() {
                listeners.remove(event);
            }
        }
    }
}

/// Live handle on one subscription. Dropping it detaches the listener.
pub struct Subscription {
    bus: Weak<BusInner>,
    event: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Next payload, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            let mut listeners = bus.listeners.lock();
            if let Some(subs) = listeners.get_mut(&self.event) {
                subs.remove(&self.id);
                if subs.is_empty() {
                    listeners.remove(&self.event);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("ping");
        bus.emit("ping", Value::from(1));
        assert_eq!(sub.recv().await, Some(Value::from(1)));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe("ping");
        drop(sub);
        // No listeners left for the event.
        assert!(bus.inner.listeners.lock().get("ping").is_none());
    }

    #[tokio::test]
    async fn test_events_are_isolated() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("a");
        let _b = bus.subscribe("b");
        bus.emit("b", Value::Null);
        assert!(a.try_recv().is_none());
    }
}
