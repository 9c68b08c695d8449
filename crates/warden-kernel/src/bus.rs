//! A keyed publish/subscribe bus over `tokio::sync::broadcast`.
//!
//! Two shapes in the runtime need this: a singleton stream of permission
//! events (callers subscribe to the one key `"permissions"`) and one stream
//! per queue item (callers subscribe to that item's id, and the channel is
//! torn down a few seconds after a terminal event goes out). Both are the
//! same "keyed broadcast channel, created on first subscribe" shape, so one
//! generic type covers both.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

const DEFAULT_CAPACITY: usize = 256;

/// A pub/sub bus keyed by `K`, broadcasting values of type `V` to every
/// current subscriber of a key. Subscribing to a key that has no current
/// publisher creates its channel lazily; publishing to a key nobody has
/// subscribed to is a no-op (the send simply has zero receivers).
pub struct EventBus<K, V> {
    channels: Arc<RwLock<HashMap<K, broadcast::Sender<V>>>>,
    capacity: usize,
}

impl<K, V> Clone for EventBus<K, V> {
    fn clone(&self) -> Self {
        Self {
            channels: self.channels.clone(),
            capacity: self.capacity,
        }
    }
}

impl<K, V> Default for EventBus<K, V>
where
    K: std::hash::Hash + Eq,
{
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<K, V> EventBus<K, V>
where
    K: std::hash::Hash + Eq,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }
}

impl<K, V> EventBus<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    /// Subscribe to `key`, creating its channel if this is the first subscriber.
    pub async fn subscribe(&self, key: K) -> broadcast::Receiver<V> {
        let mut channels = self.channels.write().await;
        channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish `value` to every current subscriber of `key`, creating the
    /// channel first if nothing has subscribed yet. Returns the number of
    /// receivers the value was sent to (0 if nobody is currently listening).
    pub async fn publish(&self, key: &K, value: V) -> usize {
        let mut channels = self.channels.write().await;
        let tx = channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        tx.send(value).unwrap_or(0)
    }

    /// Drop a key's channel entirely, disconnecting any lingering subscribers.
    /// Called a few seconds after a terminal event so late subscribers still
    /// see it before the channel disappears.
    pub async fn remove(&self, key: &K) {
        self.channels.write().await.remove(key);
    }

    pub async fn has_subscribers(&self, key: &K) -> bool {
        self.channels
            .read()
            .await
            .get(key)
            .map(|tx| tx.receiver_count() > 0)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus: EventBus<String, i32> = EventBus::default();
        let mut rx = bus.subscribe("a".to_string()).await;
        let sent = bus.publish(&"a".to_string(), 42).await;
        assert_eq!(sent, 1);
        assert_eq!(rx.recv().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn publish_with_no_subscriber_is_noop() {
        let bus: EventBus<String, i32> = EventBus::default();
        let sent = bus.publish(&"missing".to_string(), 1).await;
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn remove_drops_channel() {
        let bus: EventBus<String, i32> = EventBus::default();
        let _rx = bus.subscribe("a".to_string()).await;
        assert!(bus.has_subscribers(&"a".to_string()).await);
        bus.remove(&"a".to_string()).await;
        assert!(!bus.has_subscribers(&"a".to_string()).await);
    }

    #[tokio::test]
    async fn independent_keys_do_not_cross_talk() {
        let bus: EventBus<String, i32> = EventBus::default();
        let mut rx_a = bus.subscribe("a".to_string()).await;
        let mut rx_b = bus.subscribe("b".to_string()).await;
        bus.publish(&"a".to_string(), 1).await;
        bus.publish(&"b".to_string(), 2).await;
        assert_eq!(rx_a.recv().await.unwrap(), 1);
        assert_eq!(rx_b.recv().await.unwrap(), 2);
    }
}
