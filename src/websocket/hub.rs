//! WebSocket Connection Hub
//!
//! Owns the table of live connections and the subscription registry, and
//! fans published payloads out to every subscriber of a topic.

use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Notify, RwLock};
use uuid::Uuid;

use super::messages::ServerFrame;
use super::registry::SubscriptionRegistry;

/// Unique identifier for a WebSocket connection
pub type ConnectionId = Uuid;

/// Manages all WebSocket connections and subscriptions
pub struct ConnectionHub {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    /// Topic subscriptions
    registry: SubscriptionRegistry,
    /// Flipped to true once on server shutdown
    shutdown_tx: watch::Sender<bool>,
    /// Signalled whenever a connection is unregistered
    drained: Notify,
}

/// Handle for sending frames to a specific connection
pub struct ConnectionHandle {
    /// Channel sender drained by the connection's writer task
    pub sender: mpsc::UnboundedSender<ServerFrame>,
    /// Remote peer, when known
    pub peer: Option<SocketAddr>,
}

/// Outcome of a single publish call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub topic: String,
    /// Connections the payload was queued for
    pub delivered: usize,
    /// Connections whose outbound channel was already closed
    pub failed: usize,
}

impl ConnectionHub {
    /// Create a new connection hub
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            connections: RwLock::new(HashMap::new()),
            registry: SubscriptionRegistry::new(),
            shutdown_tx,
            drained: Notify::new(),
        }
    }

    /// Register a new WebSocket connection
    ///
    /// Fails once the hub is shutting down.
    pub async fn register(
        &self,
        sender: mpsc::UnboundedSender<ServerFrame>,
        peer: Option<SocketAddr>,
    ) -> Result<ConnectionId, HubError> {
        let mut connections = self.connections.write().await;
        if self.is_shutting_down() {
            return Err(HubError::ShuttingDown);
        }

        let id = Uuid::new_v4();
        connections.insert(id, ConnectionHandle { sender, peer });

        tracing::info!(
            connection_id = %id,
            peer = ?peer,
            connections = connections.len(),
            "WebSocket connected"
        );
        Ok(id)
    }

    /// Unregister a connection and clean up its subscriptions
    ///
    /// Dropping the handle closes the connection's outbound channel, which
    /// lets its writer task flush and close the socket.
    pub async fn unregister(&self, id: ConnectionId) {
        let handle = self.connections.write().await.remove(&id);
        let topics = self.registry.remove_connection(id).await;

        if let Some(handle) = handle {
            tracing::info!(
                connection_id = %id,
                peer = ?handle.peer,
                topics = ?topics,
                "WebSocket disconnected"
            );
        }

        self.drained.notify_one();
    }

    /// Subscribe a connection to a topic
    ///
    /// Returns false if it was already subscribed or is not registered.
    pub async fn subscribe(&self, id: ConnectionId, topic: &str) -> bool {
        // Held across the registry update so unregister cannot interleave
        let connections = self.connections.read().await;
        if !connections.contains_key(&id) {
            tracing::debug!(
                connection_id = %id,
                topic = %topic,
                "Ignoring subscribe for unknown connection"
            );
            return false;
        }

        let added = self.registry.subscribe(topic, id).await;
        drop(connections);

        tracing::debug!(
            connection_id = %id,
            topic = %topic,
            new = added,
            "Subscribed to topic"
        );

        added
    }

    /// Unsubscribe a connection from a topic. Unknown pairs are a no-op.
    pub async fn unsubscribe(&self, id: ConnectionId, topic: &str) -> bool {
        let removed = self.registry.unsubscribe(topic, id).await;

        tracing::debug!(
            connection_id = %id,
            topic = %topic,
            removed,
            "Unsubscribed from topic"
        );

        removed
    }

    /// Deliver a payload to every current subscriber of a topic
    ///
    /// Delivery is best effort: a closed connection is logged and skipped
    /// without affecting the others. Frames are queued before this returns,
    /// so sequential publishes reach each subscriber in order.
    pub async fn publish(&self, topic: &str, payload: impl Into<String>) -> PublishReport {
        let mut report = PublishReport {
            topic: topic.to_string(),
            ..Default::default()
        };

        let subscribers = self.registry.snapshot(topic).await;
        if subscribers.is_empty() {
            tracing::trace!(topic = %topic, "Publish with no subscribers");
            return report;
        }

        let payload = payload.into();
        let connections = self.connections.read().await;

        for id in subscribers {
            // Disconnected between snapshot and delivery
            let Some(handle) = connections.get(&id) else {
                continue;
            };

            match handle.sender.send(ServerFrame::Broadcast(payload.clone())) {
                Ok(()) => report.delivered += 1,
                Err(_) => {
                    report.failed += 1;
                    tracing::warn!(
                        connection_id = %id,
                        topic = %topic,
                        "Broadcast failed, connection closed"
                    );
                }
            }
        }

        tracing::trace!(
            topic = %topic,
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast payload"
        );

        report
    }

    /// Signal every connection handler to close
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        tracing::info!("Connection hub shutting down");
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Receiver that flips to true when [`ConnectionHub::shutdown`] is called
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Resolves once shutdown has been signalled
    pub async fn closing(&self) {
        let mut signal = self.shutdown_signal();
        let _ = signal.wait_for(|closing| *closing).await;
    }

    /// Wait until no connections remain registered
    pub async fn drained(&self) {
        loop {
            if self.connection_count().await == 0 {
                return;
            }
            self.drained.notified().await;
        }
    }

    /// Forcefully unregister every remaining connection
    pub async fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.connections.read().await.keys().copied().collect();
        for id in ids {
            self.unregister(id).await;
        }
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Get the number of topics with at least one subscriber
    pub async fn topic_count(&self) -> usize {
        self.registry.topic_count().await
    }

    /// Get subscription count for a topic
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.registry.subscriber_count(topic).await
    }

    /// Live topics with their subscriber counts
    pub async fn topics(&self) -> Vec<(String, usize)> {
        self.registry.topics().await
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Server is shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    async fn connect(hub: &ConnectionHub) -> (ConnectionId, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = hub.register(tx, None).await.unwrap();
        (id, rx)
    }

    fn broadcast(payload: &str) -> ServerFrame {
        ServerFrame::Broadcast(payload.to_string())
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let hub = ConnectionHub::new();
        let (id, _rx) = connect(&hub).await;
        assert_eq!(hub.connection_count().await, 1);

        hub.unregister(id).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let hub = ConnectionHub::new();
        let (_id, mut rx) = connect(&hub).await;

        let report = hub.publish("BTC-PERP", "X").await;
        assert_eq!(report.delivered, 0);
        assert_eq!(report.failed, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_subscribers_only() {
        let hub = ConnectionHub::new();
        let (a, mut rx_a) = connect(&hub).await;
        let (b, mut rx_b) = connect(&hub).await;
        let (c, mut rx_c) = connect(&hub).await;

        hub.subscribe(a, "ETH-PERP").await;
        hub.subscribe(b, "ETH-PERP").await;
        hub.subscribe(c, "BTC-PERP").await;

        let report = hub.publish("ETH-PERP", "Y").await;
        assert_eq!(report.delivered, 2);

        assert_eq!(rx_a.try_recv().unwrap(), broadcast("Y"));
        assert_eq!(rx_b.try_recv().unwrap(), broadcast("Y"));
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_subscription_delivers_once() {
        let hub = ConnectionHub::new();
        let (id, mut rx) = connect(&hub).await;

        assert!(hub.subscribe(id, "BTC-PERP").await);
        assert!(!hub.subscribe(id, "BTC-PERP").await);

        hub.publish("BTC-PERP", "book").await;
        assert_eq!(rx.try_recv().unwrap(), broadcast("book"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_subscriber_does_not_block_others() {
        let hub = ConnectionHub::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (id, rx) = connect(&hub).await;
            hub.subscribe(id, "ETH-PERP").await;
            receivers.push(rx);
        }

        // Writer for the first connection has gone away
        drop(receivers.remove(0));

        let report = hub.publish("ETH-PERP", "Y").await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        for rx in receivers.iter_mut() {
            assert_eq!(rx.try_recv().unwrap(), broadcast("Y"));
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let hub = ConnectionHub::new();
        let (id, mut rx) = connect(&hub).await;

        hub.subscribe(id, "BTC-PERP").await;
        assert!(hub.unsubscribe(id, "BTC-PERP").await);
        assert!(!hub.unsubscribe(id, "BTC-PERP").await);

        hub.publish("BTC-PERP", "X").await;
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.topic_count().await, 0);
    }

    #[tokio::test]
    async fn test_unregister_removes_subscriptions() {
        let hub = ConnectionHub::new();
        let (id, _rx) = connect(&hub).await;

        hub.subscribe(id, "BTC-PERP").await;
        hub.subscribe(id, "ETH-PERP").await;
        hub.unregister(id).await;

        assert_eq!(hub.topic_count().await, 0);
        let report = hub.publish("BTC-PERP", "X").await;
        assert_eq!(report, PublishReport {
            topic: "BTC-PERP".to_string(),
            delivered: 0,
            failed: 0,
        });

        // Repeated cleanup is harmless
        hub.unregister(id).await;
    }

    #[tokio::test]
    async fn test_sequential_publishes_keep_order() {
        let hub = ConnectionHub::new();
        let (id, mut rx) = connect(&hub).await;
        hub.subscribe(id, "BTC-PERP").await;

        for i in 0..100 {
            hub.publish("BTC-PERP", i.to_string()).await;
        }
        for i in 0..100 {
            assert_eq!(rx.try_recv().unwrap(), broadcast(&i.to_string()));
        }
    }

    #[tokio::test]
    async fn test_subscribe_after_unregister_is_ignored() {
        let hub = ConnectionHub::new();
        let (id, _rx) = connect(&hub).await;
        hub.unregister(id).await;

        assert!(!hub.subscribe(id, "BTC-PERP").await);
        assert!(!hub.subscribe(Uuid::new_v4(), "ETH-PERP").await);

        assert_eq!(hub.topic_count().await, 0);
        assert!(hub.topics().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_subscribe_racing_unregister_leaves_no_entries() {
        let hub = Arc::new(ConnectionHub::new());

        for _ in 0..50 {
            let (id, _rx) = connect(&hub).await;
            let subscriber = {
                let hub = Arc::clone(&hub);
                tokio::spawn(async move { hub.subscribe(id, "BTC-PERP").await })
            };
            hub.unregister(id).await;
            subscriber.await.unwrap();
        }

        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(hub.topic_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_rejected_after_shutdown() {
        let hub = ConnectionHub::new();
        let mut signal = hub.shutdown_signal();
        hub.shutdown();

        assert!(*signal.borrow_and_update());
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            hub.register(tx, None).await,
            Err(HubError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_drained_waits_for_unregister() {
        let hub = Arc::new(ConnectionHub::new());
        let (id, _rx) = connect(&hub).await;

        let waiter = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.drained().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        hub.unregister(id).await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_all() {
        let hub = ConnectionHub::new();
        let (a, mut rx_a) = connect(&hub).await;
        let (b, _rx_b) = connect(&hub).await;
        hub.subscribe(a, "BTC-PERP").await;
        hub.subscribe(b, "ETH-PERP").await;

        hub.close_all().await;

        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(hub.topic_count().await, 0);
        // Outbound channel closed once the handle is dropped
        assert!(rx_a.recv().await.is_none());
    }
}
