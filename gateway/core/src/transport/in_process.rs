//! In-Process Transport
//!
//! Channel-based stand-ins for the device broker and the persistence store.
//! Used when the gateway runs embedded (tests, simulations) without a real
//! broker.
//!
//! # Usage
//!
//! ```ignore
//! let bus = Arc::new(InProcessPubSub::new());
//! let mut published = bus.outbound();
//!
//! let gateway = GatewayBuilder::new(config).pubsub(bus.clone()).build();
//! gateway.start().await;
//!
//! // A device publishes a reading
//! bus.inject(ResourceId::CdaSensorMsg, payload).await;
//!
//! // Observe what the gateway published
//! let (resource, bytes) = published.recv().await?;
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::resource::ResourceId;

use super::traits::{InboundHandler, PersistenceClient, PubSubClient, TransportError};

/// A message published through the in-process bus
pub type Published = (ResourceId, Vec<u8>);

/// In-process pub/sub bus using tokio channels
///
/// Messages injected on a subscribed topic are delivered to the registered
/// inbound handler. Every publish is broadcast to observers obtained from
/// [`InProcessPubSub::outbound`], and also delivered inbound when the topic is
/// subscribed.
pub struct InProcessPubSub {
    handler: RwLock<Option<Arc<dyn InboundHandler>>>,
    subscriptions: RwLock<HashSet<ResourceId>>,
    outbound_tx: broadcast::Sender<Published>,
    connected: AtomicBool,
}

impl InProcessPubSub {
    /// Create a connected bus with the default observer capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Create with custom observer channel capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (outbound_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            handler: RwLock::new(None),
            subscriptions: RwLock::new(HashSet::new()),
            outbound_tx,
            connected: AtomicBool::new(true),
        }
    }

    /// Observe everything published through the bus
    #[must_use]
    pub fn outbound(&self) -> broadcast::Receiver<Published> {
        self.outbound_tx.subscribe()
    }

    /// Whether a topic is currently subscribed
    #[must_use]
    pub fn is_subscribed(&self, resource: ResourceId) -> bool {
        self.subscriptions.read().contains(&resource)
    }

    /// Simulate a device publishing on a topic
    ///
    /// Returns `None` if the topic is not subscribed or no handler is
    /// registered, otherwise the handler's result.
    pub async fn inject(&self, resource: ResourceId, payload: impl Into<Vec<u8>>) -> Option<bool> {
        if !self.is_subscribed(resource) {
            tracing::debug!(resource = %resource, "Dropping message on unsubscribed topic");
            return None;
        }
        let handler = self.handler.read().clone()?;
        let payload = payload.into();
        Some(handler.handle_message(resource.as_str(), &payload).await)
    }

    /// Simulate the broker going away
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Default for InProcessPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubClient for InProcessPubSub {
    async fn publish(&self, resource: ResourceId, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        tracing::debug!(resource = %resource, bytes = payload.len(), "Publishing");

        // No observers is fine
        let _ = self.outbound_tx.send((resource, payload.clone()));

        if self.is_subscribed(resource) {
            let handler = self.handler.read().clone();
            if let Some(handler) = handler {
                handler.handle_message(resource.as_str(), &payload).await;
            }
        }
        Ok(())
    }

    async fn subscribe(&self, resource: ResourceId) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.subscriptions.write().insert(resource);
        tracing::debug!(resource = %resource, "Subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, resource: ResourceId) -> Result<(), TransportError> {
        self.subscriptions.write().remove(&resource);
        tracing::debug!(resource = %resource, "Unsubscribed");
        Ok(())
    }

    fn set_inbound_handler(&self, handler: Arc<dyn InboundHandler>) {
        *self.handler.write() = Some(handler);
    }
}

/// A stored record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    /// Resource the record arrived on
    pub resource: ResourceId,
    /// Raw payload
    pub payload: Vec<u8>,
}

/// Persistence adapter backed by a concurrent in-memory map
#[derive(Default)]
pub struct MemoryPersistence {
    records: DashMap<String, StoredRecord>,
}

impl MemoryPersistence {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fetch a record by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<StoredRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    /// All keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl PersistenceClient for MemoryPersistence {
    async fn store(
        &self,
        key: &str,
        resource: ResourceId,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.records
            .insert(key.to_string(), StoredRecord { resource, payload });
        Ok(())
    }
}
