//! Collaborator Traits
//!
//! The gateway core talks to the outside world only through these traits.
//! Each transport has an inbound registration point (where the router is
//! plugged in) and an outbound send.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::data::ActuatorData;
use crate::resource::ResourceId;

/// Errors that can occur during transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    /// Transport is not connected or has been shut down
    #[error("Transport not connected")]
    NotConnected,

    /// Failed to send message
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// A raw message delivered by any transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Resource identifier as received (topic, URI path)
    pub resource: String,
    /// Raw payload
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Create an inbound message
    pub fn new(resource: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            resource: resource.into(),
            payload: payload.into(),
        }
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.resource, self.payload.len())
    }
}

/// Receiver of inbound messages
///
/// Transports hold an `Arc<dyn InboundHandler>` and call it for every message
/// they receive. The return value is the boolean success view of handling.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Handle one message
    async fn handle_message(&self, resource: &str, payload: &[u8]) -> bool;
}

/// Publish/subscribe client (device-facing broker)
#[async_trait]
pub trait PubSubClient: Send + Sync {
    /// Publish a payload on a topic
    async fn publish(&self, resource: ResourceId, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Start receiving messages on a topic
    async fn subscribe(&self, resource: ResourceId) -> Result<(), TransportError>;

    /// Stop receiving messages on a topic
    async fn unsubscribe(&self, resource: ResourceId) -> Result<(), TransportError>;

    /// Register where received messages are delivered
    fn set_inbound_handler(&self, handler: Arc<dyn InboundHandler>);
}

/// Persistence adapter for raw records
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    /// Store a record under `key`
    async fn store(
        &self,
        key: &str,
        resource: ResourceId,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;
}

/// Upstream (cloud) client
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Forward a record upstream
    async fn send(&self, resource: ResourceId, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// Local in-process consumer of actuator commands
pub trait ActuatorDataListener: Send + Sync {
    /// Receive a command; returns whether it was accepted
    fn on_actuator_command(&self, data: &ActuatorData) -> bool;
}
