//! Transport Layer
//!
//! Collaborator traits and the in-process implementations.

pub mod in_process;
pub mod traits;

pub use in_process::{InProcessPubSub, MemoryPersistence, Published, StoredRecord};
pub use traits::{
    ActuatorDataListener, InboundHandler, InboundMessage, PersistenceClient, PubSubClient,
    TransportError, UpstreamClient,
};
