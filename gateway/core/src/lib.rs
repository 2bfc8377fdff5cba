//! Gateway Core - Message Dispatch and Stateful Control for an Edge Gateway
//!
//! This crate sits between constrained devices, a cloud upstream and a
//! conversational assistant service. Every inbound message is classified by
//! resource, decoded, and handed to the component that owns it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                 Collaborators (trait objects)                    │
//! │  ┌──────────┐  ┌─────────────┐  ┌──────────┐  ┌───────────────┐  │
//! │  │  PubSub  │  │ Persistence │  │ Upstream │  │   Assistant   │  │
//! │  │ (devices)│  │             │  │ (cloud)  │  │  HTTP service │  │
//! │  └────┬─────┘  └──────▲──────┘  └────▲─────┘  └───────┬───────┘  │
//! └───────┼───────────────┼──────────────┼────────────────┼──────────┘
//!         │ (resource, payload)          │                │ replies
//! ┌───────┼───────────────┼──────────────┼────────────────┼──────────┐
//! │       ▼               │  GATEWAY CORE│                ▼          │
//! │  ┌─────────────────────────────────────────────────────────────┐ │
//! │  │                      MessageRouter                          │ │
//! │  └──────┬───────────────────────┬───────────────────────┬──────┘ │
//! │         ▼                       ▼                       ▼        │
//! │  ┌──────────────┐      ┌──────────────────┐   ┌───────────────┐  │
//! │  │Environmental │      │   Conversation   │   │  System Perf  │  │
//! │  │  Controller  │      │     Manager      │   │    Manager    │  │
//! │  └──────┬───────┘      └────────┬─────────┘   └───────────────┘  │
//! │         └──────────┬────────────┘                                │
//! │                    ▼                                             │
//! │          ┌───────────────────┐                                   │
//! │          │ActuatorDispatcher │── local listener / pub/sub        │
//! │          └───────────────────┘                                   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use gateway_core::{config, GatewayBuilder, InProcessPubSub};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_config()?;
//!     let bus = Arc::new(InProcessPubSub::new());
//!
//!     let (builder, replies) = GatewayBuilder::new(config)
//!         .pubsub(bus.clone())
//!         .http_assistant()?;
//!     let gateway = builder.build();
//!     gateway.spawn_inbound_pump(replies);
//!     gateway.start().await;
//!
//!     // devices publish into `bus`; commands come back out of `bus.outbound()`
//!     tokio::signal::ctrl_c().await?;
//!     gateway.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`resource`]: Resource names and payload kinds
//! - [`data`]: Sensor, actuator and system performance records
//! - [`messages`]: Assistant conversation messages and content blocks
//! - [`codec`]: JSON decoding and encoding of every payload
//! - [`config`]: TOML and environment configuration
//! - [`transport`]: Collaborator traits and in-process implementations
//! - [`backend`]: Assistant service client
//! - [`dispatcher`]: Actuator command dispatch
//! - [`controller`]: Humidity hysteresis controller
//! - [`session`]: Conversation history and tool-use protocol
//! - [`conversation`]: Speech-driven assistant conversation
//! - [`router`]: Resource-based message routing
//! - [`telemetry`]: Host performance polling
//! - [`gateway`]: Composition root and lifecycle

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod codec;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod data;
pub mod dispatcher;
pub mod gateway;
pub mod messages;
pub mod resource;
pub mod router;
pub mod session;
pub mod telemetry;
pub mod transport;

// Re-exports for convenience
pub use backend::{AssistantBackend, HttpAssistantClient, ToolExecutor};
pub use codec::{BackendReply, CodecError, FilteredToolResult};
pub use controller::{ControllerPhase, ControllerState, EnvironmentalController};
pub use conversation::{ConversationManager, SubmitOutcome};
pub use data::{ActuatorCommand, ActuatorData, SensorData, SpeechResult, SystemPerformanceData};
pub use dispatcher::{ActuatorDispatcher, DispatchOutcome, ObservableActuatorResource};
pub use gateway::{Gateway, GatewayBuilder};
pub use messages::{CompletionRequest, ContentBlock, ConversationMessage, Role, ToolResultText};
pub use resource::{PayloadKind, ResourceId, UnknownResource};
pub use router::{MessageRouter, RouteOutcome};
pub use session::{ConversationSession, ProtocolViolation, SessionId};
pub use telemetry::{MetricsSample, SysinfoMetrics, SystemMetricsSource, SystemPerformanceManager};
pub use transport::{
    ActuatorDataListener, InProcessPubSub, InboundHandler, InboundMessage, MemoryPersistence,
    PersistenceClient, PubSubClient, TransportError, UpstreamClient,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigSource,
    GatewayConfig, GatewayToml,
};
