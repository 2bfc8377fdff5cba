//! Assistant Backend Integration
//!
//! Access to the conversational assistant service through a trait interface.
//!
//! # Usage
//!
//! ```ignore
//! use gateway_core::backend::{AssistantBackend, HttpAssistantClient};
//!
//! let (reply_tx, reply_rx) = tokio::sync::mpsc::channel(32);
//! let client = HttpAssistantClient::new(&config.assistant, reply_tx)?;
//! client.send_completion(&request).await?;
//! // replies arrive on reply_rx; hand it to Gateway::spawn_inbound_pump
//! ```

mod http;
mod traits;

pub use http::HttpAssistantClient;
pub use traits::{AssistantBackend, ToolExecutor};
