//! Assistant Backend Traits
//!
//! The conversation manager talks to the assistant service through these two
//! traits. Both are fire-and-forget: a successful call only means the request
//! was handed off. The reply comes back later as an inbound message on
//! [`ResourceId::AssistantMessage`] or [`ResourceId::AssistantExecuteTool`]
//! and is routed like any other message.
//!
//! [`ResourceId::AssistantMessage`]: crate::resource::ResourceId::AssistantMessage
//! [`ResourceId::AssistantExecuteTool`]: crate::resource::ResourceId::AssistantExecuteTool

use async_trait::async_trait;

use crate::messages::CompletionRequest;

/// Completion side of the assistant service
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Submit a completion request
    async fn send_completion(&self, request: &CompletionRequest) -> anyhow::Result<()>;
}

/// Tool execution side of the assistant service
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Ask the service to execute a tool
    async fn execute_tool(&self, name: &str, input: &serde_json::Value) -> anyhow::Result<()>;
}
