//! HTTP Assistant Client
//!
//! Talks to the assistant service over plain HTTP. Every call is a
//! `POST http://{host}:{port}/{resource}` with a JSON body of the form
//! `{"action": ..., "data": ...}`:
//!
//! - `Assistant/Message` with action `send_message` and a completion request
//! - `Assistant/ExecuteTool` with action `execute_tool` and `{name, input}`
//!
//! Requests run on spawned tasks. A 2xx reply body is fed back into the
//! gateway as an [`InboundMessage`] on the same resource. Failed completion
//! requests are logged and dropped. A failed tool execution is answered with
//! an error reply carrying a "could not be executed" result, so the pending
//! tool call still resolves.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::AssistantConfig;
use crate::messages::{CompletionRequest, ToolResultText};
use crate::resource::ResourceId;
use crate::transport::InboundMessage;

use super::traits::{AssistantBackend, ToolExecutor};

#[derive(Serialize)]
struct ActionRequest<'a, T: Serialize> {
    action: &'static str,
    data: &'a T,
}

#[derive(Serialize)]
struct ToolInvocation<'a> {
    name: &'a str,
    input: &'a serde_json::Value,
}

/// HTTP client for the assistant service
#[derive(Clone)]
pub struct HttpAssistantClient {
    base_url: String,
    http_client: reqwest::Client,
    replies: mpsc::Sender<InboundMessage>,
}

impl HttpAssistantClient {
    /// Create a client delivering replies into `replies`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &AssistantConfig, replies: mpsc::Sender<InboundMessage>) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            base_url: config.base_url(),
            http_client,
            replies,
        })
    }

    /// Endpoint URL for a resource
    #[must_use]
    pub fn endpoint(&self, resource: ResourceId) -> String {
        format!("{}{}", self.base_url, resource.as_str())
    }

    fn post<T: Serialize>(
        &self,
        resource: ResourceId,
        action: &'static str,
        data: &T,
        on_failure: Option<Vec<u8>>,
    ) -> anyhow::Result<()> {
        let body = serde_json::to_vec(&ActionRequest { action, data })?;
        let url = self.endpoint(resource);
        let client = self.http_client.clone();
        let replies = self.replies.clone();

        tokio::spawn(async move {
            let payload = match exchange(&client, &url, body).await {
                Ok(bytes) => {
                    tracing::debug!(url = %url, bytes = bytes.len(), "Assistant reply received");
                    bytes
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Assistant request failed");
                    match on_failure {
                        Some(fallback) => fallback,
                        None => return,
                    }
                }
            };

            let message = InboundMessage::new(resource.as_str(), payload);
            if replies.send(message).await.is_err() {
                tracing::debug!("Reply channel closed, dropping assistant reply");
            }
        });

        Ok(())
    }
}

async fn exchange(client: &reqwest::Client, url: &str, body: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await?;

    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        anyhow::bail!(
            "status {}: {}",
            status.as_u16(),
            String::from_utf8_lossy(&bytes)
        );
    }
    Ok(bytes.to_vec())
}

/// Error reply standing in for a tool execution that never answered
fn tool_failure_reply(tool_name: &str) -> anyhow::Result<Vec<u8>> {
    let reply = serde_json::json!({
        "status": "error",
        "data": {"value": [ToolResultText::execution_failed(tool_name)]},
    });
    Ok(serde_json::to_vec(&reply)?)
}

#[async_trait]
impl AssistantBackend for HttpAssistantClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn send_completion(&self, request: &CompletionRequest) -> anyhow::Result<()> {
        tracing::debug!(
            messages = request.messages.len(),
            use_tools = request.use_tools,
            "Sending completion request"
        );
        self.post(ResourceId::AssistantMessage, "send_message", request, None)
    }
}

#[async_trait]
impl ToolExecutor for HttpAssistantClient {
    async fn execute_tool(&self, name: &str, input: &serde_json::Value) -> anyhow::Result<()> {
        tracing::debug!(tool = %name, "Requesting tool execution");
        self.post(
            ResourceId::AssistantExecuteTool,
            "execute_tool",
            &ToolInvocation { name, input },
            Some(tool_failure_reply(name)?),
        )
    }
}
