//! Gateway Composition Root
//!
//! Wires the collaborators, the router and the managers together and owns
//! the start/stop lifecycle.
//!
//! # Usage
//!
//! ```ignore
//! let config = gateway_core::config::load_config()?;
//! let bus = Arc::new(InProcessPubSub::new());
//!
//! let (builder, replies) = GatewayBuilder::new(config)
//!     .pubsub(bus.clone())
//!     .http_assistant()?;
//! let gateway = builder.build();
//!
//! gateway.spawn_inbound_pump(replies);
//! gateway.start().await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::{AssistantBackend, HttpAssistantClient, ToolExecutor};
use crate::config::GatewayConfig;
use crate::controller::EnvironmentalController;
use crate::conversation::ConversationManager;
use crate::dispatcher::ActuatorDispatcher;
use crate::resource::ResourceId;
use crate::router::{MessageRouter, RouteOutcome};
use crate::telemetry::{SystemMetricsSource, SystemPerformanceManager};
use crate::transport::{
    ActuatorDataListener, InboundMessage, PersistenceClient, PubSubClient, UpstreamClient,
};

/// Capacity of the reply channel created by [`GatewayBuilder::http_assistant`]
const REPLY_CHANNEL_CAPACITY: usize = 100;

/// Builder for [`Gateway`]
pub struct GatewayBuilder {
    config: GatewayConfig,
    pubsub: Option<Arc<dyn PubSubClient>>,
    persistence: Option<Arc<dyn PersistenceClient>>,
    upstream: Option<Arc<dyn UpstreamClient>>,
    backend: Option<Arc<dyn AssistantBackend>>,
    tools: Option<Arc<dyn ToolExecutor>>,
    listener: Option<Arc<dyn ActuatorDataListener>>,
    metrics: Option<Box<dyn SystemMetricsSource>>,
}

impl GatewayBuilder {
    /// Start from a configuration with no collaborators
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            pubsub: None,
            persistence: None,
            upstream: None,
            backend: None,
            tools: None,
            listener: None,
            metrics: None,
        }
    }

    /// Device-facing pub/sub client
    #[must_use]
    pub fn pubsub(mut self, pubsub: Arc<dyn PubSubClient>) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    /// Persistence adapter
    #[must_use]
    pub fn persistence(mut self, persistence: Arc<dyn PersistenceClient>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Upstream (cloud) client
    #[must_use]
    pub fn upstream(mut self, upstream: Arc<dyn UpstreamClient>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Assistant completion backend
    #[must_use]
    pub fn assistant(mut self, backend: Arc<dyn AssistantBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Tool executor
    #[must_use]
    pub fn tool_executor(mut self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Local actuator listener
    #[must_use]
    pub fn actuator_listener(mut self, listener: Arc<dyn ActuatorDataListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Replace the host metrics source used by telemetry
    #[must_use]
    pub fn metrics_source(mut self, source: Box<dyn SystemMetricsSource>) -> Self {
        self.metrics = Some(source);
        self
    }

    /// Use the HTTP assistant client for completions and tool execution
    ///
    /// Returns the receiver its replies arrive on; pass it to
    /// [`Gateway::spawn_inbound_pump`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn http_assistant(mut self) -> anyhow::Result<(Self, mpsc::Receiver<InboundMessage>)> {
        let (tx, rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
        let client = Arc::new(HttpAssistantClient::new(&self.config.assistant, tx)?);
        self.backend = Some(client.clone());
        self.tools = Some(client);
        Ok((self, rx))
    }

    /// Wire everything together
    #[must_use]
    pub fn build(self) -> Gateway {
        let flags = self.config.collaborators;
        let pubsub = self.pubsub.filter(|_| flags.enable_pubsub);
        let persistence = self.persistence.filter(|_| flags.enable_persistence);
        let upstream = self.upstream.filter(|_| flags.enable_upstream);

        let dispatcher = ActuatorDispatcher::new(self.listener, pubsub.clone());
        let controller = Arc::new(EnvironmentalController::new(
            self.config.controller.clone(),
            dispatcher.clone(),
        ));
        let conversation = Arc::new(ConversationManager::new(
            self.config.conversation.clone(),
            self.backend,
            self.tools,
            dispatcher.clone(),
        ));

        let mut router = MessageRouter::new(
            Arc::clone(&controller),
            Arc::clone(&conversation),
            dispatcher,
        );
        if let Some(ref pubsub) = pubsub {
            router = router.with_pubsub(Arc::clone(pubsub));
        }
        if let Some(persistence) = persistence {
            router = router.with_persistence(persistence);
        }
        if let Some(upstream) = upstream {
            router = router.with_upstream(upstream);
        }
        let router = Arc::new(router);

        if let Some(ref pubsub) = pubsub {
            pubsub.set_inbound_handler(router.clone());
        }

        let telemetry = self.config.telemetry.enabled.then(|| {
            let sink = router.clone();
            match self.metrics {
                Some(source) => {
                    SystemPerformanceManager::with_source(self.config.telemetry.clone(), sink, source)
                }
                None => SystemPerformanceManager::new(self.config.telemetry.clone(), sink),
            }
        });

        tracing::info!(
            pubsub = pubsub.is_some(),
            telemetry = telemetry.is_some(),
            "Gateway assembled"
        );

        Gateway {
            config: self.config,
            router,
            controller,
            conversation,
            pubsub,
            telemetry,
            started: AtomicBool::new(false),
        }
    }
}

/// Running gateway core
pub struct Gateway {
    config: GatewayConfig,
    router: Arc<MessageRouter>,
    controller: Arc<EnvironmentalController>,
    conversation: Arc<ConversationManager>,
    pubsub: Option<Arc<dyn PubSubClient>>,
    telemetry: Option<SystemPerformanceManager>,
    started: AtomicBool,
}

impl Gateway {
    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The message router
    #[must_use]
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// The environmental controller
    #[must_use]
    pub fn controller(&self) -> &Arc<EnvironmentalController> {
        &self.controller
    }

    /// The conversation manager
    #[must_use]
    pub fn conversation(&self) -> &Arc<ConversationManager> {
        &self.conversation
    }

    /// Whether [`start`](Self::start) has been called without a matching stop
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Subscribe to device topics and start telemetry; returns `false` if
    /// already started
    pub async fn start(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Gateway already started");
            return false;
        }

        if let Some(ref pubsub) = self.pubsub {
            let results = join_all(
                ResourceId::DEVICE_SUBSCRIPTIONS
                    .iter()
                    .map(|&resource| async move { (resource, pubsub.subscribe(resource).await) }),
            )
            .await;
            for (resource, result) in results {
                if let Err(e) = result {
                    tracing::warn!(resource = %resource, error = %e, "Subscription failed");
                }
            }
        }

        if let Some(ref telemetry) = self.telemetry {
            telemetry.start();
        }

        tracing::info!("Gateway started");
        true
    }

    /// Stop telemetry and unsubscribe; returns `false` if not started
    pub async fn stop(&self) -> bool {
        if !self.started.swap(false, Ordering::SeqCst) {
            tracing::debug!("Gateway not started");
            return false;
        }

        if let Some(ref telemetry) = self.telemetry {
            telemetry.stop().await;
        }

        if let Some(ref pubsub) = self.pubsub {
            let results = join_all(
                ResourceId::DEVICE_SUBSCRIPTIONS
                    .iter()
                    .map(|&resource| async move { (resource, pubsub.unsubscribe(resource).await) }),
            )
            .await;
            for (resource, result) in results {
                if let Err(e) = result {
                    tracing::warn!(resource = %resource, error = %e, "Unsubscribe failed");
                }
            }
        }

        tracing::info!("Gateway stopped");
        true
    }

    /// Stop and close the conversation so late assistant replies are dropped
    pub async fn shutdown(&self) {
        self.stop().await;
        self.conversation.close();
    }

    /// Route one message through the router
    pub async fn route(&self, resource: &str, payload: &[u8]) -> RouteOutcome {
        self.router.route(resource, payload).await
    }

    /// Route every message arriving on `rx` until the channel closes
    pub fn spawn_inbound_pump(&self, mut rx: mpsc::Receiver<InboundMessage>) -> JoinHandle<()> {
        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let outcome = router.route(&message.resource, &message.payload).await;
                if !outcome.is_success() {
                    tracing::debug!(message = %message, outcome = ?outcome, "Inbound message not handled");
                }
            }
            tracing::debug!("Inbound channel closed");
        })
    }
}
