//! Message Router
//!
//! Single entry point for every inbound message, whichever transport it came
//! from. The resource identifier alone decides how the payload is decoded and
//! which handler runs:
//!
//! ```text
//!   (resource, payload)
//!        │
//!        ├─ Sensor ─────────────> persist, upstream, controller | conversation
//!        ├─ ActuatorResponse ───> log, persist
//!        ├─ ActuatorRequest ────> stamp location, dispatcher
//!        ├─ SystemPerformance ──> upstream
//!        └─ Generic ────────────> assistant reply | tool result | cloud command
//! ```
//!
//! Handlers never propagate errors back to the transport; every failure is
//! logged and reported as a [`RouteOutcome`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::codec;
use crate::controller::EnvironmentalController;
use crate::conversation::ConversationManager;
use crate::data::{ActuatorData, SensorData, HUMIDITY_SENSOR_TYPE, SPEECH_SENSOR_TYPE};
use crate::dispatcher::ActuatorDispatcher;
use crate::resource::{PayloadKind, ResourceId};
use crate::transport::{InboundHandler, PersistenceClient, PubSubClient, UpstreamClient};

/// Result of routing one message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A handler ran to completion
    Handled,
    /// Unknown resource, nothing done
    Ignored,
    /// Payload did not decode as the resource's type
    DecodeFailed,
    /// Handler ran but could not complete (protocol violation, delivery failure)
    HandlerFailed,
}

impl RouteOutcome {
    /// Boolean view for transports
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Handled)
    }
}

/// Routes inbound messages to the controller, conversation and dispatcher
pub struct MessageRouter {
    controller: Arc<EnvironmentalController>,
    conversation: Arc<ConversationManager>,
    dispatcher: ActuatorDispatcher,
    pubsub: Option<Arc<dyn PubSubClient>>,
    persistence: Option<Arc<dyn PersistenceClient>>,
    upstream: Option<Arc<dyn UpstreamClient>>,
    last_sensor_location: RwLock<Option<String>>,
    last_actuator_response: RwLock<Option<ActuatorData>>,
}

impl MessageRouter {
    /// Create a router over the given handlers
    #[must_use]
    pub fn new(
        controller: Arc<EnvironmentalController>,
        conversation: Arc<ConversationManager>,
        dispatcher: ActuatorDispatcher,
    ) -> Self {
        Self {
            controller,
            conversation,
            dispatcher,
            pubsub: None,
            persistence: None,
            upstream: None,
            last_sensor_location: RwLock::new(None),
            last_actuator_response: RwLock::new(None),
        }
    }

    /// Republish cloud commands through this pub/sub client
    #[must_use]
    pub fn with_pubsub(mut self, pubsub: Arc<dyn PubSubClient>) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    /// Store raw records through this adapter
    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceClient>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Forward telemetry through this upstream client
    #[must_use]
    pub fn with_upstream(mut self, upstream: Arc<dyn UpstreamClient>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Location of the most recent sensor reading
    #[must_use]
    pub fn last_sensor_location(&self) -> Option<String> {
        self.last_sensor_location.read().clone()
    }

    /// Most recent actuator response
    #[must_use]
    pub fn last_actuator_response(&self) -> Option<ActuatorData> {
        self.last_actuator_response.read().clone()
    }

    /// Route a message addressed by its wire resource name
    pub async fn route(&self, resource: &str, payload: &[u8]) -> RouteOutcome {
        match resource.parse::<ResourceId>() {
            Ok(resource) => self.route_resource(resource, payload).await,
            Err(e) => {
                tracing::warn!(error = %e, bytes = payload.len(), "Ignoring message");
                RouteOutcome::Ignored
            }
        }
    }

    /// Route a message addressed by a known resource
    pub async fn route_resource(&self, resource: ResourceId, payload: &[u8]) -> RouteOutcome {
        tracing::debug!(resource = %resource, bytes = payload.len(), "Routing message");

        match resource.payload_kind() {
            PayloadKind::Sensor => match codec::decode_sensor(payload) {
                Ok(data) => self.handle_sensor(resource, data, payload).await,
                Err(e) => decode_failed(resource, &e),
            },
            PayloadKind::ActuatorResponse => match codec::decode_actuator(payload) {
                Ok(data) => self.handle_actuator_response(resource, data, payload),
                Err(e) => decode_failed(resource, &e),
            },
            PayloadKind::ActuatorRequest => match codec::decode_actuator(payload) {
                Ok(data) => self.handle_actuator_request(data).await,
                Err(e) => decode_failed(resource, &e),
            },
            PayloadKind::SystemPerformance => match codec::decode_system_performance(payload) {
                Ok(data) => {
                    tracing::debug!(
                        resource = %resource,
                        cpu = data.cpu_utilization,
                        mem = data.mem_utilization,
                        disk = data.disk_utilization,
                        "System performance"
                    );
                    self.forward_upstream(resource, payload).await;
                    RouteOutcome::Handled
                }
                Err(e) => decode_failed(resource, &e),
            },
            PayloadKind::Generic => self.handle_generic(resource, payload).await,
        }
    }

    async fn handle_sensor(
        &self,
        resource: ResourceId,
        data: SensorData,
        payload: &[u8],
    ) -> RouteOutcome {
        tracing::debug!(
            resource = %resource,
            name = %data.name,
            location = %data.location_id,
            value = data.value,
            "Sensor reading"
        );
        *self.last_sensor_location.write() = Some(data.location_id.clone());

        if data.error_flag {
            tracing::warn!(name = %data.name, location = %data.location_id, "Sensor reported an error");
        }

        self.persist(resource, &data.name, payload);
        self.forward_upstream(resource, payload).await;

        match data.type_id {
            HUMIDITY_SENSOR_TYPE => {
                self.controller.on_humidity_sample(&data).await;
            }
            SPEECH_SENSOR_TYPE => {
                self.conversation.on_speech_sample(&data).await;
            }
            other => {
                tracing::debug!(type_id = other, "No analysis for sensor type");
            }
        }
        RouteOutcome::Handled
    }

    fn handle_actuator_response(
        &self,
        resource: ResourceId,
        data: ActuatorData,
        payload: &[u8],
    ) -> RouteOutcome {
        if data.error_flag {
            tracing::warn!(
                name = %data.name,
                location = %data.location_id,
                command = %data.command,
                "Actuator reported an error"
            );
        } else {
            tracing::info!(
                name = %data.name,
                location = %data.location_id,
                command = %data.command,
                "Actuator response"
            );
        }

        self.persist(resource, &data.name, payload);
        *self.last_actuator_response.write() = Some(data);
        RouteOutcome::Handled
    }

    async fn handle_actuator_request(&self, mut data: ActuatorData) -> RouteOutcome {
        if let Some(location) = self.last_sensor_location() {
            data.location_id = location;
        }

        let outcome = self
            .dispatcher
            .dispatch(ResourceId::CdaActuatorCmd, &data)
            .await;
        if outcome.delivered() {
            RouteOutcome::Handled
        } else {
            RouteOutcome::HandlerFailed
        }
    }

    async fn handle_generic(&self, resource: ResourceId, payload: &[u8]) -> RouteOutcome {
        match resource {
            ResourceId::AssistantMessage => {
                let message = match codec::decode_reply(payload).and_then(|r| r.into_message()) {
                    Ok(message) => message,
                    Err(e) => return decode_failed(resource, &e),
                };
                handled_if(self.conversation.on_assistant_response(message).await)
            }
            ResourceId::AssistantExecuteTool => {
                let result = match codec::decode_reply(payload).and_then(|r| r.into_tool_result()) {
                    Ok(result) => result,
                    Err(e) => return decode_failed(resource, &e),
                };
                handled_if(self.conversation.on_tool_execution_result(result).await)
            }
            ResourceId::CloudActuatorCmd => match codec::decode_actuator(payload) {
                Ok(data) => self.republish_cloud_command(&data).await,
                Err(e) => decode_failed(resource, &e),
            },
            ResourceId::GdaMgmtStatusMsg => {
                tracing::info!(
                    resource = %resource,
                    payload = %String::from_utf8_lossy(payload),
                    "Management status"
                );
                RouteOutcome::Handled
            }
            other => {
                tracing::warn!(resource = %other, "No generic handler for resource");
                RouteOutcome::Ignored
            }
        }
    }

    async fn republish_cloud_command(&self, data: &ActuatorData) -> RouteOutcome {
        let Some(ref pubsub) = self.pubsub else {
            tracing::warn!("No pub/sub client to republish cloud command");
            return RouteOutcome::Handled;
        };

        let payload = match codec::encode(data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode cloud command");
                return RouteOutcome::HandlerFailed;
            }
        };

        match pubsub.publish(ResourceId::CdaActuatorCmd, payload).await {
            Ok(()) => {
                tracing::info!(location = %data.location_id, command = %data.command, "Republished cloud command");
                RouteOutcome::Handled
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to republish cloud command");
                RouteOutcome::HandlerFailed
            }
        }
    }

    fn persist(&self, resource: ResourceId, name: &str, payload: &[u8]) {
        let Some(ref persistence) = self.persistence else {
            return;
        };

        let key = format!("{}:{}:{}", resource, name, Utc::now().timestamp_millis());
        let persistence = Arc::clone(persistence);
        let payload = payload.to_vec();

        tokio::spawn(async move {
            if let Err(e) = persistence.store(&key, resource, payload).await {
                tracing::warn!(key = %key, error = %e, "Failed to persist record");
            }
        });
    }

    async fn forward_upstream(&self, resource: ResourceId, payload: &[u8]) {
        let Some(ref upstream) = self.upstream else {
            return;
        };
        if let Err(e) = upstream.send(resource, payload.to_vec()).await {
            tracing::warn!(resource = %resource, error = %e, "Failed to forward upstream");
        }
    }
}

fn decode_failed(resource: ResourceId, error: &codec::CodecError) -> RouteOutcome {
    tracing::warn!(resource = %resource, error = %error, "Failed to decode payload");
    RouteOutcome::DecodeFailed
}

fn handled_if(accepted: bool) -> RouteOutcome {
    if accepted {
        RouteOutcome::Handled
    } else {
        RouteOutcome::HandlerFailed
    }
}

#[async_trait]
impl InboundHandler for MessageRouter {
    async fn handle_message(&self, resource: &str, payload: &[u8]) -> bool {
        self.route(resource, payload).await.is_success()
    }
}
