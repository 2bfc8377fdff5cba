//! Actuator Command Dispatcher
//!
//! Fans an actuator command out to two independent sinks:
//!
//! ```text
//!                     ┌──> local ActuatorDataListener (optional, in-process)
//!  ActuatorData ──────┤
//!                     └──> PubSubClient::publish (optional, serialized)
//! ```
//!
//! A failing sink never prevents the other from running. When a pub/sub
//! client is configured it is the required sink: the dispatch counts as
//! delivered only if the publish succeeded.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::codec;
use crate::data::ActuatorData;
use crate::resource::ResourceId;
use crate::transport::{ActuatorDataListener, PubSubClient};

/// What happened to one dispatched command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Local listener result, `None` if no listener is configured
    pub local: Option<bool>,
    /// Publish result, `None` if no pub/sub client is configured
    pub published: Option<bool>,
}

impl DispatchOutcome {
    /// Whether the command reached its required sink
    ///
    /// With pub/sub configured that is the publish; otherwise the local
    /// listener. With neither configured nothing was delivered.
    #[must_use]
    pub fn delivered(&self) -> bool {
        match (self.published, self.local) {
            (Some(published), _) => published,
            (None, Some(local)) => local,
            (None, None) => false,
        }
    }
}

/// Sends actuator commands to the local listener and the pub/sub transport
#[derive(Clone, Default)]
pub struct ActuatorDispatcher {
    listener: Option<Arc<dyn ActuatorDataListener>>,
    pubsub: Option<Arc<dyn PubSubClient>>,
}

impl ActuatorDispatcher {
    /// Create a dispatcher with the given sinks
    #[must_use]
    pub fn new(
        listener: Option<Arc<dyn ActuatorDataListener>>,
        pubsub: Option<Arc<dyn PubSubClient>>,
    ) -> Self {
        Self { listener, pubsub }
    }

    /// Whether a pub/sub sink is configured
    #[must_use]
    pub fn has_pubsub(&self) -> bool {
        self.pubsub.is_some()
    }

    /// Deliver a command to every configured sink
    pub async fn dispatch(&self, resource: ResourceId, command: &ActuatorData) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        if let Some(ref listener) = self.listener {
            let accepted = listener.on_actuator_command(command);
            if !accepted {
                tracing::warn!(
                    actuator = %command.name,
                    command = %command.command,
                    "Local listener rejected actuator command"
                );
            }
            outcome.local = Some(accepted);
        }

        if let Some(ref pubsub) = self.pubsub {
            let published = match codec::encode(command) {
                Ok(payload) => match pubsub.publish(resource, payload).await {
                    Ok(()) => {
                        tracing::info!(
                            resource = %resource,
                            location = %command.location_id,
                            command = %command.command,
                            "Published actuator command"
                        );
                        true
                    }
                    Err(e) => {
                        tracing::warn!(resource = %resource, error = %e, "Failed to publish actuator command");
                        false
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode actuator command");
                    false
                }
            };
            outcome.published = Some(published);
        }

        if outcome.local.is_none() && outcome.published.is_none() {
            tracing::debug!(command = %command.command, "No actuator sink configured, command dropped");
        }

        outcome
    }
}

/// Local actuator sink that remembers the latest command
///
/// Observers get change notifications through a `watch` channel.
pub struct ObservableActuatorResource {
    latest: RwLock<Option<ActuatorData>>,
    tx: watch::Sender<Option<ActuatorData>>,
}

impl ObservableActuatorResource {
    /// Create an empty resource
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            latest: RwLock::new(None),
            tx,
        }
    }

    /// Latest command received, if any
    #[must_use]
    pub fn latest(&self) -> Option<ActuatorData> {
        self.latest.read().clone()
    }

    /// Subscribe to command updates
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<ActuatorData>> {
        self.tx.subscribe()
    }
}

impl Default for ObservableActuatorResource {
    fn default() -> Self {
        Self::new()
    }
}

impl ActuatorDataListener for ObservableActuatorResource {
    fn on_actuator_command(&self, data: &ActuatorData) -> bool {
        *self.latest.write() = Some(data.clone());
        self.tx.send_replace(Some(data.clone()));
        true
    }
}
