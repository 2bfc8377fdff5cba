//! Environmental Controller
//!
//! Drives the humidifier from humidity readings using a hysteresis band plus
//! a debounce window. Each location has its own state machine:
//!
//! ```text
//!   NOMINAL ── out of band ──> AWAITING_CONFIRMATION
//!   AWAITING_CONFIRMATION ── in band ──> NOMINAL
//!   AWAITING_CONFIRMATION ── out of band, window elapsed, low ──> ACTUATED (ON)
//!   AWAITING_CONFIRMATION ── out of band, window elapsed, high ──> NOMINAL (OFF)
//!   ACTUATED ── in band, >= nominal ──> NOMINAL (OFF)
//! ```
//!
//! The debounce window is evaluated when the next sample arrives; there are
//! no timers. Samples for one location are processed one at a time, while
//! different locations proceed in parallel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::config::ControllerConfig;
use crate::data::{ActuatorCommand, ActuatorData, SensorData};
use crate::dispatcher::ActuatorDispatcher;
use crate::resource::ResourceId;

/// Derived phase of a location's state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerPhase {
    /// No anomaly recorded, humidifier not held on
    Nominal,
    /// An out-of-band sample was recorded and awaits confirmation
    AwaitingConfirmation,
    /// Humidifier was switched on and the reading has not recovered
    Actuated,
}

/// Per-location controller state
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControllerState {
    /// First out-of-band value of the current anomaly
    pub last_sample: Option<f32>,
    /// When `last_sample` was taken
    pub last_sample_time: Option<DateTime<Utc>>,
    /// ON command still in effect
    pub pending_actuation: Option<ActuatorData>,
    /// Last command issued for this location
    pub last_command: ActuatorCommand,
}

impl ControllerState {
    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ControllerPhase {
        if self.last_sample.is_some() {
            ControllerPhase::AwaitingConfirmation
        } else if self.pending_actuation.is_some() {
            ControllerPhase::Actuated
        } else {
            ControllerPhase::Nominal
        }
    }

    /// Feed one sample; returns the command to issue, if any
    pub fn evaluate(
        &mut self,
        location_id: &str,
        value: f32,
        at: DateTime<Utc>,
        config: &ControllerConfig,
    ) -> Option<ActuatorData> {
        let out_of_band = value < config.humidity_floor || value > config.humidity_ceiling;

        if out_of_band {
            let (Some(first), Some(since)) = (self.last_sample, self.last_sample_time) else {
                tracing::info!(
                    location = %location_id,
                    value,
                    "Humidity out of band, awaiting confirmation"
                );
                self.last_sample = Some(value);
                self.last_sample_time = Some(at);
                return None;
            };

            let elapsed = at.signed_duration_since(since);
            let window_elapsed = elapsed
                .to_std()
                .is_ok_and(|e| e >= config.max_time_past_threshold);

            if !window_elapsed {
                tracing::debug!(
                    location = %location_id,
                    value,
                    first,
                    elapsed_secs = elapsed.num_seconds(),
                    "Humidity still out of band, window not elapsed"
                );
                return None;
            }

            let command = if value < config.humidity_floor {
                ActuatorCommand::On
            } else {
                ActuatorCommand::Off
            };
            let actuation = ActuatorData::humidifier(location_id, command, config.nominal_humidity);

            tracing::info!(
                location = %location_id,
                value,
                first,
                elapsed_secs = elapsed.num_seconds(),
                command = %command,
                "Humidity out of band past threshold, actuating"
            );

            self.last_sample = None;
            self.last_sample_time = None;
            self.last_command = command;
            self.pending_actuation = match command {
                ActuatorCommand::On => Some(actuation.clone()),
                ActuatorCommand::Off => None,
            };
            return Some(actuation);
        }

        if self.last_sample.take().is_some() {
            self.last_sample_time = None;
            tracing::debug!(location = %location_id, value, "Humidity back in band, anomaly discarded");
        }

        if self.last_command != ActuatorCommand::On {
            return None;
        }

        if value >= config.nominal_humidity {
            tracing::info!(
                location = %location_id,
                value,
                nominal = config.nominal_humidity,
                "Humidity reached nominal, switching humidifier off"
            );
            self.last_command = ActuatorCommand::Off;
            self.pending_actuation = None;
            Some(ActuatorData::humidifier(
                location_id,
                ActuatorCommand::Off,
                config.nominal_humidity,
            ))
        } else {
            tracing::debug!(
                location = %location_id,
                value,
                nominal = config.nominal_humidity,
                "Humidity below nominal, humidifier stays on"
            );
            None
        }
    }
}

/// Parse a device timestamp, falling back to the current time
#[must_use]
pub fn sample_time(timestamp: Option<&str>) -> DateTime<Utc> {
    match timestamp.map(DateTime::parse_from_rfc3339) {
        Some(Ok(parsed)) => parsed.with_timezone(&Utc),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Unparsable sample timestamp, using current time");
            Utc::now()
        }
        None => {
            tracing::warn!("Sample has no timestamp, using current time");
            Utc::now()
        }
    }
}

/// Hysteresis controller over all locations
pub struct EnvironmentalController {
    config: ControllerConfig,
    states: DashMap<String, Arc<Mutex<ControllerState>>>,
    dispatcher: ActuatorDispatcher,
}

impl EnvironmentalController {
    /// Create a controller issuing commands through `dispatcher`
    #[must_use]
    pub fn new(config: ControllerConfig, dispatcher: ActuatorDispatcher) -> Self {
        Self {
            config,
            states: DashMap::new(),
            dispatcher,
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn state_for(&self, location_id: &str) -> Arc<Mutex<ControllerState>> {
        self.states
            .entry(location_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Process one humidity reading
    ///
    /// Returns the command that was dispatched, if any.
    pub async fn on_humidity_sample(&self, data: &SensorData) -> Option<ActuatorData> {
        if !self.config.enabled {
            tracing::debug!(location = %data.location_id, "Humidity control disabled");
            return None;
        }

        let at = sample_time(data.timestamp.as_deref());
        let state = self.state_for(&data.location_id);
        let mut state = state.lock().await;

        let command = state.evaluate(&data.location_id, data.value, at, &self.config)?;

        // Dispatch under the lock so commands for one location stay ordered
        let outcome = self
            .dispatcher
            .dispatch(ResourceId::CdaActuatorCmd, &command)
            .await;
        if !outcome.delivered() {
            tracing::warn!(
                location = %data.location_id,
                command = %command.command,
                "Humidifier command was not delivered"
            );
        }
        Some(command)
    }

    /// Snapshot of a location's state
    pub async fn state(&self, location_id: &str) -> Option<ControllerState> {
        let state = self.states.get(location_id).map(|s| s.value().clone())?;
        let snapshot = state.lock().await.clone();
        Some(snapshot)
    }

    /// Phase of a location (`Nominal` if never seen)
    pub async fn phase(&self, location_id: &str) -> ControllerPhase {
        self.state(location_id)
            .await
            .map_or(ControllerPhase::Nominal, |s| s.phase())
    }
}
