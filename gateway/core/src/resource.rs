//! Resource Identifiers
//!
//! Every inbound or outbound message is addressed by a resource identifier.
//! The identifier names a topic or endpoint and declares the kind of payload
//! that travels on it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The payload type implied by a resource identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// `SensorData` record from a field device
    Sensor,
    /// `ActuatorData` command addressed to a field device
    ActuatorRequest,
    /// `ActuatorData` echoed back by a field device after actuation
    ActuatorResponse,
    /// `SystemPerformanceData` record
    SystemPerformance,
    /// Opaque `{status, data}` envelope (assistant backend, cloud service)
    Generic,
}

/// Known resource identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceId {
    /// Sensor readings published by constrained devices
    CdaSensorMsg,
    /// Actuator commands sent to constrained devices
    CdaActuatorCmd,
    /// Actuator responses from constrained devices
    CdaActuatorResponse,
    /// System performance published by constrained devices
    CdaSystemPerfMsg,
    /// System performance of the gateway itself
    GdaSystemPerfMsg,
    /// Gateway management status messages
    GdaMgmtStatusMsg,
    /// Gateway management commands (actuation requests addressed to the gateway)
    GdaMgmtStatusCmd,
    /// Actuator commands originating from the cloud service
    CloudActuatorCmd,
    /// Assistant backend replies to completion requests
    AssistantMessage,
    /// Tool execution replies
    AssistantExecuteTool,
}

impl ResourceId {
    /// All known resources, in declaration order
    pub const ALL: [ResourceId; 10] = [
        Self::CdaSensorMsg,
        Self::CdaActuatorCmd,
        Self::CdaActuatorResponse,
        Self::CdaSystemPerfMsg,
        Self::GdaSystemPerfMsg,
        Self::GdaMgmtStatusMsg,
        Self::GdaMgmtStatusCmd,
        Self::CloudActuatorCmd,
        Self::AssistantMessage,
        Self::AssistantExecuteTool,
    ];

    /// Topics the gateway subscribes to on the pub/sub transport
    pub const DEVICE_SUBSCRIPTIONS: [ResourceId; 4] = [
        Self::GdaMgmtStatusMsg,
        Self::CdaActuatorResponse,
        Self::CdaSensorMsg,
        Self::CdaSystemPerfMsg,
    ];

    /// Wire name of the resource (topic or URI path)
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CdaSensorMsg => "PIOT/ConstrainedDevice/SensorMsg",
            Self::CdaActuatorCmd => "PIOT/ConstrainedDevice/ActuatorCmd",
            Self::CdaActuatorResponse => "PIOT/ConstrainedDevice/ActuatorResponse",
            Self::CdaSystemPerfMsg => "PIOT/ConstrainedDevice/SystemPerfMsg",
            Self::GdaSystemPerfMsg => "PIOT/GatewayDevice/SystemPerfMsg",
            Self::GdaMgmtStatusMsg => "PIOT/GatewayDevice/MgmtStatusMsg",
            Self::GdaMgmtStatusCmd => "PIOT/GatewayDevice/MgmtStatusCmd",
            Self::CloudActuatorCmd => "PIOT/CloudService/ActuatorCmd",
            Self::AssistantMessage => "Assistant/Message",
            Self::AssistantExecuteTool => "Assistant/ExecuteTool",
        }
    }

    /// Payload type carried on this resource
    #[must_use]
    pub fn payload_kind(&self) -> PayloadKind {
        match self {
            Self::CdaSensorMsg => PayloadKind::Sensor,
            Self::CdaActuatorCmd | Self::GdaMgmtStatusCmd => PayloadKind::ActuatorRequest,
            Self::CdaActuatorResponse => PayloadKind::ActuatorResponse,
            Self::CdaSystemPerfMsg | Self::GdaSystemPerfMsg => PayloadKind::SystemPerformance,
            Self::GdaMgmtStatusMsg
            | Self::CloudActuatorCmd
            | Self::AssistantMessage
            | Self::AssistantExecuteTool => PayloadKind::Generic,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no known resource
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource: {0}")]
pub struct UnknownResource(pub String);

impl FromStr for ResourceId {
    type Err = UnknownResource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_matches('/');
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownResource(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for resource in ResourceId::ALL {
            assert_eq!(resource.as_str().parse::<ResourceId>(), Ok(resource));
        }
    }

    #[test]
    fn test_parse_tolerates_slashes_and_case() {
        assert_eq!(
            "/piot/constraineddevice/sensormsg".parse::<ResourceId>(),
            Ok(ResourceId::CdaSensorMsg)
        );
    }

    #[test]
    fn test_unknown_resource() {
        let err = "PIOT/Nowhere".parse::<ResourceId>().unwrap_err();
        assert_eq!(err.0, "PIOT/Nowhere");
    }

    #[test]
    fn test_payload_kinds() {
        assert_eq!(ResourceId::CdaSensorMsg.payload_kind(), PayloadKind::Sensor);
        assert_eq!(
            ResourceId::CdaActuatorResponse.payload_kind(),
            PayloadKind::ActuatorResponse
        );
        assert_eq!(
            ResourceId::AssistantMessage.payload_kind(),
            PayloadKind::Generic
        );
        assert_eq!(
            ResourceId::GdaSystemPerfMsg.payload_kind(),
            PayloadKind::SystemPerformance
        );
    }
}
