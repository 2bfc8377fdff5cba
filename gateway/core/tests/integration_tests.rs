//! End-to-end tests for the assembled gateway
//!
//! Each test builds a [`Gateway`] around the in-process bus, drives it the
//! way devices and the assistant service would, and observes what comes back
//! out of the bus and the collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::time::timeout;

use gateway_core::config::GatewayConfig;
use gateway_core::data::{HUMIDITY_SENSOR_TYPE, SPEECH_SENSOR_TYPE, TTS_ACTUATOR_NAME};
use gateway_core::telemetry::{MetricsSample, SystemMetricsSource};
use gateway_core::transport::Published;
use gateway_core::{
    codec, ActuatorCommand, ActuatorData, AssistantBackend, CompletionRequest, ContentBlock,
    ControllerPhase, Gateway, GatewayBuilder, InProcessPubSub, MemoryPersistence, ResourceId,
    Role, RouteOutcome, SensorData, ToolExecutor, ToolResultText, TransportError, UpstreamClient,
};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Test Doubles
// =============================================================================

#[derive(Default)]
struct RecordingAssistant {
    requests: Mutex<Vec<CompletionRequest>>,
    tools: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl AssistantBackend for RecordingAssistant {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_completion(&self, request: &CompletionRequest) -> anyhow::Result<()> {
        self.requests.lock().push(request.clone());
        Ok(())
    }
}

#[async_trait]
impl ToolExecutor for RecordingAssistant {
    async fn execute_tool(&self, name: &str, input: &Value) -> anyhow::Result<()> {
        self.tools.lock().push((name.to_string(), input.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingUpstream {
    sent: Mutex<Vec<ResourceId>>,
}

#[async_trait]
impl UpstreamClient for RecordingUpstream {
    async fn send(&self, resource: ResourceId, _payload: Vec<u8>) -> Result<(), TransportError> {
        self.sent.lock().push(resource);
        Ok(())
    }
}

struct FixedMetrics;

impl SystemMetricsSource for FixedMetrics {
    fn sample(&mut self) -> MetricsSample {
        MetricsSample {
            cpu: 5.0,
            memory: 25.0,
            disk: 50.0,
        }
    }
}

struct Harness {
    gateway: Gateway,
    bus: Arc<InProcessPubSub>,
    published: broadcast::Receiver<Published>,
    assistant: Arc<RecordingAssistant>,
}

fn init_tracing() {
    // Another test may have installed it already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn harness() -> Harness {
    init_tracing();
    let mut config = GatewayConfig::default();
    config.telemetry.enabled = false;

    let bus = Arc::new(InProcessPubSub::new());
    let published = bus.outbound();
    let assistant = Arc::new(RecordingAssistant::default());

    let gateway = GatewayBuilder::new(config)
        .pubsub(bus.clone())
        .assistant(assistant.clone())
        .tool_executor(assistant.clone())
        .build();

    Harness {
        gateway,
        bus,
        published,
        assistant,
    }
}

async fn next_command(published: &mut broadcast::Receiver<Published>) -> ActuatorData {
    let (resource, payload) = timeout(WAIT, published.recv())
        .await
        .expect("timed out waiting for a publish")
        .expect("bus closed");
    assert_eq!(resource, ResourceId::CdaActuatorCmd);
    codec::decode_actuator(&payload).unwrap()
}

fn humidity(value: f32, timestamp: &str) -> Vec<u8> {
    let sample = SensorData::new(HUMIDITY_SENSOR_TYPE, "greenhouse", value)
        .with_name("HumiditySensor")
        .with_timestamp(timestamp);
    codec::encode(&sample).unwrap()
}

fn speech(text: &str) -> Vec<u8> {
    let state = json!({"partial": "", "result": text, "isComplete": true}).to_string();
    let sample = SensorData::new(SPEECH_SENSOR_TYPE, "kitchen", 0.0)
        .with_name("SpeechSensor")
        .with_state_data(state);
    codec::encode(&sample).unwrap()
}

fn reply(data: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({"status": "ok", "data": data})).unwrap()
}

// =============================================================================
// Humidity Control
// =============================================================================

#[tokio::test]
async fn test_humidity_cycle_through_bus() {
    let mut h = harness();
    h.gateway.start().await;

    let first = h
        .bus
        .inject(ResourceId::CdaSensorMsg, humidity(25.0, "2024-05-01T10:00:00Z"))
        .await;
    assert_eq!(first, Some(true));
    assert_eq!(
        h.gateway.controller().phase("greenhouse").await,
        ControllerPhase::AwaitingConfirmation
    );

    h.bus
        .inject(ResourceId::CdaSensorMsg, humidity(24.0, "2024-05-01T10:05:01Z"))
        .await;
    let on = next_command(&mut h.published).await;
    assert_eq!(on.command, ActuatorCommand::On);
    assert_eq!(on.location_id, "greenhouse");
    assert!((on.value - 40.0).abs() < f32::EPSILON);

    h.bus
        .inject(ResourceId::CdaSensorMsg, humidity(41.0, "2024-05-01T10:06:40Z"))
        .await;
    let off = next_command(&mut h.published).await;
    assert_eq!(off.command, ActuatorCommand::Off);
    assert_eq!(
        h.gateway.controller().phase("greenhouse").await,
        ControllerPhase::Nominal
    );
}

#[tokio::test]
async fn test_brief_excursion_does_not_actuate() {
    let mut h = harness();
    h.gateway.start().await;

    h.bus
        .inject(ResourceId::CdaSensorMsg, humidity(25.0, "2024-05-01T10:00:00Z"))
        .await;
    h.bus
        .inject(ResourceId::CdaSensorMsg, humidity(35.0, "2024-05-01T10:01:00Z"))
        .await;
    h.bus
        .inject(ResourceId::CdaSensorMsg, humidity(24.0, "2024-05-01T10:06:00Z"))
        .await;

    assert!(matches!(
        h.published.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn test_messages_dropped_after_stop() {
    let h = harness();
    h.gateway.start().await;
    h.gateway.stop().await;

    let outcome = h
        .bus
        .inject(ResourceId::CdaSensorMsg, humidity(25.0, "2024-05-01T10:00:00Z"))
        .await;
    assert_eq!(outcome, None);
    assert_eq!(
        h.gateway.controller().phase("greenhouse").await,
        ControllerPhase::Nominal
    );
}

// =============================================================================
// Conversation
// =============================================================================

#[tokio::test]
async fn test_spoken_question_with_tool_round_trip() {
    let mut h = harness();
    h.gateway.start().await;

    h.bus
        .inject(ResourceId::CdaSensorMsg, speech("what time is it"))
        .await;
    assert_eq!(h.assistant.requests.lock().len(), 1);

    let tool_turn = reply(json!({
        "role": "assistant",
        "content": [
            {"type": "text", "text": "Let me check."},
            {"type": "tool_use", "id": "toolu_1", "name": "clock", "input": {"zone": "UTC"}}
        ]
    }));
    let outcome = h
        .gateway
        .route(ResourceId::AssistantMessage.as_str(), &tool_turn)
        .await;
    assert_eq!(outcome, RouteOutcome::Handled);
    assert_eq!(
        h.assistant.tools.lock().clone(),
        vec![("clock".to_string(), json!({"zone": "UTC"}))]
    );
    assert_eq!(
        h.gateway.conversation().outstanding_tool().await.as_deref(),
        Some("toolu_1")
    );

    // A new question while the tool runs must not split the tool use from its result
    h.bus
        .inject(ResourceId::CdaSensorMsg, speech("is it raining"))
        .await;
    assert_eq!(h.assistant.requests.lock().len(), 1);
    assert_eq!(h.gateway.conversation().history().await.len(), 2);

    let tool_output = reply(json!({
        "value": [
            {"type": "text", "text": "12:00"},
            {"type": "image", "source": "ignored"}
        ]
    }));
    let outcome = h
        .gateway
        .route(ResourceId::AssistantExecuteTool.as_str(), &tool_output)
        .await;
    assert_eq!(outcome, RouteOutcome::Handled);

    {
        let requests = h.assistant.requests.lock();
        assert_eq!(requests.len(), 2);
        let history = &requests[1].messages;
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].role, Role::User);
        assert_eq!(
            history[2].content,
            vec![ContentBlock::tool_result("toolu_1", vec![ToolResultText::new("12:00")])]
        );
    }

    let answer = reply(json!({
        "role": "assistant",
        "content": [{"type": "text", "text": "It is noon."}]
    }));
    h.gateway
        .route(ResourceId::AssistantMessage.as_str(), &answer)
        .await;

    let spoken = next_command(&mut h.published).await;
    assert_eq!(spoken.name, TTS_ACTUATOR_NAME);
    assert_eq!(spoken.location_id, "kitchen");
    assert_eq!(spoken.state_data.as_deref(), Some("It is noon."));
    assert_eq!(h.gateway.conversation().history().await.len(), 4);
}

#[tokio::test]
async fn test_reply_after_shutdown_is_ignored() {
    let h = harness();
    h.gateway.start().await;
    h.bus.inject(ResourceId::CdaSensorMsg, speech("hello")).await;
    h.gateway.shutdown().await;

    let answer = reply(json!({
        "role": "assistant",
        "content": [{"type": "text", "text": "Hi"}]
    }));
    let outcome = h
        .gateway
        .route(ResourceId::AssistantMessage.as_str(), &answer)
        .await;
    assert_eq!(outcome, RouteOutcome::HandlerFailed);
}

// =============================================================================
// Routing Edges
// =============================================================================

#[test]
fn test_unknown_resource_and_bad_payload() {
    let h = harness();
    tokio_test::block_on(async {
        assert_eq!(
            h.gateway.route("PIOT/Nowhere/Thing", b"{}").await,
            RouteOutcome::Ignored
        );
        assert_eq!(
            h.gateway
                .route(ResourceId::CdaSensorMsg.as_str(), b"not json")
                .await,
            RouteOutcome::DecodeFailed
        );
    });
}

#[tokio::test]
async fn test_cloud_command_republished_to_devices() {
    let mut h = harness();
    let command = ActuatorData::humidifier("attic", ActuatorCommand::On, 45.0);
    let outcome = h
        .gateway
        .route(
            ResourceId::CloudActuatorCmd.as_str(),
            &codec::encode(&command).unwrap(),
        )
        .await;

    assert_eq!(outcome, RouteOutcome::Handled);
    assert_eq!(next_command(&mut h.published).await, command);
}

#[tokio::test]
async fn test_sensor_data_persisted_and_forwarded() {
    let mut config = GatewayConfig::default();
    config.telemetry.enabled = false;
    let persistence = Arc::new(MemoryPersistence::new());
    let upstream = Arc::new(RecordingUpstream::default());

    let gateway = GatewayBuilder::new(config)
        .persistence(persistence.clone())
        .upstream(upstream.clone())
        .build();

    let outcome = gateway
        .route(
            ResourceId::CdaSensorMsg.as_str(),
            &humidity(35.0, "2024-05-01T10:00:00Z"),
        )
        .await;
    assert_eq!(outcome, RouteOutcome::Handled);
    assert_eq!(upstream.sent.lock().clone(), vec![ResourceId::CdaSensorMsg]);

    timeout(WAIT, async {
        while persistence.is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("record was not persisted");

    let keys = persistence.keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("PIOT/ConstrainedDevice/SensorMsg:HumiditySensor:"));
}

// =============================================================================
// Telemetry
// =============================================================================

#[tokio::test]
async fn test_telemetry_reaches_upstream() {
    let mut config = GatewayConfig::default();
    config.telemetry.poll_cycle = Duration::from_millis(10);
    config.telemetry.initial_delay = Duration::ZERO;
    let upstream = Arc::new(RecordingUpstream::default());

    let gateway = GatewayBuilder::new(config)
        .upstream(upstream.clone())
        .metrics_source(Box::new(FixedMetrics))
        .build();
    gateway.start().await;

    timeout(WAIT, async {
        while !upstream.sent.lock().contains(&ResourceId::GdaSystemPerfMsg) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("no telemetry forwarded");

    assert!(gateway.stop().await);
}
