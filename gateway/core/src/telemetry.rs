//! System Performance Manager
//!
//! Polls host CPU, memory and disk utilisation at a fixed rate and feeds each
//! sample into the gateway as a [`SystemPerformanceData`] record on
//! [`ResourceId::GdaSystemPerfMsg`], exactly as if a device had sent it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use sysinfo::{Disks, System};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::codec;
use crate::config::TelemetryConfig;
use crate::data::SystemPerformanceData;
use crate::resource::ResourceId;
use crate::transport::InboundHandler;

/// Host utilisation in percent
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetricsSample {
    /// CPU utilisation
    pub cpu: f32,
    /// Memory utilisation
    pub memory: f32,
    /// Disk utilisation across all mounted disks
    pub disk: f32,
}

/// Source of host utilisation figures
pub trait SystemMetricsSource: Send {
    /// Take one sample
    fn sample(&mut self) -> MetricsSample;
}

/// Metrics read from the host through `sysinfo`
pub struct SysinfoMetrics {
    sys: System,
    disks: Disks,
}

impl SysinfoMetrics {
    /// Create a source with refreshed CPU, memory and disk lists
    #[must_use]
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_cpu();
        sys.refresh_memory();
        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(used: u64, total: u64) -> f32 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64 * 100.0) as f32
    }
}

impl SystemMetricsSource for SysinfoMetrics {
    fn sample(&mut self) -> MetricsSample {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();
        self.disks.refresh();

        let (total, available) = self
            .disks
            .list()
            .iter()
            .fold((0u64, 0u64), |(t, a), d| (t + d.total_space(), a + d.available_space()));

        MetricsSample {
            cpu: self.sys.global_cpu_info().cpu_usage(),
            memory: percent(self.sys.used_memory(), self.sys.total_memory()),
            disk: percent(total.saturating_sub(available), total),
        }
    }
}

struct PollTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Fixed-rate host telemetry poller
pub struct SystemPerformanceManager {
    config: TelemetryConfig,
    source: Arc<Mutex<Box<dyn SystemMetricsSource>>>,
    sink: Arc<dyn InboundHandler>,
    task: Mutex<Option<PollTask>>,
}

impl SystemPerformanceManager {
    /// Create a poller reading `sysinfo` and delivering into `sink`
    #[must_use]
    pub fn new(config: TelemetryConfig, sink: Arc<dyn InboundHandler>) -> Self {
        Self::with_source(config, sink, Box::new(SysinfoMetrics::new()))
    }

    /// Create a poller with a custom metrics source
    #[must_use]
    pub fn with_source(
        config: TelemetryConfig,
        sink: Arc<dyn InboundHandler>,
        source: Box<dyn SystemMetricsSource>,
    ) -> Self {
        Self {
            config,
            source: Arc::new(Mutex::new(source)),
            sink,
            task: Mutex::new(None),
        }
    }

    /// Whether the poll task is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Start polling; returns `false` if already running
    pub fn start(&self) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            tracing::warn!("System performance manager already started");
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let source = Arc::clone(&self.source);
        let sink = Arc::clone(&self.sink);
        let location_id = self.config.location_id.clone();
        let period = self.config.poll_cycle.max(Duration::from_millis(1));
        let start = Instant::now() + self.config.initial_delay;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // sysinfo refreshes read /proc and the mount table
                        let source = Arc::clone(&source);
                        match tokio::task::spawn_blocking(move || source.lock().sample()).await {
                            Ok(sample) => emit(&*sink, &location_id, sample).await,
                            Err(e) => tracing::warn!(error = %e, "Metrics sampling task failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::debug!("System performance poll stopped");
        });

        tracing::info!(
            poll_cycle_secs = period.as_secs(),
            location = %self.config.location_id,
            "System performance manager started"
        );
        *task = Some(PollTask { handle, shutdown });
        true
    }

    /// Stop polling and wait for the task to finish; returns `false` if not running
    pub async fn stop(&self) -> bool {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return false;
        };
        // Receiver gone means the task already exited
        let _ = task.shutdown.send(true);
        if let Err(e) = task.handle.await {
            tracing::warn!(error = %e, "System performance task ended abnormally");
        }
        tracing::info!("System performance manager stopped");
        true
    }
}

async fn emit(sink: &dyn InboundHandler, location_id: &str, sample: MetricsSample) {
    let data = SystemPerformanceData {
        location_id: location_id.to_string(),
        cpu_utilization: sample.cpu,
        mem_utilization: sample.memory,
        disk_utilization: sample.disk,
        timestamp: Some(Utc::now().to_rfc3339()),
        ..Default::default()
    };

    tracing::debug!(
        cpu = sample.cpu,
        mem = sample.memory,
        disk = sample.disk,
        "System performance sample"
    );

    match codec::encode(&data) {
        Ok(payload) => {
            sink.handle_message(ResourceId::GdaSystemPerfMsg.as_str(), &payload)
                .await;
        }
        Err(e) => tracing::error!(error = %e, "Failed to encode system performance"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct FixedMetrics;

    impl SystemMetricsSource for FixedMetrics {
        fn sample(&mut self) -> MetricsSample {
            MetricsSample {
                cpu: 12.5,
                memory: 40.0,
                disk: 70.0,
            }
        }
    }

    struct ChannelSink(mpsc::UnboundedSender<(String, Vec<u8>)>);

    #[async_trait]
    impl InboundHandler for ChannelSink {
        async fn handle_message(&self, resource: &str, payload: &[u8]) -> bool {
            self.0.send((resource.to_string(), payload.to_vec())).is_ok()
        }
    }

    fn manager() -> (SystemPerformanceManager, mpsc::UnboundedReceiver<(String, Vec<u8>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = TelemetryConfig {
            poll_cycle: Duration::from_millis(20),
            initial_delay: Duration::ZERO,
            location_id: "gateway-01".into(),
            ..Default::default()
        };
        let manager =
            SystemPerformanceManager::with_source(config, Arc::new(ChannelSink(tx)), Box::new(FixedMetrics));
        (manager, rx)
    }

    #[test]
    fn test_percent() {
        assert!((percent(1, 4) - 25.0).abs() < f32::EPSILON);
        assert!(percent(1, 0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_start_emits_samples() {
        let (manager, mut rx) = manager();
        assert!(manager.start());

        let (resource, payload) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resource, "PIOT/GatewayDevice/SystemPerfMsg");

        let data = codec::decode_system_performance(&payload).unwrap();
        assert_eq!(data.location_id, "gateway-01");
        assert!((data.cpu_utilization - 12.5).abs() < f32::EPSILON);
        assert!(data.timestamp.is_some());

        assert!(manager.stop().await);
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_twice() {
        let (manager, _rx) = manager();
        assert!(!manager.is_running());
        assert!(manager.start());
        assert!(!manager.start());
        assert!(manager.is_running());
        assert!(manager.stop().await);
        assert!(!manager.stop().await);
        assert!(!manager.is_running());
    }

    struct ThreadRecordingMetrics(std::sync::mpsc::Sender<std::thread::ThreadId>);

    impl SystemMetricsSource for ThreadRecordingMetrics {
        fn sample(&mut self) -> MetricsSample {
            let _ = self.0.send(std::thread::current().id());
            MetricsSample::default()
        }
    }

    #[tokio::test]
    async fn test_sampling_runs_off_the_runtime_thread() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (thread_tx, thread_rx) = std::sync::mpsc::channel();
        let config = TelemetryConfig {
            poll_cycle: Duration::from_millis(20),
            initial_delay: Duration::ZERO,
            ..Default::default()
        };
        let manager = SystemPerformanceManager::with_source(
            config,
            Arc::new(ChannelSink(tx)),
            Box::new(ThreadRecordingMetrics(thread_tx)),
        );
        assert!(manager.start());

        let sampled_on = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(id) = thread_rx.try_recv() {
                    return id;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        // The test runtime is single-threaded, so a blocking-pool thread differs
        assert_ne!(sampled_on, std::thread::current().id());

        assert!(manager.stop().await);
    }

    #[test]
    fn test_sysinfo_sample_in_range() {
        let sample = SysinfoMetrics::new().sample();
        assert!((0.0..=100.0).contains(&sample.memory));
        assert!((0.0..=100.0).contains(&sample.disk));
    }
}
