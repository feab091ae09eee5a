//! The capture partition: cycle cadence, LED animation, health checks
//! and status publication, all on one dedicated thread.

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::led::StatusLed;
use crate::pipeline::{CapturePipeline, HealthMonitor, HealthVerdict};
use crate::service::{StatusCache, StatusSnapshot};

/// How often a fresh status snapshot is published.
const STATUS_PUBLISH_INTERVAL: Duration = Duration::from_secs(1);

/// Idle sleep between loop iterations; bounds LED step jitter.
const LOOP_SLEEP: Duration = Duration::from_millis(1);

/// Everything the capture thread owns.
pub struct CaptureContext {
    pipeline: CapturePipeline,
    led: StatusLed,
    monitor: HealthMonitor,
    cadence: Duration,
    status: Arc<StatusCache>,
}

impl CaptureContext {
    /// Bundles the capture-side components.
    pub fn new(
        pipeline: CapturePipeline,
        led: StatusLed,
        monitor: HealthMonitor,
        cadence: Duration,
        status: Arc<StatusCache>,
    ) -> Self {
        Self {
            pipeline,
            led,
            monitor,
            cadence,
            status,
        }
    }

    /// Runs the capture loop until the shutdown flag is raised.
    ///
    /// When the health monitor reports critically low memory the
    /// process exits with [`super::EXIT_MEMORY_CRITICAL`] and the
    /// supervisor restarts the daemon from clean state.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        info!(cadence_ms = self.cadence.as_millis() as u64, "Capture loop started");

        if let Err(e) = self.pipeline.boot_sweep() {
            warn!(error = %e, "Boot sweep failed, continuing with leftovers");
        }

        let started_at = Utc::now();
        let boot = Instant::now();
        let mut last_cycle: Option<Instant> = None;
        let mut last_publish: Option<Instant> = None;

        while !shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            let cycle_due = match last_cycle {
                Some(at) => now.duration_since(at) >= self.cadence,
                None => true,
            };
            if cycle_due {
                last_cycle = Some(now);
                let outcome = self.pipeline.run_cycle(&mut self.led);
                debug!(?outcome, "Cycle finished");
            }

            self.led.tick(Instant::now());

            match self.monitor.check(Instant::now()) {
                HealthVerdict::MemoryCritical { free_bytes } => {
                    error!(
                        free_bytes,
                        floor_bytes = self.monitor.critical_floor(),
                        "Free memory critically low, requesting restart"
                    );
                    process::exit(super::EXIT_MEMORY_CRITICAL);
                }
                HealthVerdict::Healthy { free_bytes } => {
                    if let Some(free) = free_bytes {
                        self.pipeline.health_mut().record_memory(free);
                    }
                }
                HealthVerdict::NotDue => {}
            }

            let publish_due = match last_publish {
                Some(at) => at.elapsed() >= STATUS_PUBLISH_INTERVAL,
                None => true,
            };
            if publish_due {
                last_publish = Some(Instant::now());
                let snapshot =
                    StatusSnapshot::from_pipeline(&self.pipeline, started_at, boot.elapsed());
                self.status.publish(snapshot);
            }

            thread::sleep(LOOP_SLEEP);
        }

        info!("Capture loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticCamera;
    use crate::config::{ColorMode, HealthConfig, LedConfig, StorageConfig};
    use crate::led::{BreathEngine, ColorPicker, NullLed};
    use crate::pipeline::{FixedProbe, ImageNaming, LatestImage, PipelineTuning};
    use crate::store::{DurableStore, FlashStore};
    use std::num::NonZeroUsize;

    fn test_context(root: &std::path::Path, status: Arc<StatusCache>) -> CaptureContext {
        let mut store = FlashStore::new(root, "i");
        store.mount().unwrap();
        let pipeline = CapturePipeline::new(
            Box::new(SyntheticCamera::new(32, 24, 60)),
            Box::new(store),
            Box::new(FixedProbe(None)),
            Arc::new(LatestImage::empty()),
            NonZeroUsize::new(3).unwrap(),
            ImageNaming::from(&StorageConfig::default()),
            PipelineTuning::default(),
        );
        let led_config = LedConfig {
            pulse_ms: 0,
            ..Default::default()
        };
        let led = StatusLed::new(
            BreathEngine::new(&led_config, ColorPicker::seeded(ColorMode::Vivid, 13)),
            Box::new(NullLed),
        );
        let monitor = HealthMonitor::new(Box::new(FixedProbe(None)), &HealthConfig::default());
        CaptureContext::new(pipeline, led, monitor, Duration::from_millis(5), status)
    }

    fn read_snapshot(status: &StatusCache) -> StatusSnapshot {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(status.read()).unwrap()
    }

    #[test]
    fn test_loop_exits_immediately_when_already_shut_down() {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(StatusCache::new(Duration::from_millis(20)));
        let context = test_context(dir.path(), Arc::clone(&status));

        let shutdown = Arc::new(AtomicBool::new(true));
        context.run(shutdown);

        // No iterations ran, so nothing was published.
        assert_eq!(read_snapshot(&status).cycles_total, 0);
    }

    #[test]
    fn test_loop_captures_and_publishes_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(StatusCache::new(Duration::from_millis(20)));
        let context = test_context(dir.path(), Arc::clone(&status));

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || context.run(flag));

        thread::sleep(Duration::from_millis(150));
        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        let snapshot = read_snapshot(&status);
        assert!(snapshot.cycles_total >= 1);
        assert!(snapshot.captures_total >= 1);
        assert!(snapshot.latest_image.is_some());
    }
}
