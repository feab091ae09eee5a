//! The capture-store-rotate cycle.
//!
//! One cycle runs the full pipeline: admission check, frame
//! acquisition, staging, durable write with verification, then the
//! commit that readers observe (latest pointer, history ring, eviction
//! of the displaced file). Every failure is contained to its cycle;
//! the pipeline never takes the process down and never blocks without
//! a bound.

use crate::capture::{FrameSource, SourceError, StagingBuffer, StagingError};
use crate::config::{CaptureConfig, HealthConfig, StorageConfig};
use crate::led::StatusLed;
use crate::pipeline::health::{MemoryProbe, PipelineHealth};
use crate::pipeline::latest::LatestImage;
use crate::store::{DurableStore, HistoryRing, StoreError, StoredImage};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of one capture cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The image was durably stored and committed.
    Stored(StoredImage),
    /// The cycle was skipped before acquisition.
    Skipped(SkipReason),
    /// The cycle failed at the given stage; recovery has been attempted.
    Failed(CycleStage),
}

/// Why a cycle was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Free memory was below the admission floor.
    LowMemory {
        /// The sample that failed admission.
        free_bytes: u64,
    },
}

/// Pipeline stage at which a cycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    /// Frame acquisition from the source.
    Acquire,
    /// Staging the frame into RAM.
    Stage,
    /// The durable write (including verification).
    Write,
}

/// Naming scheme for stored images: prefix, timestamp, suffix.
#[derive(Debug, Clone)]
pub struct ImageNaming {
    prefix: String,
    suffix: String,
    image_dir: String,
}

impl ImageNaming {
    /// Creates a naming scheme.
    pub fn new(
        prefix: impl Into<String>,
        suffix: impl Into<String>,
        image_dir: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            image_dir: image_dir.into(),
        }
    }

    fn render(&self, millis: u128) -> String {
        format!("{}{}{}", self.prefix, millis, self.suffix)
    }
}

impl From<&StorageConfig> for ImageNaming {
    fn from(config: &StorageConfig) -> Self {
        Self::new(&config.path_prefix, &config.path_suffix, &config.image_dir)
    }
}

/// Pipeline limits and recovery delays.
#[derive(Debug, Clone)]
pub struct PipelineTuning {
    /// Free-memory floor for the admission check.
    pub admission_floor_bytes: u64,
    /// Upper bound on a single staged frame.
    pub max_frame_bytes: usize,
    /// Pause before reopening a failed source.
    pub source_retry_delay: Duration,
    /// Pause before remounting a failed store.
    pub remount_delay: Duration,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            admission_floor_bytes: 50_000_000,
            max_frame_bytes: 4 * 1024 * 1024,
            source_retry_delay: Duration::from_secs(1),
            remount_delay: Duration::from_millis(100),
        }
    }
}

impl PipelineTuning {
    /// Builds tuning from the relevant config sections.
    pub fn from_config(health: &HealthConfig, capture: &CaptureConfig) -> Self {
        Self {
            admission_floor_bytes: health.admission_floor_bytes,
            max_frame_bytes: capture.max_frame_bytes,
            ..Default::default()
        }
    }
}

enum AcquireFailure {
    Source(SourceError),
    Staging(StagingError),
}

/// Owns the source, store, ring and latest pointer, and drives the
/// capture cycle over them.
pub struct CapturePipeline {
    source: Box<dyn FrameSource + Send>,
    store: Box<dyn DurableStore + Send>,
    probe: Box<dyn MemoryProbe + Send>,
    ring: HistoryRing,
    latest: Arc<LatestImage>,
    health: PipelineHealth,
    tuning: PipelineTuning,
    naming: ImageNaming,
    started: Instant,
    last_name_ms: u128,
    sequence: u64,
}

impl CapturePipeline {
    /// Creates a pipeline over a mounted store and a ready source.
    pub fn new(
        source: Box<dyn FrameSource + Send>,
        store: Box<dyn DurableStore + Send>,
        probe: Box<dyn MemoryProbe + Send>,
        latest: Arc<LatestImage>,
        capacity: NonZeroUsize,
        naming: ImageNaming,
        tuning: PipelineTuning,
    ) -> Self {
        Self {
            source,
            store,
            probe,
            ring: HistoryRing::new(capacity),
            latest,
            health: PipelineHealth::default(),
            tuning,
            naming,
            started: Instant::now(),
            last_name_ms: 0,
            sequence: 0,
        }
    }

    /// Deletes images left over from previous runs.
    ///
    /// Runs once at startup, before the first cycle: anything in the
    /// image directory matching the configured suffix predates this
    /// process and is unreachable through the ring.
    pub fn boot_sweep(&mut self) -> Result<usize, StoreError> {
        let removed = self
            .store
            .remove_matching(&self.naming.image_dir, &self.naming.suffix)?;
        for path in &removed {
            debug!(path = %path, "Removed stale image");
        }
        info!(count = removed.len(), "Boot sweep complete");
        Ok(removed.len())
    }

    /// Runs one full capture cycle.
    pub fn run_cycle(&mut self, led: &mut StatusLed) -> CycleOutcome {
        self.health.record_cycle();

        // Admission: do not even acquire when memory is tight. A probe
        // without telemetry reports None and admission passes.
        if let Some(free) = self.probe.sample() {
            self.health.record_memory(free);
            if free < self.tuning.admission_floor_bytes {
                info!(
                    free_bytes = free,
                    floor_bytes = self.tuning.admission_floor_bytes,
                    "Free memory below admission floor, skipping cycle"
                );
                self.health.record_skip();
                return CycleOutcome::Skipped(SkipReason::LowMemory { free_bytes: free });
            }
        }

        let staged = match self.acquire_and_stage() {
            Ok(staged) => staged,
            Err(AcquireFailure::Source(e)) => {
                warn!(error = %e, "Frame acquisition failed, reinitializing source");
                self.health.record_failure();
                self.recover_source();
                return CycleOutcome::Failed(CycleStage::Acquire);
            }
            Err(AcquireFailure::Staging(e)) => {
                warn!(error = %e, "Frame staging failed, dropping frame");
                self.health.record_failure();
                return CycleOutcome::Failed(CycleStage::Stage);
            }
        };

        let path = self.next_image_path();
        let bytes = staged.len();
        let write_result = self.store.write_file(&path, staged.as_bytes());
        // Staging RAM is released before commit bookkeeping.
        drop(staged);

        match write_result {
            Ok(()) => {}
            Err(e @ (StoreError::Open { .. } | StoreError::NotMounted)) => {
                warn!(error = %e, path = %path, "Store open failed, attempting remount");
                self.health.record_failure();
                self.recover_store();
                return CycleOutcome::Failed(CycleStage::Write);
            }
            Err(e) => {
                // The file may exist with fewer bytes than requested;
                // a partial image must never become visible.
                warn!(error = %e, path = %path, "Write failed, removing partial file");
                if let Err(remove_err) = self.store.remove(&path) {
                    debug!(error = %remove_err, path = %path, "Partial file cleanup failed");
                }
                self.health.record_failure();
                return CycleOutcome::Failed(CycleStage::Write);
            }
        }

        // Commit order: pointer first, then ring, then the displaced
        // file. The pointer never references anything unverified.
        self.sequence += 1;
        self.latest.publish(path.clone());
        let stored = StoredImage::new(path.clone(), self.sequence);
        if let Some(displaced) = self.ring.push(stored.clone()) {
            if let Err(e) = self.store.remove(displaced.path()) {
                // Orphaned until the next boot sweep; history stays consistent.
                warn!(error = %e, path = %displaced.path(), "Failed to remove evicted image");
            }
            self.health.record_eviction();
        }
        self.health.record_capture(bytes as u64);
        info!(path = %path, bytes, "Image stored");

        led.pulse_once();
        CycleOutcome::Stored(stored)
    }

    fn acquire_and_stage(&mut self) -> Result<StagingBuffer, AcquireFailure> {
        let frame = self.source.acquire().map_err(AcquireFailure::Source)?;
        debug!(sequence = frame.sequence(), bytes = frame.len(), "Frame acquired");
        let staged = StagingBuffer::stage(&frame, self.tuning.max_frame_bytes)
            .map_err(AcquireFailure::Staging)?;
        // The driver buffer is handed back here, before any store I/O.
        drop(frame);
        Ok(staged)
    }

    fn recover_source(&mut self) {
        if !self.tuning.source_retry_delay.is_zero() {
            std::thread::sleep(self.tuning.source_retry_delay);
        }
        match self.source.reinitialize() {
            Ok(()) => info!("Frame source reinitialized"),
            Err(e) => warn!(error = %e, "Frame source reinitialization failed, will retry next cycle"),
        }
    }

    fn recover_store(&mut self) {
        if !self.tuning.remount_delay.is_zero() {
            std::thread::sleep(self.tuning.remount_delay);
        }
        match self.store.remount() {
            Ok(()) => info!("Store remounted"),
            Err(e) => warn!(error = %e, "Store remount failed, will retry next cycle"),
        }
    }

    /// Renders the next image path from the monotonic timestamp.
    ///
    /// Strictly increasing: two cycles in the same millisecond still
    /// get distinct names.
    fn next_image_path(&mut self) -> String {
        let millis = self
            .started
            .elapsed()
            .as_millis()
            .max(self.last_name_ms + 1);
        self.last_name_ms = millis;
        self.naming.render(millis)
    }

    /// Returns the health counters.
    pub fn health(&self) -> &PipelineHealth {
        &self.health
    }

    /// Returns the health counters for external samples.
    pub fn health_mut(&mut self) -> &mut PipelineHealth {
        &mut self.health
    }

    /// Returns the history ring.
    pub fn ring(&self) -> &HistoryRing {
        &self.ring
    }

    /// Returns the current latest-image path.
    pub fn latest_path(&self) -> Option<String> {
        self.latest.get().map(|path| path.as_ref().clone())
    }
}
