//! Status snapshots shared between the capture and service partitions.
//!
//! The capture loop publishes a fresh snapshot about once a second;
//! HTTP handlers read it with a bounded wait so a stalled publisher
//! can never stall a response. A read that misses the bound returns
//! `None` and the caller serves the last snapshot it managed to get.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::pipeline::CapturePipeline;

/// A point-in-time view of the daemon, served as JSON.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    /// Crate version.
    pub version: String,
    /// Wall-clock startup time.
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since startup.
    pub uptime_seconds: u64,
    /// Total capture cycles attempted.
    pub cycles_total: u64,
    /// Total images durably stored.
    pub captures_total: u64,
    /// Total failed cycles.
    pub capture_failures: u64,
    /// Failures since the last stored image.
    pub consecutive_failures: u32,
    /// Cycles skipped below the admission floor.
    pub skipped_low_memory: u64,
    /// Oldest-image displacements.
    pub evictions_total: u64,
    /// Total image bytes durably written.
    pub bytes_written_total: u64,
    /// Images currently retained in the ring.
    pub stored_images: usize,
    /// Ring capacity.
    pub ring_capacity: usize,
    /// Store-relative path of the newest image, if any.
    pub latest_image: Option<String>,
    /// Seconds since the last stored image, if any.
    pub seconds_since_last_capture: Option<u64>,
    /// Most recent free-memory sample.
    pub free_memory_bytes: Option<u64>,
    /// Lowest free-memory sample seen since startup.
    pub min_free_memory_bytes: Option<u64>,
}

impl StatusSnapshot {
    /// Builds a snapshot from the pipeline's current state.
    pub fn from_pipeline(
        pipeline: &CapturePipeline,
        started_at: DateTime<Utc>,
        uptime: Duration,
    ) -> Self {
        let health = pipeline.health();
        Self {
            version: crate::VERSION.to_string(),
            started_at: Some(started_at),
            uptime_seconds: uptime.as_secs(),
            cycles_total: health.cycles(),
            captures_total: health.captures(),
            capture_failures: health.failures(),
            consecutive_failures: health.consecutive_failures(),
            skipped_low_memory: health.skipped_low_memory(),
            evictions_total: health.evictions(),
            bytes_written_total: health.bytes_written(),
            stored_images: pipeline.ring().len(),
            ring_capacity: pipeline.ring().capacity(),
            latest_image: pipeline.latest_path(),
            seconds_since_last_capture: health
                .last_capture_at()
                .map(|at| at.elapsed().as_secs()),
            free_memory_bytes: health.last_free_memory(),
            min_free_memory_bytes: health.min_free_memory(),
        }
    }
}

/// Single-slot snapshot exchange with a bounded read.
#[derive(Debug)]
pub struct StatusCache {
    slot: Mutex<StatusSnapshot>,
    read_timeout: Duration,
}

impl StatusCache {
    /// Creates a cache holding a default snapshot.
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(StatusSnapshot::default()),
            read_timeout,
        }
    }

    /// Replaces the cached snapshot.
    ///
    /// Called from the capture thread only; must not be called from
    /// async context.
    pub fn publish(&self, snapshot: StatusSnapshot) {
        *self.slot.blocking_lock() = snapshot;
    }

    /// Reads the cached snapshot, waiting at most the configured
    /// timeout for the publisher to release the slot.
    pub async fn read(&self) -> Option<StatusSnapshot> {
        match tokio::time::timeout(self.read_timeout, self.slot.lock()).await {
            Ok(guard) => Some(guard.clone()),
            Err(_) => None,
        }
    }
}
