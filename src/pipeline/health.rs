//! Pipeline health tracking and memory monitoring.
//!
//! Two floors guard free memory: the admission floor (checked at the
//! top of every cycle, skips the capture) and the critical floor
//! (checked periodically, requests a process restart). The monitor
//! returns a verdict instead of acting on it, so the restart policy
//! stays with the runtime and the mechanism stays testable.

use crate::config::HealthConfig;
use std::time::{Duration, Instant};

/// Counters and telemetry accumulated by the capture pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineHealth {
    cycles: u64,
    captures: u64,
    failures: u64,
    consecutive_failures: u32,
    skipped_low_memory: u64,
    evictions: u64,
    bytes_written: u64,
    last_capture_at: Option<Instant>,
    last_free_memory: Option<u64>,
    min_free_memory: Option<u64>,
}

impl PipelineHealth {
    /// Records the start of a cycle.
    pub fn record_cycle(&mut self) {
        self.cycles += 1;
    }

    /// Records a verified durable write of `bytes`.
    pub fn record_capture(&mut self, bytes: u64) {
        self.captures += 1;
        self.bytes_written += bytes;
        self.consecutive_failures = 0;
        self.last_capture_at = Some(Instant::now());
    }

    /// Records a failed cycle.
    pub fn record_failure(&mut self) {
        self.failures += 1;
        self.consecutive_failures += 1;
    }

    /// Records a cycle skipped by the admission check.
    pub fn record_skip(&mut self) {
        self.skipped_low_memory += 1;
    }

    /// Records the displacement of the oldest retained image.
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Records a free-memory sample and tracks the low-water mark.
    pub fn record_memory(&mut self, free_bytes: u64) {
        self.last_free_memory = Some(free_bytes);
        self.min_free_memory = Some(match self.min_free_memory {
            Some(min) => min.min(free_bytes),
            None => free_bytes,
        });
    }

    /// Total cycles attempted.
    #[inline]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Total verified captures.
    #[inline]
    pub fn captures(&self) -> u64 {
        self.captures
    }

    /// Total failed cycles.
    #[inline]
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Failures since the last successful capture.
    #[inline]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Cycles skipped below the admission floor.
    #[inline]
    pub fn skipped_low_memory(&self) -> u64 {
        self.skipped_low_memory
    }

    /// Oldest-image displacements.
    #[inline]
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Total image bytes durably written.
    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// When the last successful capture happened.
    #[inline]
    pub fn last_capture_at(&self) -> Option<Instant> {
        self.last_capture_at
    }

    /// Most recent free-memory sample.
    #[inline]
    pub fn last_free_memory(&self) -> Option<u64> {
        self.last_free_memory
    }

    /// Lowest free-memory sample seen since start.
    #[inline]
    pub fn min_free_memory(&self) -> Option<u64> {
        self.min_free_memory
    }
}

/// Trait for free-memory telemetry.
///
/// `None` means the platform offers no usable signal; callers must
/// treat that as "proceed", never as "out of memory".
pub trait MemoryProbe {
    /// Samples currently available memory in bytes.
    fn sample(&mut self) -> Option<u64>;
}

/// Probe backed by `/proc/meminfo` (`MemAvailable`).
///
/// On platforms without procfs the file read fails and the probe
/// reports `None`, which disables both floors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcMemoryProbe;

impl ProcMemoryProbe {
    /// Creates a new probe.
    pub fn new() -> Self {
        Self
    }
}

impl MemoryProbe for ProcMemoryProbe {
    fn sample(&mut self) -> Option<u64> {
        let text = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo_available(&text)
    }
}

/// Probe that always reports the same value.
///
/// The `None` form stands in for platforms without telemetry.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub Option<u64>);

impl MemoryProbe for FixedProbe {
    fn sample(&mut self) -> Option<u64> {
        self.0
    }
}

fn parse_meminfo_available(text: &str) -> Option<u64> {
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kib: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kib * 1024);
        }
    }
    None
}

/// Outcome of a periodic health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    /// The check interval has not elapsed yet.
    NotDue,
    /// Memory is above the critical floor (or telemetry is absent).
    Healthy {
        /// The sample taken, if telemetry is available.
        free_bytes: Option<u64>,
    },
    /// Memory fell below the critical floor; the process should be
    /// restarted by its supervisor.
    MemoryCritical {
        /// The sample that breached the floor.
        free_bytes: u64,
    },
}

/// Periodic critical-floor memory check.
pub struct HealthMonitor {
    probe: Box<dyn MemoryProbe + Send>,
    critical_floor: u64,
    interval: Duration,
    last_check: Option<Instant>,
}

impl HealthMonitor {
    /// Creates a monitor from the health configuration.
    pub fn new(probe: Box<dyn MemoryProbe + Send>, config: &HealthConfig) -> Self {
        Self {
            probe,
            critical_floor: config.critical_floor_bytes,
            interval: config.check_interval(),
            last_check: None,
        }
    }

    /// Runs the check if its interval has elapsed.
    ///
    /// The first call only arms the timer, so the first real check
    /// lands one full interval after startup.
    pub fn check(&mut self, now: Instant) -> HealthVerdict {
        match self.last_check {
            None => {
                self.last_check = Some(now);
                return HealthVerdict::NotDue;
            }
            Some(prev) if now.duration_since(prev) < self.interval => {
                return HealthVerdict::NotDue;
            }
            Some(_) => {}
        }
        self.last_check = Some(now);

        match self.probe.sample() {
            Some(free) if free < self.critical_floor => {
                tracing::error!(
                    free_bytes = free,
                    floor_bytes = self.critical_floor,
                    "Free memory below critical floor"
                );
                HealthVerdict::MemoryCritical { free_bytes: free }
            }
            free => {
                tracing::debug!(free_bytes = ?free, "Periodic health check passed");
                HealthVerdict::Healthy { free_bytes: free }
            }
        }
    }

    /// Returns the critical floor in bytes.
    pub fn critical_floor(&self) -> u64 {
        self.critical_floor
    }
}
