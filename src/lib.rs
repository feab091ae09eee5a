//! Ringcam Camera Daemon Library
//!
//! A small camera daemon in the style of an embedded appliance: capture
//! JPEG frames on a fixed cadence, store them durably with bounded
//! retention, and serve the newest one over HTTP while a status LED
//! breathes out liveness.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! source → staging → durable store → history ring → latest pointer
//!    ↓                                                    ↓
//! health (memory floors)                       service (HTTP status + images)
//! ```
//!
//! # Design Principles
//!
//! - **Capture never blocks on serving**: the two partitions share a
//!   latest-image pointer and a status cache, nothing else
//! - **Storage is bounded**: the history ring caps retained images and
//!   eviction follows every verified write
//! - **Degrade, then restart**: failed cycles recover in place; only a
//!   critically low memory floor requests a supervisor restart
//! - **Nothing is published unverified**: an image path becomes visible
//!   only after its bytes are durably on disk
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ringcam::capture::SyntheticCamera;
//! use ringcam::config::AppConfig;
//! use ringcam::led::{BreathEngine, ColorPicker, NullLed, StatusLed};
//! use ringcam::pipeline::{
//!     CapturePipeline, ImageNaming, LatestImage, PipelineTuning, ProcMemoryProbe,
//! };
//! use ringcam::store::{DurableStore, FlashStore};
//!
//! let config = AppConfig::default();
//!
//! let mut store = FlashStore::new(&config.storage.root, config.storage.image_dir.clone());
//! store.mount().unwrap();
//!
//! let latest = Arc::new(LatestImage::empty());
//! let mut pipeline = CapturePipeline::new(
//!     Box::new(SyntheticCamera::new(
//!         config.capture.width,
//!         config.capture.height,
//!         config.capture.jpeg_quality,
//!     )),
//!     Box::new(store),
//!     Box::new(ProcMemoryProbe::new()),
//!     Arc::clone(&latest),
//!     config.storage.ring_capacity().unwrap(),
//!     ImageNaming::from(&config.storage),
//!     PipelineTuning::from_config(&config.health, &config.capture),
//! );
//!
//! let mut led = StatusLed::new(
//!     BreathEngine::new(&config.led, ColorPicker::new(config.led.color)),
//!     Box::new(NullLed),
//! );
//!
//! pipeline.boot_sweep().unwrap();
//! let outcome = pipeline.run_cycle(&mut led);
//! println!("cycle finished: {outcome:?}");
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod config;
pub mod led;
pub mod pipeline;
pub mod runtime;
pub mod service;
pub mod store;

// Re-export commonly used types at crate root
pub use capture::{FrameSource, SensorFrame, StagingBuffer, SyntheticCamera};
pub use config::AppConfig;
pub use led::StatusLed;
pub use pipeline::{CapturePipeline, CycleOutcome, LatestImage};
pub use service::{ApiServer, StatusSnapshot};
pub use store::{DurableStore, FlashStore, HistoryRing};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
