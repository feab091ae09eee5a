//! Ringcam Daemon
//!
//! Captures camera snapshots on a fixed cadence, keeps a bounded
//! history on disk, and serves the newest one over HTTP.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use ringcam::capture::{FrameSource, SyntheticCamera};
use ringcam::config::{AppConfig, ConfigError, SourceKind};
use ringcam::led::{BreathEngine, ColorPicker, StatusLed, TraceLed};
use ringcam::pipeline::{
    CapturePipeline, HealthMonitor, ImageNaming, LatestImage, PipelineTuning, ProcMemoryProbe,
};
use ringcam::runtime::{spawn_capture, spawn_service, CaptureContext};
use ringcam::service::{ApiServer, ServiceState, StatusCache};
use ringcam::store::{DurableStore, FlashStore};

/// Capture, rotate and serve camera snapshots.
#[derive(Debug, Parser)]
#[command(name = "ringcam", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the storage root directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the HTTP listen address.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Force the synthetic frame source regardless of configuration.
    #[arg(long)]
    synthetic: bool,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    if let Some(data_dir) = cli.data_dir {
        config.storage.root = data_dir;
    }
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if cli.synthetic {
        config.capture.source = SourceKind::Synthetic;
    }
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        process::exit(1);
    }

    info!("Ringcam v{}", ringcam::VERSION);

    let ring_capacity = match config.storage.ring_capacity() {
        Ok(capacity) => capacity,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    let mut store = FlashStore::new(&config.storage.root, config.storage.image_dir.clone());
    if let Err(e) = store.mount() {
        eprintln!("Failed to mount store: {}", e);
        process::exit(1);
    }
    let images_root = store.image_root();

    // A camera that is missing at boot is retried on each failed
    // cycle, so an open failure here only warns.
    let mut source = build_frame_source(&config);
    if let Err(e) = source.reinitialize() {
        warn!(error = %e, "Frame source not ready at startup, will keep retrying");
    }

    let latest = Arc::new(LatestImage::empty());
    let status = Arc::new(StatusCache::new(config.server.status_read_timeout()));

    let pipeline = CapturePipeline::new(
        source,
        Box::new(store),
        Box::new(ProcMemoryProbe::new()),
        Arc::clone(&latest),
        ring_capacity,
        ImageNaming::from(&config.storage),
        PipelineTuning::from_config(&config.health, &config.capture),
    );

    let led = StatusLed::new(
        BreathEngine::new(&config.led, ColorPicker::new(config.led.color)),
        Box::new(TraceLed::default()),
    );

    let monitor = HealthMonitor::new(Box::new(ProcMemoryProbe::new()), &config.health);

    let context = CaptureContext::new(
        pipeline,
        led,
        monitor,
        config.capture.interval(),
        Arc::clone(&status),
    );

    let state = Arc::new(ServiceState::new(
        latest,
        status,
        images_root,
        config.server.page_refresh_seconds,
    ));
    let server = ApiServer::new(&config.server, state);

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    }) {
        eprintln!("Failed to install signal handler: {}", e);
        process::exit(1);
    }

    let capture_handle = match spawn_capture(context, Arc::clone(&shutdown)) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to spawn capture thread: {}", e);
            process::exit(1);
        }
    };
    let service_handle = match spawn_service(server, Arc::clone(&shutdown)) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to spawn service thread: {}", e);
            process::exit(1);
        }
    };

    if capture_handle.join().is_err() {
        warn!("Capture thread panicked");
    }
    if service_handle.join().is_err() {
        warn!("Service thread panicked");
    }

    info!("Shutdown complete");
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            AppConfig::from_file(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn build_frame_source(config: &AppConfig) -> Box<dyn FrameSource + Send> {
    match config.capture.source {
        SourceKind::Synthetic => {
            info!(
                width = config.capture.width,
                height = config.capture.height,
                "Using synthetic frame source"
            );
            Box::new(SyntheticCamera::new(
                config.capture.width,
                config.capture.height,
                config.capture.jpeg_quality,
            ))
        }
        #[cfg(feature = "camera")]
        SourceKind::Camera => {
            info!(
                index = config.capture.device_index,
                width = config.capture.width,
                height = config.capture.height,
                "Using camera frame source"
            );
            Box::new(ringcam::capture::NokhwaCamera::new(
                config.capture.device_index,
                config.capture.width,
                config.capture.height,
                config.capture.fps,
            ))
        }
        #[cfg(not(feature = "camera"))]
        SourceKind::Camera => {
            warn!("Camera support not compiled in, falling back to synthetic source");
            Box::new(SyntheticCamera::new(
                config.capture.width,
                config.capture.height,
                config.capture.jpeg_quality,
            ))
        }
    }
}
