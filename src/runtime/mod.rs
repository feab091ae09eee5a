//! Task partitioning: capture on one thread, HTTP service on another.
//!
//! The two partitions share only the latest-image pointer and the
//! status cache, so a wedged HTTP client can never stall the capture
//! cadence and a stuck camera driver never blocks a status page.

mod capture;

pub use capture::CaptureContext;

use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::error;

use crate::service::ApiServer;

/// Exit code requesting a supervisor restart.
///
/// 75 is `EX_TEMPFAIL`: a temporary condition where trying again from
/// a fresh process is the right response. Raised when free memory
/// falls below the critical floor.
pub const EXIT_MEMORY_CRITICAL: i32 = 75;

/// Spawns the capture partition on its own named thread.
pub fn spawn_capture(
    context: CaptureContext,
    shutdown: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("ringcam-capture".to_string())
        .spawn(move || context.run(shutdown))
}

/// Spawns the HTTP service partition on its own named thread, backed
/// by a single-threaded async runtime.
pub fn spawn_service(
    server: ApiServer,
    shutdown: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("ringcam-service".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!(error = %e, "Failed to build service runtime");
                    return;
                }
            };
            if let Err(e) = runtime.block_on(server.run(shutdown)) {
                error!(error = %e, "Service terminated with error");
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::pipeline::LatestImage;
    use crate::service::{ServiceState, StatusCache};
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[test]
    fn test_service_thread_binds_and_shuts_down() {
        let state = Arc::new(ServiceState::new(
            Arc::new(LatestImage::empty()),
            Arc::new(StatusCache::new(Duration::from_millis(20))),
            PathBuf::from("."),
            5,
        ));
        let config = ServerConfig {
            listen: ([127, 0, 0, 1], 0).into(),
            ..Default::default()
        };
        let server = ApiServer::new(&config, state);

        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = spawn_service(server, Arc::clone(&shutdown)).unwrap();
        assert_eq!(handle.thread().name(), Some("ringcam-service"));

        std::thread::sleep(Duration::from_millis(100));
        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
