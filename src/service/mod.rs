//! HTTP service partition: status snapshots and the image archive.

mod server;
mod status;

pub use server::{ApiServer, ServerError, ServiceState};
pub use status::{StatusCache, StatusSnapshot};
