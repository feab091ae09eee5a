//! Frame acquisition.
//!
//! This module provides abstractions for acquiring encoded frames from
//! a camera and staging them in RAM. A frame borrows the driver's
//! buffer; the staged copy is what the rest of the pipeline owns.

#[cfg(feature = "camera")]
mod camera;
mod frame;
mod source;

#[cfg(feature = "camera")]
pub use camera::NokhwaCamera;
pub use frame::{SensorFrame, StagingBuffer, StagingError};
pub use source::{FrameSource, SourceError, SyntheticCamera};
