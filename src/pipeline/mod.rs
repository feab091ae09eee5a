//! The capture pipeline and its shared state.
//!
//! The pipeline turns frames into durably stored, bounded history:
//! one cycle per cadence tick, with health counters and the
//! latest-image pointer as its externally visible state.

mod cycle;
mod health;
mod latest;

pub use cycle::{
    CapturePipeline, CycleOutcome, CycleStage, ImageNaming, PipelineTuning, SkipReason,
};
pub use health::{
    FixedProbe, HealthMonitor, HealthVerdict, MemoryProbe, PipelineHealth, ProcMemoryProbe,
};
pub use latest::LatestImage;
