//! Status LED subsystem.
//!
//! The LED carries liveness at a glance: an idle breathing glow whose
//! color rotates at each trough, one full pulse when an image lands in
//! the store, darkness when the process is gone.

mod breath;
mod color;

pub use breath::BreathEngine;
pub use color::{lch_to_srgb, ColorPicker, Rgb};

use std::time::Instant;

use tracing::trace;

/// Output device for LED colors.
pub trait LedSink {
    /// Applies a color to the device.
    fn apply(&mut self, color: Rgb);
}

/// Sink that discards all output, for headless deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLed;

impl LedSink for NullLed {
    fn apply(&mut self, _color: Rgb) {}
}

/// Sink that logs color changes at trace level.
#[derive(Debug, Default)]
pub struct TraceLed {
    last: Option<Rgb>,
}

impl LedSink for TraceLed {
    fn apply(&mut self, color: Rgb) {
        if self.last != Some(color) {
            trace!(r = color.r, g = color.g, b = color.b, "LED color changed");
            self.last = Some(color);
        }
    }
}

/// Bundles the animation engine with its output sink.
pub struct StatusLed {
    engine: BreathEngine,
    sink: Box<dyn LedSink + Send>,
    pulses: u64,
}

impl StatusLed {
    /// Creates a status LED from an engine and a sink.
    pub fn new(engine: BreathEngine, sink: Box<dyn LedSink + Send>) -> Self {
        Self {
            engine,
            sink,
            pulses: 0,
        }
    }

    /// Advances the idle breath animation to `now`.
    pub fn tick(&mut self, now: Instant) {
        self.engine.tick(now, self.sink.as_mut());
    }

    /// Runs one synchronous capture pulse.
    pub fn pulse_once(&mut self) {
        self.pulses += 1;
        self.engine.pulse_once(self.sink.as_mut());
    }

    /// Number of pulses emitted since startup.
    #[inline]
    pub fn pulse_count(&self) -> u64 {
        self.pulses
    }
}

impl std::fmt::Debug for StatusLed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusLed")
            .field("engine", &self.engine)
            .field("pulses", &self.pulses)
            .finish()
    }
}
