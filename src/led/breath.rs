//! LED breathing animation.
//!
//! Brightness follows a triangle wave over a fixed period, shaped by
//! gamma 2.2 so the ramp reads linear to the eye. Each channel carries
//! an 8.8 fixed-point error term between steps, so dim colors keep
//! their hue instead of quantizing to black. Stepping is catch-up
//! based: however much wall time has passed since the last tick, the
//! engine advances that many steps.

use std::time::{Duration, Instant};

use super::color::{ColorPicker, Rgb};
use super::LedSink;
use crate::config::LedConfig;

/// Perceptual brightness curve exponent.
const GAMMA: f32 = 2.2;

/// Steps in each direction of the one-shot capture pulse.
const PULSE_STEPS: u32 = 150;

/// Drives the idle breathing glow and the capture pulse.
///
/// The engine owns the animation state (phase, base color, dither
/// carries) but not the output device; callers hand it a [`LedSink`]
/// on every call that emits light.
pub struct BreathEngine {
    half_steps: u32,
    step_interval_us: u64,
    pulse_step_delay: Duration,
    max_brightness: u8,
    picker: ColorPicker,
    base: Rgb,
    step_index: u32,
    last_tick: Instant,
    carry_us: u64,
    dither: [u16; 3],
}

impl BreathEngine {
    /// Creates an engine at the trough of its cycle, with a freshly
    /// picked base color.
    pub fn new(config: &LedConfig, mut picker: ColorPicker) -> Self {
        // One step per millisecond of half-period keeps the ramp
        // smooth; the cap keeps a full cycle (2 * half_steps + 1)
        // within u32.
        let half_steps = config.breath_period_ms.clamp(1, u64::from(u32::MAX / 2)) as u32;
        let step_interval_us =
            (config.breath_period_ms.saturating_mul(1000) / (2 * u64::from(half_steps))).max(1);
        let pulse_step_delay = Duration::from_millis(config.pulse_ms) / (2 * PULSE_STEPS);
        let base = picker.next();
        Self {
            half_steps,
            step_interval_us,
            pulse_step_delay,
            max_brightness: config.max_brightness,
            picker,
            base,
            step_index: 0,
            last_tick: Instant::now(),
            carry_us: 0,
            dither: [0; 3],
        }
    }

    /// Advances the breath animation to `now` and applies the current
    /// shade to `sink`. Sub-step time is carried to the next call.
    pub fn tick(&mut self, now: Instant, sink: &mut dyn LedSink) {
        let available =
            self.carry_us + now.saturating_duration_since(self.last_tick).as_micros() as u64;
        self.last_tick = now;
        let mut steps = available / self.step_interval_us;
        self.carry_us = available % self.step_interval_us;
        if steps == 0 {
            return;
        }

        // After a long stall, whole extra cycles land on the same
        // phase anyway; skipping them only skips color re-picks.
        let cycle = u64::from(2 * self.half_steps + 1);
        if steps > cycle {
            steps = (steps - 1) % cycle + 1;
        }

        let mut color = Rgb::BLACK;
        for _ in 0..steps {
            color = self.advance_step();
        }
        sink.apply(color);
    }

    /// Runs one full dark-bright-dark pulse synchronously, then leaves
    /// the idle breath at its trough. Picks a fresh color first.
    pub fn pulse_once(&mut self, sink: &mut dyn LedSink) {
        self.base = self.picker.next();
        for step in 0..=PULSE_STEPS {
            let color = self.shade(step as f32 / PULSE_STEPS as f32);
            sink.apply(color);
            self.pulse_pause();
        }
        for step in (0..=PULSE_STEPS).rev() {
            let color = self.shade(step as f32 / PULSE_STEPS as f32);
            sink.apply(color);
            self.pulse_pause();
        }
        // The pulse ends dark; restart the idle breath from there.
        self.step_index = 0;
        self.carry_us = 0;
        self.last_tick = Instant::now();
    }

    fn pulse_pause(&self) {
        if !self.pulse_step_delay.is_zero() {
            std::thread::sleep(self.pulse_step_delay);
        }
    }

    fn advance_step(&mut self) -> Rgb {
        self.step_index += 1;
        if self.step_index > 2 * self.half_steps {
            self.step_index = 0;
            // Trough crossing: switch colors while the LED is dark.
            self.base = self.picker.next();
        }
        let position = if self.step_index <= self.half_steps {
            self.step_index
        } else {
            2 * self.half_steps - self.step_index
        };
        let alpha = position as f32 / self.half_steps as f32;
        self.shade(alpha)
    }

    /// Scales the base color to `alpha` in [0, 1], gamma-shaped and
    /// capped at the configured maximum brightness.
    fn shade(&mut self, alpha: f32) -> Rgb {
        let level = alpha.powf(GAMMA) * (f32::from(self.max_brightness) / 255.0);
        let channels = [self.base.r, self.base.g, self.base.b];
        let mut out = [0u8; 3];
        for ((value, &channel), dither) in out.iter_mut().zip(&channels).zip(&mut self.dither) {
            // 8.8 fixed point: the high byte drives the LED, the low
            // byte carries into the next step.
            let scaled = (f32::from(channel) * level * 256.0) as u32;
            let sum = scaled + u32::from(*dither);
            *value = (sum >> 8) as u8;
            *dither = (sum & 0xFF) as u16;
        }
        Rgb::new(out[0], out[1], out[2])
    }
}

impl std::fmt::Debug for BreathEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreathEngine")
            .field("half_steps", &self.half_steps)
            .field("step_index", &self.step_index)
            .field("base", &self.base)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColorMode;
    use proptest::prelude::*;

    #[derive(Default)]
    struct RecordingSink {
        applied: Vec<Rgb>,
    }

    impl LedSink for RecordingSink {
        fn apply(&mut self, color: Rgb) {
            self.applied.push(color);
        }
    }

    fn quick_config() -> LedConfig {
        LedConfig {
            max_brightness: 10,
            breath_period_ms: 200,
            pulse_ms: 0,
            color: ColorMode::Vivid,
        }
    }

    fn engine() -> BreathEngine {
        BreathEngine::new(&quick_config(), ColorPicker::seeded(ColorMode::Vivid, 42))
    }

    #[test]
    fn test_step_interval_derived_from_period() {
        let engine = engine();
        // 200 ms period, 400 steps per cycle: 500 us per step.
        assert_eq!(engine.half_steps, 200);
        assert_eq!(engine.step_interval_us, 500);
    }

    proptest! {
        // Cumulative emitted light (in 8.8 units) never drifts more
        // than one output quantum from the ideal curve, for any
        // brightness cap and any base color.
        #[test]
        fn prop_dither_drift_stays_under_one_quantum(
            max_brightness in 1u8..=255,
            seed in 0u64..1024,
        ) {
            let config = LedConfig {
                max_brightness,
                breath_period_ms: 120,
                pulse_ms: 0,
                color: ColorMode::Vivid,
            };
            let mut engine =
                BreathEngine::new(&config, ColorPicker::seeded(ColorMode::Vivid, seed));
            let base = engine.base;
            let half = engine.half_steps;

            let mut emitted: u64 = 0;
            let mut ideal: u64 = 0;
            for step in 1..=half {
                let color = engine.advance_step();
                let alpha = step as f32 / half as f32;
                let level = alpha.powf(GAMMA) * (f32::from(max_brightness) / 255.0);
                ideal += (f32::from(base.r) * level * 256.0) as u64;
                emitted += u64::from(color.r) * 256;
                prop_assert!(ideal.abs_diff(emitted) < 256, "drift at step {}", step);
            }
        }
    }

    #[test]
    fn test_triangle_peaks_then_returns_dark() {
        let mut engine = engine();
        let half = engine.half_steps;

        let mut peak = Rgb::BLACK;
        for _ in 0..half {
            peak = engine.advance_step();
        }
        let peak_sum = peak.r as u16 + peak.g as u16 + peak.b as u16;
        assert!(peak_sum > 0, "peak should emit light");

        let mut last = peak;
        for _ in 0..half {
            last = engine.advance_step();
        }
        // Back at the trough: dither carries below one quantum emit
        // nothing.
        assert_eq!(last, Rgb::BLACK);
    }

    #[test]
    fn test_new_color_at_trough() {
        let mut engine = engine();
        let first = engine.base;
        // Each full cycle plus the wrap step crosses the trough once.
        let mut bases = Vec::new();
        for _ in 0..5 {
            for _ in 0..(2 * engine.half_steps + 1) {
                engine.advance_step();
            }
            bases.push(engine.base);
        }
        assert!(bases.iter().any(|&base| base != first));
    }

    #[test]
    fn test_tick_batches_elapsed_steps() {
        let mut engine = engine();
        let mut sink = RecordingSink::default();
        let start = engine.last_tick;

        // Three step intervals elapse: one apply, three steps.
        engine.tick(start + Duration::from_micros(1500), &mut sink);
        assert_eq!(sink.applied.len(), 1);
        assert_eq!(engine.step_index, 3);

        // Less than a step: nothing emitted, remainder carried.
        engine.tick(start + Duration::from_micros(1800), &mut sink);
        assert_eq!(sink.applied.len(), 1);
        assert_eq!(engine.carry_us, 300);
    }

    #[test]
    fn test_tick_caps_catch_up_to_one_cycle() {
        let mut engine = engine();
        let mut sink = RecordingSink::default();
        let start = engine.last_tick;

        // Hours of backlog still advance by at most one cycle.
        engine.tick(start + Duration::from_secs(3600), &mut sink);
        assert_eq!(sink.applied.len(), 1);
        assert!(engine.step_index <= 2 * engine.half_steps);
    }

    #[test]
    fn test_extreme_period_clamped_to_cycle_range() {
        let config = LedConfig {
            max_brightness: 10,
            breath_period_ms: 3_000_000_000,
            pulse_ms: 0,
            color: ColorMode::Vivid,
        };
        let mut engine = BreathEngine::new(&config, ColorPicker::seeded(ColorMode::Vivid, 7));
        assert_eq!(engine.half_steps, u32::MAX / 2);

        let mut sink = RecordingSink::default();
        let start = engine.last_tick;
        engine.tick(start + Duration::from_millis(1), &mut sink);
        assert_eq!(sink.applied.len(), 1);
        assert_eq!(engine.step_index, 1);

        let far = LedConfig {
            breath_period_ms: u64::MAX,
            ..config
        };
        let engine = BreathEngine::new(&far, ColorPicker::seeded(ColorMode::Vivid, 7));
        assert_eq!(engine.half_steps, u32::MAX / 2);
    }

    #[test]
    fn test_pulse_shape() {
        let mut engine = engine();
        let mut sink = RecordingSink::default();
        engine.pulse_once(&mut sink);

        let applied = &sink.applied;
        assert_eq!(applied.len(), 2 * (PULSE_STEPS as usize + 1));

        let sum = |c: &Rgb| c.r as u32 + c.g as u32 + c.b as u32;
        let peak = applied[PULSE_STEPS as usize];
        assert!(sum(&peak) > sum(&applied[0]));
        assert_eq!(*applied.last().unwrap(), Rgb::BLACK);

        // Idle breath resumes from the trough.
        assert_eq!(engine.step_index, 0);
    }

    #[test]
    fn test_brightness_cap_respected() {
        let mut engine = engine();
        for _ in 0..engine.half_steps {
            let color = engine.advance_step();
            // max_brightness 10 scales 255 down to at most 10 (plus
            // one dither quantum).
            assert!(color.r <= 11 && color.g <= 11 && color.b <= 11);
        }
    }
}
