//! Status LED color selection.
//!
//! Two strategies. Vivid keeps the channel sum constant so perceived
//! brightness stays level while hue swings freely. Pastel-hue walks a
//! perceptual color space instead: fixed lightness and chroma in LCH,
//! random hue, converted through Lab and XYZ (D65) to companded sRGB.

use crate::config::ColorMode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// All channels off.
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Creates a color from channel values.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Picks a new base color for each breath cycle.
pub struct ColorPicker {
    mode: ColorMode,
    rng: StdRng,
}

impl ColorPicker {
    /// Creates a picker seeded from the system clock.
    pub fn new(mode: ColorMode) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::seeded(mode, seed)
    }

    /// Creates a picker with a fixed seed, for deterministic sequences.
    pub fn seeded(mode: ColorMode, seed: u64) -> Self {
        Self {
            mode,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Picks the next base color.
    pub fn next(&mut self) -> Rgb {
        match self.mode {
            ColorMode::Vivid => vivid(&mut self.rng),
            ColorMode::PastelHue => pastel(&mut self.rng),
        }
    }
}

/// Channel sum of every vivid color; keeps total emission constant.
const VIVID_SUM: u16 = 380;

fn vivid(rng: &mut StdRng) -> Rgb {
    let dominant: u16 = rng.random_range(181..=255);
    let rest = VIVID_SUM - dominant;
    let second: u16 = rng.random_range(0..=rest);
    let third = rest - second;

    let (a, b, c) = (dominant as u8, second as u8, third as u8);
    // A random permutation decides which channel dominates.
    match rng.random_range(0..6u8) {
        0 => Rgb::new(a, b, c),
        1 => Rgb::new(a, c, b),
        2 => Rgb::new(b, a, c),
        3 => Rgb::new(c, a, b),
        4 => Rgb::new(b, c, a),
        _ => Rgb::new(c, b, a),
    }
}

const PASTEL_LIGHTNESS: f32 = 85.0;
const PASTEL_CHROMA: f32 = 60.0;

fn pastel(rng: &mut StdRng) -> Rgb {
    let hue = rng.random_range(0.0..360.0f32);
    lch_to_srgb(PASTEL_LIGHTNESS, PASTEL_CHROMA, hue)
}

/// Converts an LCH color (D65 white point) to companded 8-bit sRGB.
///
/// Out-of-gamut values are clamped per channel, which slightly shifts
/// hue at the gamut edge but never produces wraparound artifacts.
pub fn lch_to_srgb(l: f32, c: f32, h_degrees: f32) -> Rgb {
    // LCH -> Lab
    let h_radians = h_degrees.to_radians();
    let a = c * h_radians.cos();
    let b = c * h_radians.sin();

    // Lab -> XYZ
    let fy = (l + 16.0) / 116.0;
    let fx = a / 500.0 + fy;
    let fz = fy - b / 200.0;

    const EPSILON: f32 = 0.008856;
    const KAPPA: f32 = 7.787;
    const OFFSET: f32 = 16.0 / 116.0;
    let f_inverse = |t: f32| {
        let t3 = t * t * t;
        if t3 > EPSILON {
            t3
        } else {
            (t - OFFSET) / KAPPA
        }
    };

    // D65 reference white, scaled to unit Y.
    let x = 95.047 * f_inverse(fx) / 100.0;
    let y = 100.0 * f_inverse(fy) / 100.0;
    let z = 108.883 * f_inverse(fz) / 100.0;

    // XYZ -> linear sRGB
    let r_linear = 3.2406 * x - 1.5372 * y - 0.4986 * z;
    let g_linear = -0.9689 * x + 1.8758 * y + 0.0415 * z;
    let b_linear = 0.0557 * x - 0.2040 * y + 1.0570 * z;

    let compand = |v: f32| {
        let v = v.clamp(0.0, 1.0);
        if v <= 0.003_130_8 {
            12.92 * v
        } else {
            1.055 * v.powf(1.0 / 2.4) - 0.055
        }
    };
    let to_byte = |v: f32| (compand(v) * 255.0).round() as u8;

    Rgb::new(to_byte(r_linear), to_byte(g_linear), to_byte(b_linear))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_picker_is_deterministic() {
        let mut a = ColorPicker::seeded(ColorMode::Vivid, 99);
        let mut b = ColorPicker::seeded(ColorMode::Vivid, 99);
        for _ in 0..16 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn test_vivid_sum_is_constant() {
        let mut picker = ColorPicker::seeded(ColorMode::Vivid, 1);
        for _ in 0..256 {
            let color = picker.next();
            let sum = color.r as u16 + color.g as u16 + color.b as u16;
            assert_eq!(sum, VIVID_SUM);
        }
    }

    #[test]
    fn test_vivid_has_dominant_channel() {
        let mut picker = ColorPicker::seeded(ColorMode::Vivid, 2);
        for _ in 0..256 {
            let color = picker.next();
            let max = color.r.max(color.g).max(color.b);
            assert!(max >= 181);
        }
    }

    #[test]
    fn test_lch_neutral_axis_is_gray() {
        // Zero chroma means no hue: all channels should agree closely.
        let gray = lch_to_srgb(50.0, 0.0, 123.0);
        let max = gray.r.max(gray.g).max(gray.b);
        let min = gray.r.min(gray.g).min(gray.b);
        assert!(max - min <= 2, "not gray: {gray:?}");
    }

    #[test]
    fn test_lch_extremes() {
        let white = lch_to_srgb(100.0, 0.0, 0.0);
        assert!(white.r >= 250 && white.g >= 250 && white.b >= 250);

        let black = lch_to_srgb(0.0, 0.0, 0.0);
        assert!(black.r <= 5 && black.g <= 5 && black.b <= 5);
    }

    #[test]
    fn test_lch_hue_changes_output() {
        let warm = lch_to_srgb(PASTEL_LIGHTNESS, PASTEL_CHROMA, 30.0);
        let cool = lch_to_srgb(PASTEL_LIGHTNESS, PASTEL_CHROMA, 210.0);
        assert_ne!(warm, cool);
        // Hue 30 leans red, hue 210 leans blue.
        assert!(warm.r > cool.r);
        assert!(cool.b > warm.b);
    }

    #[test]
    fn test_pastel_colors_stay_bright() {
        let mut picker = ColorPicker::seeded(ColorMode::PastelHue, 3);
        for _ in 0..64 {
            let color = picker.next();
            // Fixed high lightness keeps every channel off the floor.
            assert!(color.r > 60 || color.g > 60 || color.b > 60);
        }
    }
}
