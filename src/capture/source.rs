//! Frame source abstraction.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing for both real camera input and a synthetic source that
//! needs no device at all.

use super::SensorFrame;
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;

/// Errors that can occur during frame source operations.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open source: {0}")]
    OpenFailed(String),
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    #[error("source not initialized")]
    NotInitialized,
    #[error("source unsupported in this build: {0}")]
    Unsupported(String),
}

/// Trait for frame source implementations.
///
/// `acquire` hands out a frame that borrows the source's internal
/// buffer; the borrow must end (the copy must be staged) before the
/// source can be used again. `reinitialize` is the recovery path after
/// a failed acquisition: tear the device down and bring it back up.
pub trait FrameSource {
    /// Acquires a single encoded frame from the device buffer.
    fn acquire(&mut self) -> Result<SensorFrame<'_>, SourceError>;

    /// Tears down and reopens the device after a failure.
    fn reinitialize(&mut self) -> Result<(), SourceError>;

    /// Checks if the source is currently usable.
    fn is_ready(&self) -> bool;
}

/// Synthetic frame source that renders a moving test pattern.
///
/// Produces a JPEG-encoded gradient with speckle noise that shifts
/// every frame, so consecutive captures are visibly distinct. Useful
/// on machines without a camera and as the default demo source.
#[derive(Debug)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    quality: u8,
    sequence: u64,
    ready: bool,
    scratch: Vec<u8>,
}

impl SyntheticCamera {
    /// Creates a ready-to-use synthetic source.
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality,
            sequence: 0,
            ready: true,
            scratch: Vec::new(),
        }
    }

    fn render_pattern(&self) -> image::RgbImage {
        let t = self.sequence as u32;
        let height = self.height.max(1);
        image::RgbImage::from_fn(self.width, self.height, |x, y| {
            // Diagonal gradient swept by the sequence counter.
            let phase = x.wrapping_add(y).wrapping_add(t.wrapping_mul(13));
            let r = (phase % 256) as u8;
            let g = ((y * 255) / height) as u8;
            let b = 255u8.wrapping_sub(r);
            let n = speckle(x, y, t);
            image::Rgb([
                r.saturating_add(n),
                g.saturating_add(n / 2),
                b.saturating_sub(n),
            ])
        })
    }
}

/// Cheap per-pixel hash used as deterministic sensor noise.
fn speckle(x: u32, y: u32, t: u32) -> u8 {
    let mut h = x
        .wrapping_mul(0x9E37_79B1)
        ^ y.wrapping_mul(0x85EB_CA77)
        ^ t.wrapping_mul(0xC2B2_AE3D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x2545_F491);
    h ^= h >> 13;
    (h & 0x1F) as u8
}

impl FrameSource for SyntheticCamera {
    fn acquire(&mut self) -> Result<SensorFrame<'_>, SourceError> {
        if !self.ready {
            return Err(SourceError::NotInitialized);
        }

        let image = self.render_pattern();
        self.scratch.clear();
        let mut encoder = JpegEncoder::new_with_quality(&mut self.scratch, self.quality);
        encoder
            .encode_image(&image)
            .map_err(|e| SourceError::CaptureFailed(e.to_string()))?;

        self.sequence += 1;
        Ok(SensorFrame::new(&self.scratch, self.sequence))
    }

    fn reinitialize(&mut self) -> Result<(), SourceError> {
        self.ready = true;
        tracing::debug!("Synthetic source reinitialized");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_produces_jpeg() {
        let mut source = SyntheticCamera::new(64, 48, 75);
        assert!(source.is_ready());

        let frame = source.acquire().unwrap();
        assert!(frame.len() > 2);
        // JPEG start-of-image marker
        assert_eq!(&frame.bytes()[..2], &[0xFF, 0xD8]);
        assert_eq!(frame.sequence(), 1);
    }

    #[test]
    fn test_sequence_advances_per_acquire() {
        let mut source = SyntheticCamera::new(32, 32, 50);
        let first = source.acquire().unwrap().sequence();
        let second = source.acquire().unwrap().sequence();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_consecutive_frames_differ() {
        let mut source = SyntheticCamera::new(64, 48, 75);
        let first = source.acquire().unwrap().bytes().to_vec();
        let second = source.acquire().unwrap().bytes().to_vec();
        assert_ne!(first, second);
    }

    #[test]
    fn test_reinitialize_restores_readiness() {
        let mut source = SyntheticCamera::new(32, 32, 50);
        source.ready = false;
        assert!(matches!(
            source.acquire(),
            Err(SourceError::NotInitialized)
        ));

        source.reinitialize().unwrap();
        assert!(source.acquire().is_ok());
    }
}
