//! Real camera input via nokhwa.
//!
//! Only compiled with the `camera` feature. The device streams MJPEG,
//! so each frame arrives already encoded and is copied into a reusable
//! scratch buffer without decoding.

use super::{FrameSource, SensorFrame, SourceError};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

/// Camera-backed frame source.
pub struct NokhwaCamera {
    index: u32,
    width: u32,
    height: u32,
    fps: u32,
    device: Option<Camera>,
    scratch: Vec<u8>,
    sequence: u64,
}

impl NokhwaCamera {
    /// Creates an unopened camera source for the given device index.
    ///
    /// Call [`FrameSource::reinitialize`] to open the stream; a device
    /// missing at startup is retried through the same path.
    pub fn new(index: u32, width: u32, height: u32, fps: u32) -> Self {
        Self {
            index,
            width,
            height,
            fps,
            device: None,
            scratch: Vec::new(),
            sequence: 0,
        }
    }

    fn open(&mut self) -> Result<(), SourceError> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new_from(self.width, self.height, FrameFormat::MJPEG, self.fps),
        ));
        let mut device = Camera::new(CameraIndex::Index(self.index), requested)
            .map_err(|e| SourceError::OpenFailed(e.to_string()))?;
        device
            .open_stream()
            .map_err(|e| SourceError::OpenFailed(e.to_string()))?;

        let negotiated = device.camera_format();
        tracing::info!(index = self.index, format = ?negotiated, "Camera stream opened");

        self.device = Some(device);
        Ok(())
    }
}

impl FrameSource for NokhwaCamera {
    fn acquire(&mut self) -> Result<SensorFrame<'_>, SourceError> {
        let device = self.device.as_mut().ok_or(SourceError::NotInitialized)?;
        let frame = device
            .frame()
            .map_err(|e| SourceError::CaptureFailed(e.to_string()))?;

        if frame.source_frame_format() != FrameFormat::MJPEG {
            return Err(SourceError::CaptureFailed(format!(
                "unexpected frame format {:?}",
                frame.source_frame_format()
            )));
        }

        self.scratch.clear();
        self.scratch.extend_from_slice(frame.buffer());
        self.sequence += 1;
        Ok(SensorFrame::new(&self.scratch, self.sequence))
    }

    fn reinitialize(&mut self) -> Result<(), SourceError> {
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.stop_stream() {
                tracing::debug!(error = %e, "Stopping stale camera stream failed");
            }
        }
        self.open()
    }

    fn is_ready(&self) -> bool {
        self.device.is_some()
    }
}

impl std::fmt::Debug for NokhwaCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NokhwaCamera")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("open", &self.device.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unopened_camera_not_ready() {
        let camera = NokhwaCamera::new(0, 640, 480, 15);
        assert!(!camera.is_ready());
    }

    #[test]
    fn test_acquire_without_open_fails() {
        let mut camera = NokhwaCamera::new(0, 640, 480, 15);
        assert!(matches!(
            camera.acquire(),
            Err(SourceError::NotInitialized)
        ));
    }
}
