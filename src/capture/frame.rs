//! Frame types for the acquire-and-stage step.
//!
//! A [`SensorFrame`] borrows the driver-owned buffer and exists only
//! between acquisition and staging; dropping it returns the buffer to
//! the driver. A [`StagingBuffer`] is the owned RAM copy that survives
//! the frame and feeds the durable write.

use thiserror::Error;

/// Errors that can occur while staging a frame.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("frame is empty")]
    EmptyFrame,
    #[error("frame of {len} bytes exceeds the staging cap of {cap} bytes")]
    FrameTooLarge { len: usize, cap: usize },
    #[error("staging allocation of {len} bytes failed")]
    AllocationFailed { len: usize },
}

/// A single captured frame, borrowed from the source's driver buffer.
///
/// The borrow keeps the source unusable until the frame is dropped,
/// which models the one-outstanding-buffer contract of camera drivers.
#[derive(Clone, Copy)]
pub struct SensorFrame<'a> {
    /// Encoded image bytes owned by the driver.
    data: &'a [u8],
    /// Monotonic acquisition sequence number.
    sequence: u64,
}

impl<'a> SensorFrame<'a> {
    /// Wraps a driver buffer in a frame.
    pub fn new(data: &'a [u8], sequence: u64) -> Self {
        Self { data, sequence }
    }

    /// Returns the encoded image bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.data
    }

    /// Returns the frame length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the frame carries no data.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the acquisition sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl std::fmt::Debug for SensorFrame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorFrame")
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// An owned copy of a frame, staged in RAM for the durable write.
#[derive(Debug)]
pub struct StagingBuffer {
    data: Vec<u8>,
    sequence: u64,
}

impl StagingBuffer {
    /// Copies a frame into an owned buffer with fallible allocation.
    ///
    /// Frames above `cap` are refused outright. An allocation failure
    /// aborts the cycle instead of aborting the process, so a
    /// memory-starved daemon degrades to skipped cycles.
    pub fn stage(frame: &SensorFrame<'_>, cap: usize) -> Result<Self, StagingError> {
        if frame.is_empty() {
            return Err(StagingError::EmptyFrame);
        }
        let len = frame.len();
        if len > cap {
            return Err(StagingError::FrameTooLarge { len, cap });
        }

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| StagingError::AllocationFailed { len })?;
        data.extend_from_slice(frame.bytes());

        Ok(Self {
            data,
            sequence: frame.sequence(),
        })
    }

    /// Returns the staged image bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the staged length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer is empty (never the case after `stage`).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the sequence number inherited from the frame.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
