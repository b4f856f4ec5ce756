//! Capture source abstraction.
//!
//! A [`CaptureSource`] hands the session a device table and then one frame of
//! packets per call. [`crate::lvx::LvxFile`] reads recorded `.lvx` captures;
//! [`MemorySource`] replays frames built in memory.

use crate::decoder::FrameBuffer;
use crate::types::{DeviceRecord, FileVersion};
use crate::{ReplayError, Result};

/// Outcome of a successful frame read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The buffer holds a new frame.
    Ok,
    /// No frames remain.
    AtEnd,
}

/// A previously recorded multi-device capture.
pub trait CaptureSource: Send {
    /// Record layout of the capture's packets.
    fn file_version(&self) -> FileVersion;

    fn device_count(&self) -> usize;

    /// Device table entry at `index` (0-based).
    fn device_info(&self, index: usize) -> Result<DeviceRecord>;

    /// Read the next frame's packets into `buffer`, setting its data size.
    ///
    /// Blocks until the frame is read. Errors end the replay.
    fn next_frame(&mut self, buffer: &mut FrameBuffer) -> Result<FrameStatus>;

    /// Percentage of the capture consumed so far.
    fn read_progress(&self) -> u8;

    fn close(&mut self);
}

/// In-memory capture source replaying pre-built frames.
pub struct MemorySource {
    version: FileVersion,
    devices: Vec<DeviceRecord>,
    frames: Vec<Vec<u8>>,
    index: usize,
    fail_at: Option<usize>,
    closed: bool,
}

impl MemorySource {
    pub fn new(version: FileVersion, devices: Vec<DeviceRecord>, frames: Vec<Vec<u8>>) -> Self {
        Self {
            version,
            devices,
            frames,
            index: 0,
            fail_at: None,
            closed: false,
        }
    }

    /// Make the read of frame `index` fail instead of returning data.
    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Number of `next_frame` calls that returned a frame.
    pub fn frames_read(&self) -> usize {
        self.index
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl CaptureSource for MemorySource {
    fn file_version(&self) -> FileVersion {
        self.version
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device_info(&self, index: usize) -> Result<DeviceRecord> {
        self.devices
            .get(index)
            .cloned()
            .ok_or_else(|| ReplayError::SourceRead(format!("no device at index {}", index)))
    }

    fn next_frame(&mut self, buffer: &mut FrameBuffer) -> Result<FrameStatus> {
        if self.closed {
            return Err(ReplayError::SourceRead("source is closed".into()));
        }
        if self.fail_at == Some(self.index) {
            return Err(ReplayError::SourceRead(format!(
                "injected failure at frame {}",
                self.index
            )));
        }
        let Some(frame) = self.frames.get(self.index) else {
            buffer.clear();
            return Ok(FrameStatus::AtEnd);
        };
        if !buffer.copy_from(frame) {
            return Err(ReplayError::FrameTooLarge {
                size: frame.len(),
                capacity: buffer.capacity(),
            });
        }
        self.index += 1;
        Ok(FrameStatus::Ok)
    }

    fn read_progress(&self) -> u8 {
        if self.frames.is_empty() {
            return 100;
        }
        (self.index * 100 / self.frames.len()) as u8
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
