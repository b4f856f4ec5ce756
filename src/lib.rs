//! # lvx-replay - replay Livox LVX point-cloud captures
//!
//! Reads a recorded multi-lidar `.lvx` capture on a background thread,
//! splits each frame into per-device packets, reconstructs calibrated points
//! in the shared reference frame and hands them to a [`FrameConsumer`].
//! Provides:
//! - LVX container reading and writing (V0 and V1 record layouts)
//! - Per-device extrinsic calibration from Euler angles
//! - A replay session with start gating, graceful stop and join-on-drop
//! - C FFI for integration with C/C++ viewers
//!
//! ## Quick Start
//! ```no_run
//! use lvx_replay::{ChannelConsumer, ReplaySession};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let (consumer, frames) = ChannelConsumer::bounded(64);
//! let mut session = ReplaySession::new(Arc::new(consumer));
//! session.init("capture.lvx").unwrap();
//! session.start().unwrap();
//!
//! while let Some(frame) = frames.recv_timeout(Duration::from_secs(1)) {
//!     let valid = frame.points.iter().filter(|p| p.valid).count();
//!     println!("lidar {} ts={} points={}", frame.device_handle, frame.timestamp, valid);
//! }
//! session.deinit().unwrap();
//! ```

pub mod error;
pub mod types;
pub mod protocol;
pub mod calibration;
pub mod decoder;
pub mod reconstruct;
pub mod source;
pub mod lvx;
pub mod consumer;
pub mod config;
pub mod session;
pub mod ffi;

pub use config::ReplayConfig;
pub use consumer::{ChannelConsumer, FrameConsumer, FrameReceiver, OwnedFrame, PointFrame};
pub use decoder::{FrameBuffer, FrameDecoder, SubPacket};
pub use error::{DecodeError, ReplayError};
pub use lvx::{LvxFile, LvxWriter};
pub use session::{ExitReason, ReplaySession, ReplayStats, SessionState};
pub use source::{CaptureSource, FrameStatus, MemorySource};
pub use types::*;

/// Result type alias for replay operations.
pub type Result<T> = std::result::Result<T, ReplayError>;
