use std::fmt;

/// Errors raised while splitting a frame buffer into sub-packets.
///
/// A decode error invalidates the frame it was found in; the session drops
/// that frame and keeps reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Truncated record at offset {offset}: needs {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Unknown data type {data_type} at offset {offset}")]
    UnknownDataType { offset: usize, data_type: u8 },
}

/// Errors that can occur while opening or replaying a capture.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Failed to open capture {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid capture header: {0}")]
    InvalidHeader(String),

    #[error("Unsupported device count {count} (expected 1..={max})")]
    DeviceCount { count: usize, max: usize },

    #[error("Replay session is already initialized")]
    AlreadyInitialized,

    #[error("Replay session is not initialized")]
    NotInitialized,

    #[error("Frame decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Capture read failed: {0}")]
    SourceRead(String),

    #[error("Frame of {size} bytes exceeds buffer capacity of {capacity} bytes")]
    FrameTooLarge { size: usize, capacity: usize },

    #[error("Failed to spawn {0} thread")]
    ThreadSpawn(String),
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &ReplayError) {
        self.set_message(format_args!("{}", err));
    }

    pub fn set_message(&self, args: fmt::Arguments<'_>) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
            msg.push_str(&fmt::format(args));
            msg.push('\0');
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
