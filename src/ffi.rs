//! C FFI layer for lvx-replay.
//!
//! Provides an opaque handle-based API for C/C++ consumers.
//! The generated C header is written to `include/lvx_replay.h` by cbindgen.

use crate::config::ReplayConfig;
use crate::consumer::{FrameConsumer, PointFrame};
use crate::error::LastError;
use crate::session::{ExitReason, ReplaySession};
use crate::types::PointRecord;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque replay handle for C consumers.
pub struct LvxReplay(ReplaySession);

/// Called on the reader thread for every reconstructed point packet.
///
/// `points` is valid only for the duration of the call.
pub type LvxFrameCallback = unsafe extern "C" fn(
    user_data: *mut c_void,
    device_handle: u8,
    timestamp: u64,
    points: *const PointRecord,
    count: usize,
);

/// Device table entry in C-compatible layout.
#[repr(C)]
pub struct LvxDeviceInfo {
    pub handle: u8,
    pub device_type: u8,
    /// Null-terminated broadcast code.
    pub broadcast_code: [c_char; 17],
    pub extrinsic_enabled: bool,
    /// [roll, pitch, yaw] in radians.
    pub euler: [f64; 3],
    /// [x, y, z] in meters.
    pub translation: [f64; 3],
    /// Rotation matrix, flat row-major (9 elements).
    pub rotation: [f64; 9],
}

struct UserData(*mut c_void);

// The C caller guarantees `user_data` may be used from the reader thread.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

struct CallbackConsumer {
    callback: LvxFrameCallback,
    user_data: UserData,
    ready: AtomicBool,
}

impl FrameConsumer for CallbackConsumer {
    fn initialize(&self) {
        self.ready.store(true, Ordering::Release);
    }

    fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn on_frame(&self, frame: &PointFrame<'_>) {
        unsafe {
            (self.callback)(
                self.user_data.0,
                frame.device_handle,
                frame.timestamp,
                frame.points.as_ptr(),
                frame.points.len(),
            )
        }
    }
}

/// Open an `.lvx` capture and prepare replay.
///
/// Frames are delivered to `callback` after `lvx_replay_start`.
/// Tuning is read from `LVX_*` environment variables.
/// Returns NULL on error (check lvx_last_error()).
///
/// # Safety
/// `path` must be a valid null-terminated string, or null. `user_data` must
/// remain valid until `lvx_replay_close` returns.
#[no_mangle]
pub unsafe extern "C" fn lvx_replay_open(
    path: *const c_char,
    callback: Option<LvxFrameCallback>,
    user_data: *mut c_void,
) -> *mut LvxReplay {
    LAST_ERROR.clear();
    if path.is_null() {
        LAST_ERROR.set_message(format_args!("path is null"));
        return std::ptr::null_mut();
    }
    let Some(callback) = callback else {
        LAST_ERROR.set_message(format_args!("callback is null"));
        return std::ptr::null_mut();
    };
    let path = CStr::from_ptr(path).to_string_lossy().into_owned();

    let consumer = CallbackConsumer {
        callback,
        user_data: UserData(user_data),
        ready: AtomicBool::new(false),
    };
    let mut session = ReplaySession::with_config(Arc::new(consumer), ReplayConfig::from_env());
    match session.init(&path) {
        Ok(()) => Box::into_raw(Box::new(LvxReplay(session))),
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Start streaming frames. Returns 0 on success, -1 on error.
///
/// # Safety
/// `replay` must be a valid replay pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn lvx_replay_start(replay: *mut LvxReplay) -> c_int {
    if replay.is_null() {
        return -1;
    }
    let replay = &mut *replay;
    match replay.0.start() {
        Ok(()) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Wait for the replay to end.
/// `timeout_ms`: timeout in milliseconds (-1 = wait forever).
///
/// Returns 0 when the capture was fully read, 1 when stopped, -2 on a read
/// failure and -1 on timeout or invalid arguments.
///
/// # Safety
/// `replay` must be a valid replay pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn lvx_replay_wait_exit(replay: *mut LvxReplay, timeout_ms: c_int) -> c_int {
    if replay.is_null() {
        return -1;
    }
    let replay = &mut *replay;
    let timeout = if timeout_ms < 0 {
        Duration::MAX
    } else {
        Duration::from_millis(timeout_ms as u64)
    };
    match replay.0.wait_exit(timeout) {
        Some(ExitReason::EndOfStream) => 0,
        Some(ExitReason::Stopped) => 1,
        Some(ExitReason::SourceError(msg)) => {
            LAST_ERROR.set_message(format_args!("Capture read failed: {}", msg));
            -2
        }
        None => -1,
    }
}

/// Capture read progress in percent, or -1 for a null handle.
///
/// # Safety
/// `replay` must be a valid replay pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn lvx_replay_progress(replay: *const LvxReplay) -> c_int {
    if replay.is_null() {
        return -1;
    }
    (*replay).0.read_progress() as c_int
}

/// Number of devices in the capture, or -1 for a null handle.
///
/// # Safety
/// `replay` must be a valid replay pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn lvx_replay_device_count(replay: *const LvxReplay) -> c_int {
    if replay.is_null() {
        return -1;
    }
    (*replay).0.devices().len() as c_int
}

/// Copy the device table entry at `index` into `out`.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `replay` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn lvx_replay_device_info(
    replay: *const LvxReplay,
    index: c_int,
    out: *mut LvxDeviceInfo,
) -> c_int {
    if replay.is_null() || out.is_null() || index < 0 {
        return -1;
    }
    let Some(dev) = (*replay).0.devices().get(index as usize) else {
        LAST_ERROR.set_message(format_args!("no device at index {}", index));
        return -1;
    };

    let mut broadcast_code = [0 as c_char; 17];
    for (dst, &b) in broadcast_code.iter_mut().zip(dev.info.broadcast_code.iter()) {
        *dst = b as c_char;
    }
    let r = &dev.extrinsic.rotation;
    out.write(LvxDeviceInfo {
        handle: dev.handle,
        device_type: dev.info.device_type.as_u8(),
        broadcast_code,
        extrinsic_enabled: dev.extrinsic.enabled,
        euler: dev.extrinsic.euler,
        translation: dev.extrinsic.translation,
        rotation: [
            r[0][0], r[0][1], r[0][2], r[1][0], r[1][1], r[1][2], r[2][0], r[2][1], r[2][2],
        ],
    });
    0
}

/// Stop the replay, join its threads and free the handle.
///
/// # Safety
/// `replay` must be a pointer returned by `lvx_replay_open`, or null.
#[no_mangle]
pub unsafe extern "C" fn lvx_replay_close(replay: *mut LvxReplay) {
    if !replay.is_null() {
        let mut replay = Box::from_raw(replay);
        if let Err(e) = replay.0.deinit() {
            LAST_ERROR.set(&e);
        }
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next lvx-replay API call.
#[no_mangle]
pub extern "C" fn lvx_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lvx::LvxWriter;
    use crate::protocol::{encode_extend_points, encode_record, ExtendRawPoint};
    use crate::types::{DataType, DeviceRecord, FileVersion};
    use std::ffi::CString;
    use std::sync::atomic::AtomicUsize;

    unsafe extern "C" fn count_points(
        user_data: *mut c_void,
        _device_handle: u8,
        _timestamp: u64,
        points: *const PointRecord,
        count: usize,
    ) {
        let counter = &*(user_data as *const AtomicUsize);
        let points = std::slice::from_raw_parts(points, count);
        counter.fetch_add(points.iter().filter(|p| p.valid).count(), Ordering::SeqCst);
    }

    #[test]
    fn test_null_arguments() {
        let replay = unsafe { lvx_replay_open(std::ptr::null(), None, std::ptr::null_mut()) };
        assert!(replay.is_null());
        assert_eq!(unsafe { lvx_replay_start(std::ptr::null_mut()) }, -1);
        assert_eq!(unsafe { lvx_replay_wait_exit(std::ptr::null_mut(), 0) }, -1);
        assert_eq!(unsafe { lvx_replay_progress(std::ptr::null()) }, -1);
        assert_eq!(unsafe { lvx_replay_device_count(std::ptr::null()) }, -1);
        unsafe { lvx_replay_close(std::ptr::null_mut()) };
    }

    #[test]
    fn test_replay_through_callback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffi.lvx");
        let device = DeviceRecord {
            device_type: 1,
            broadcast_code: *b"1PQDH5B00100041\0",
            hub_code: [0; 16],
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            extrinsic_enabled: true,
        };
        let points = vec![
            ExtendRawPoint {
                x: 100,
                y: 200,
                z: 300,
                reflectivity: 1,
                tag: 0
            };
            96
        ];
        let record = encode_record(
            FileVersion::V1,
            0,
            DataType::ExtendCartesian,
            0,
            0,
            &encode_extend_points(&points),
        );
        let mut writer = LvxWriter::create(&path, FileVersion::V1, &[device]).unwrap();
        writer.write_frame(&record).unwrap();
        writer.finish().unwrap();

        let missing = CString::new(dir.path().join("missing.lvx").to_str().unwrap()).unwrap();
        let replay =
            unsafe { lvx_replay_open(missing.as_ptr(), Some(count_points), std::ptr::null_mut()) };
        assert!(replay.is_null());
        let msg = unsafe { CStr::from_ptr(lvx_last_error()) };
        assert!(msg.to_string_lossy().contains("missing.lvx"));

        let counter = AtomicUsize::new(0);
        let c_path = CString::new(path.to_str().unwrap()).unwrap();
        let replay = unsafe {
            lvx_replay_open(
                c_path.as_ptr(),
                Some(count_points),
                &counter as *const AtomicUsize as *mut c_void,
            )
        };
        assert!(!replay.is_null());
        unsafe {
            assert_eq!(lvx_replay_device_count(replay), 1);
            let mut info = std::mem::zeroed::<LvxDeviceInfo>();
            assert_eq!(lvx_replay_device_info(replay, 0, &mut info), 0);
            assert_eq!(info.device_type, 1);
            assert_eq!(info.rotation[0], 1.0);
            assert_eq!(lvx_replay_device_info(replay, 5, &mut info), -1);

            // Let the priming thread mark the consumer ready.
            std::thread::sleep(Duration::from_millis(50));
            assert_eq!(lvx_replay_start(replay), 0);
            assert_eq!(lvx_replay_wait_exit(replay, 5000), 0);
            assert_eq!(lvx_replay_progress(replay), 100);
            lvx_replay_close(replay);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 96);
    }
}
