//! Replay session: owns the capture source, the device table and the two
//! background threads that feed reconstructed frames to a consumer.
//!
//! Lifecycle: `init` → `start` → (end of capture or `deinit`). The reader
//! thread blocks on a start gate after `init` and never reads a frame before
//! `start`. It is the only thread that touches the frame buffer.

use crate::calibration;
use crate::config::ReplayConfig;
use crate::consumer::{FrameConsumer, PointFrame};
use crate::decoder::{self, FrameBuffer};
use crate::lvx::LvxFile;
use crate::reconstruct::{self, Reconstructed};
use crate::source::{CaptureSource, FrameStatus};
use crate::types::{
    ConnectState, DataSource, DeviceEntry, DeviceInfo, DeviceType, FileVersion, PointRecord,
};
use crate::{ReplayError, Result};
use crossbeam_channel::{Receiver, Sender};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    /// Threads spawned, reader waiting for `start`.
    Initialized,
    Streaming,
    /// Deinitialized; threads joined and buffer released.
    Exited,
}

/// Why the reader loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The capture ran out of frames.
    EndOfStream,
    /// Stopped by `deinit` or drop.
    Stopped,
    /// The capture source failed.
    SourceError(String),
}

/// Counters updated by the reader thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub frames_read: u64,
    /// Frames dropped because their buffer failed to decode.
    pub frames_dropped: u64,
    /// Point packets handed to the consumer.
    pub packets_forwarded: u64,
    /// Point packets reconstructed while the consumer was not ready.
    pub packets_missed: u64,
}

#[derive(Default)]
struct Shared {
    stop: AtomicBool,
    exit_requested: AtomicBool,
    progress: AtomicU8,
    frames_read: AtomicU64,
    frames_dropped: AtomicU64,
    packets_forwarded: AtomicU64,
    packets_missed: AtomicU64,
}

/// Resources the reader thread hands back when it finishes.
struct ReaderParts {
    source: Box<dyn CaptureSource>,
    buffer: FrameBuffer,
}

/// Streams a recorded capture to a [`FrameConsumer`].
pub struct ReplaySession {
    consumer: Arc<dyn FrameConsumer>,
    config: ReplayConfig,
    state: SessionState,
    version: Option<FileVersion>,
    devices: Arc<[DeviceEntry]>,
    shared: Arc<Shared>,
    start_gate: Option<Sender<()>>,
    exit_rx: Option<Receiver<ExitReason>>,
    exit_reason: Option<ExitReason>,
    reader: Option<JoinHandle<ReaderParts>>,
    primer: Option<JoinHandle<()>>,
}

impl ReplaySession {
    pub fn new(consumer: Arc<dyn FrameConsumer>) -> Self {
        Self::with_config(consumer, ReplayConfig::default())
    }

    pub fn with_config(consumer: Arc<dyn FrameConsumer>, config: ReplayConfig) -> Self {
        Self {
            consumer,
            config,
            state: SessionState::Uninitialized,
            version: None,
            devices: Arc::from(Vec::new()),
            shared: Arc::new(Shared::default()),
            start_gate: None,
            exit_rx: None,
            exit_reason: None,
            reader: None,
            primer: None,
        }
    }

    /// Open an `.lvx` capture and prepare the replay threads.
    pub fn init<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.ensure_not_initialized()?;
        let source = LvxFile::open(path)?;
        self.init_with_source(Box::new(source))
    }

    /// Prepare the replay threads for an already-open capture source.
    ///
    /// On failure no thread is spawned and no frame buffer is allocated.
    pub fn init_with_source(&mut self, mut source: Box<dyn CaptureSource>) -> Result<()> {
        self.ensure_not_initialized()?;

        let version = source.file_version();
        let count = source.device_count();
        let max = self.config.max_devices.min(u8::MAX as usize + 1);
        if count == 0 || count > max {
            source.close();
            log::error!("Device count error in capture: {}", count);
            return Err(ReplayError::DeviceCount { count, max });
        }

        let devices = match build_device_table(&*source, version, count) {
            Ok(devices) => devices,
            Err(e) => {
                source.close();
                return Err(e);
            }
        };
        log::info!("Capture has {} lidars ({:?} layout)", count, version);

        let buffer = FrameBuffer::for_packets(self.config.max_packets_per_frame);
        let shared = Arc::new(Shared::default());
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);
        let (exit_tx, exit_rx) = crossbeam_channel::bounded::<ExitReason>(1);

        let forwarder = Forwarder {
            devices: devices.clone(),
            consumer: self.consumer.clone(),
            packet_interval: self.config.packet_interval,
            shared: shared.clone(),
            scratch: Vec::new(),
            faults_reported: vec![false; devices.len()],
        };
        let reader_shared = shared.clone();
        let reader = std::thread::Builder::new()
            .name("lvx-reader".into())
            .spawn(move || {
                reader_loop(
                    source,
                    buffer,
                    version,
                    forwarder,
                    gate_rx,
                    exit_tx,
                    reader_shared,
                )
            })
            .map_err(|e| {
                log::error!("Failed to spawn reader thread: {}", e);
                ReplayError::ThreadSpawn("reader".into())
            })?;

        let consumer = self.consumer.clone();
        let primer = match std::thread::Builder::new()
            .name("lvx-primer".into())
            .spawn(move || {
                consumer.initialize();
                log::debug!("Consumer initialized");
            }) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to spawn consumer priming thread: {}", e);
                shared.stop.store(true, Ordering::Release);
                drop(gate_tx);
                if let Ok(mut parts) = reader.join() {
                    parts.source.close();
                }
                return Err(ReplayError::ThreadSpawn("consumer priming".into()));
            }
        };

        self.version = Some(version);
        self.devices = devices;
        self.shared = shared;
        self.start_gate = Some(gate_tx);
        self.exit_rx = Some(exit_rx);
        self.exit_reason = None;
        self.reader = Some(reader);
        self.primer = Some(primer);
        self.state = SessionState::Initialized;
        Ok(())
    }

    /// Open the start gate; the reader begins pulling frames.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Uninitialized | SessionState::Exited => Err(ReplayError::NotInitialized),
            SessionState::Streaming => {
                log::debug!("Replay already started");
                Ok(())
            }
            SessionState::Initialized => {
                if let Some(gate) = &self.start_gate {
                    let _ = gate.try_send(());
                }
                self.state = SessionState::Streaming;
                Ok(())
            }
        }
    }

    /// Stop the reader, join both threads, close the source and release the
    /// frame buffer.
    ///
    /// Waits for an in-flight frame read to return; stopping takes effect at
    /// the next iteration boundary.
    pub fn deinit(&mut self) -> Result<()> {
        if !self.is_initialized() {
            log::warn!("Replay session is not initialized");
            return Err(ReplayError::NotInitialized);
        }
        self.shutdown();
        self.state = SessionState::Exited;
        log::info!("Replay session deinitialized");
        Ok(())
    }

    fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        // Dropping the gate releases a reader that was never started.
        drop(self.start_gate.take());

        if let Some(reader) = self.reader.take() {
            match reader.join() {
                Ok(mut parts) => {
                    parts.source.close();
                    drop(parts.buffer);
                }
                Err(_) => log::error!("Reader thread panicked"),
            }
        }
        if let Some(primer) = self.primer.take() {
            if primer.join().is_err() {
                log::error!("Consumer priming thread panicked");
            }
        }
        if let Some(rx) = self.exit_rx.take() {
            if let Ok(reason) = rx.try_recv() {
                self.exit_reason.get_or_insert(reason);
            }
        }
    }

    fn ensure_not_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            log::warn!("Replay session is already initialized");
            return Err(ReplayError::AlreadyInitialized);
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        matches!(
            self.state,
            SessionState::Initialized | SessionState::Streaming
        )
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Device table built at init. Empty before init.
    pub fn devices(&self) -> &[DeviceEntry] {
        &self.devices
    }

    pub fn file_version(&self) -> Option<FileVersion> {
        self.version
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Capture read progress in percent.
    pub fn read_progress(&self) -> u8 {
        self.shared.progress.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> ReplayStats {
        ReplayStats {
            frames_read: self.shared.frames_read.load(Ordering::Relaxed),
            frames_dropped: self.shared.frames_dropped.load(Ordering::Relaxed),
            packets_forwarded: self.shared.packets_forwarded.load(Ordering::Relaxed),
            packets_missed: self.shared.packets_missed.load(Ordering::Relaxed),
        }
    }

    /// True once the reader loop has ended, for whatever reason.
    pub fn is_exit_requested(&self) -> bool {
        self.shared.exit_requested.load(Ordering::Acquire)
    }

    /// Wait for the reader loop to end. Returns `None` on timeout.
    pub fn wait_exit(&mut self, timeout: Duration) -> Option<ExitReason> {
        if let Some(reason) = &self.exit_reason {
            return Some(reason.clone());
        }
        let reason = self.exit_rx.as_ref()?.recv_timeout(timeout).ok()?;
        self.exit_reason = Some(reason.clone());
        Some(reason)
    }

    /// Why the reader loop ended, if it has and the reason was collected.
    pub fn exit_reason(&self) -> Option<&ExitReason> {
        self.exit_reason.as_ref()
    }
}

impl Drop for ReplaySession {
    fn drop(&mut self) {
        if self.reader.is_some() || self.primer.is_some() {
            self.shutdown();
        }
    }
}

fn build_device_table(
    source: &dyn CaptureSource,
    version: FileVersion,
    count: usize,
) -> Result<Arc<[DeviceEntry]>> {
    let mut devices = Vec::with_capacity(count);
    for index in 0..count {
        let record = source.device_info(index)?;
        let handle = index as u8;
        let extrinsic = calibration::resolve_record(&record);
        let info = DeviceInfo {
            handle,
            device_type: DeviceType::from(record.device_type),
            broadcast_code: record.broadcast_code,
        };
        log::debug!(
            "Lidar {} [{}] {:?}: euler={:?} trans={:?} extrinsic={}",
            handle,
            info.broadcast_code_str(),
            info.device_type,
            extrinsic.euler,
            extrinsic.translation,
            if extrinsic.enabled { "on" } else { "off" }
        );
        devices.push(DeviceEntry {
            handle,
            connect_state: ConnectState::Sampling,
            info,
            data_source: DataSource::from(version),
            extrinsic,
        });
    }
    Ok(Arc::from(devices))
}

fn reader_loop(
    mut source: Box<dyn CaptureSource>,
    mut buffer: FrameBuffer,
    version: FileVersion,
    mut forwarder: Forwarder,
    start_gate: Receiver<()>,
    exit_tx: Sender<ExitReason>,
    shared: Arc<Shared>,
) -> ReaderParts {
    let reason = if start_gate.recv().is_err() || shared.stop.load(Ordering::Acquire) {
        log::info!("Reader released before start");
        ExitReason::Stopped
    } else {
        log::info!("Start to read capture");
        read_frames(&mut *source, &mut buffer, version, &mut forwarder, &shared)
    };

    shared.exit_requested.store(true, Ordering::Release);
    let _ = exit_tx.try_send(reason);
    ReaderParts { source, buffer }
}

fn read_frames(
    source: &mut dyn CaptureSource,
    buffer: &mut FrameBuffer,
    version: FileVersion,
    forwarder: &mut Forwarder,
    shared: &Shared,
) -> ExitReason {
    let mut progress = 0u8;
    loop {
        if shared.stop.load(Ordering::Acquire) {
            log::info!("Reader stopping (stop flag set)");
            return ExitReason::Stopped;
        }

        match source.next_frame(buffer) {
            Ok(FrameStatus::Ok) => {
                let frame = shared.frames_read.fetch_add(1, Ordering::Relaxed);
                forwarder.forward(frame, buffer, version);
            }
            Ok(FrameStatus::AtEnd) => {
                log::info!("Read the capture complete");
                shared.progress.store(source.read_progress(), Ordering::Relaxed);
                return ExitReason::EndOfStream;
            }
            Err(e) => {
                log::error!("Exit reading capture: {}", e);
                return ExitReason::SourceError(e.to_string());
            }
        }

        let current = source.read_progress();
        if current != progress {
            progress = current;
            shared.progress.store(current, Ordering::Relaxed);
            log::info!("Read progress: {}%", current);
        }
    }
}

/// Reader-side state for turning frames into consumer callbacks.
struct Forwarder {
    devices: Arc<[DeviceEntry]>,
    consumer: Arc<dyn FrameConsumer>,
    packet_interval: Duration,
    shared: Arc<Shared>,
    scratch: Vec<PointRecord>,
    faults_reported: Vec<bool>,
}

impl Forwarder {
    fn forward(&mut self, frame: u64, buffer: &FrameBuffer, version: FileVersion) {
        let packets = match decoder::decode_frame(buffer, version) {
            Ok(packets) => packets,
            Err(e) => {
                self.shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("Dropping frame {}: {}", frame, e);
                return;
            }
        };

        for packet in &packets {
            let handle = packet.device_handle as usize;
            let Some(device) = self.devices.get(handle) else {
                log::warn!(
                    "Frame {}: packet at offset {} names unknown lidar {}",
                    frame,
                    packet.offset,
                    handle
                );
                continue;
            };

            if packet.status.has_fault() && !self.faults_reported[handle] {
                self.faults_reported[handle] = true;
                log::warn!("Lidar {} reports status {:?}", handle, packet.status);
            }

            match reconstruct::reconstruct_into(packet, device, &mut self.scratch) {
                Ok(Reconstructed::Points(_)) => {
                    if self.consumer.ready() {
                        self.consumer.on_frame(&PointFrame {
                            device_handle: packet.device_handle,
                            timestamp: packet.timestamp,
                            points: &self.scratch,
                        });
                        self.shared.packets_forwarded.fetch_add(1, Ordering::Relaxed);
                    } else {
                        self.shared.packets_missed.fetch_add(1, Ordering::Relaxed);
                    }
                    if !self.packet_interval.is_zero() {
                        std::thread::sleep(self.packet_interval);
                    }
                }
                Ok(Reconstructed::Imu(imu)) => {
                    log::trace!("Lidar {} IMU sample {:?}", handle, imu);
                }
                Ok(Reconstructed::Skipped(data_type)) => {
                    log::debug!("Lidar {}: skipping {:?} packet", handle, data_type);
                }
                Err(e) => {
                    log::warn!(
                        "Frame {}: skipping packet at offset {}: {}",
                        frame,
                        packet.offset,
                        e
                    );
                }
            }
        }
    }
}
