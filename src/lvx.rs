//! Livox `.lvx` capture files.
//!
//! File layout (all integers little-endian):
//! - Public header, 24 bytes: signature `"livox_tech"` NUL-padded to 16,
//!   version `[u8; 4]` (`version[1]` selects the record layout), magic u32.
//! - Private header, 5 bytes: frame duration u32 (ms), device count u8.
//! - Device info, 59 bytes per device: broadcast code `[16]`, hub code `[16]`,
//!   device index u8, device type u8, extrinsic enable u8, roll, pitch, yaw
//!   (f32 degrees), x, y, z (f32 meters).
//! - Frames: 24-byte header (current offset, next offset, frame index, u64)
//!   followed by packet records up to the next offset.

use crate::decoder::FrameBuffer;
use crate::protocol::{read_f32, read_u32, read_u64, read_u8};
use crate::source::{CaptureSource, FrameStatus};
use crate::types::{DeviceRecord, FileVersion, BROADCAST_CODE_SIZE};
use crate::{ReplayError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const SIGNATURE: &[u8] = b"livox_tech";
pub const MAGIC_CODE: u32 = 0xAC0E_A767;

pub const PUBLIC_HEADER_SIZE: usize = 24;
pub const PRIVATE_HEADER_SIZE: usize = 5;
pub const DEVICE_INFO_SIZE: usize = 59;
pub const FRAME_HEADER_SIZE: usize = 24;

/// Default frame duration written by Livox Viewer.
pub const DEFAULT_FRAME_DURATION_MS: u32 = 50;

fn version_bytes(version: FileVersion) -> [u8; 4] {
    match version {
        FileVersion::V0 => [1, 0, 0, 0],
        FileVersion::V1 => [1, 1, 0, 0],
    }
}

/// Parse the 24-byte public header and return the record layout version.
pub fn parse_public_header(header: &[u8; PUBLIC_HEADER_SIZE]) -> Result<FileVersion> {
    let sig_end = header[..16].iter().position(|&b| b == 0).unwrap_or(16);
    if &header[..sig_end] != SIGNATURE {
        return Err(ReplayError::InvalidHeader(format!(
            "bad signature {:02x?}",
            &header[..sig_end]
        )));
    }
    let magic = read_u32(header, 20, 0)?;
    if magic != MAGIC_CODE {
        return Err(ReplayError::InvalidHeader(format!(
            "bad magic 0x{:08x}",
            magic
        )));
    }
    match header[17] {
        0 => Ok(FileVersion::V0),
        1 => Ok(FileVersion::V1),
        other => Err(ReplayError::InvalidHeader(format!(
            "unsupported version {}.{}",
            header[16], other
        ))),
    }
}

/// Parse one 59-byte device info block.
pub fn parse_device_info(block: &[u8; DEVICE_INFO_SIZE]) -> Result<DeviceRecord> {
    let mut broadcast_code = [0u8; BROADCAST_CODE_SIZE];
    broadcast_code.copy_from_slice(&block[0..16]);
    let mut hub_code = [0u8; BROADCAST_CODE_SIZE];
    hub_code.copy_from_slice(&block[16..32]);

    Ok(DeviceRecord {
        device_type: read_u8(block, 33, 0)?,
        broadcast_code,
        hub_code,
        extrinsic_enabled: read_u8(block, 34, 0)? != 0,
        roll: read_f32(block, 35, 0)?,
        pitch: read_f32(block, 39, 0)?,
        yaw: read_f32(block, 43, 0)?,
        x: read_f32(block, 47, 0)?,
        y: read_f32(block, 51, 0)?,
        z: read_f32(block, 55, 0)?,
    })
}

/// Sequential reader for an `.lvx` capture.
pub struct LvxFile {
    reader: BufReader<File>,
    version: FileVersion,
    frame_duration_ms: u32,
    devices: Vec<DeviceRecord>,
    file_size: u64,
    position: u64,
    frames_read: u64,
    closed: bool,
}

impl LvxFile {
    /// Open a capture and read its headers and device table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<LvxFile> {
        let path = path.as_ref();
        Self::open_inner(path).map_err(|e| ReplayError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn open_inner(path: &Path) -> Result<LvxFile> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut public = [0u8; PUBLIC_HEADER_SIZE];
        reader.read_exact(&mut public)?;
        let version = parse_public_header(&public)?;

        let mut private = [0u8; PRIVATE_HEADER_SIZE];
        reader.read_exact(&mut private)?;
        let frame_duration_ms = read_u32(&private, 0, 0)?;
        let device_count = private[4] as usize;

        let mut devices = Vec::with_capacity(device_count);
        for _ in 0..device_count {
            let mut block = [0u8; DEVICE_INFO_SIZE];
            reader.read_exact(&mut block)?;
            devices.push(parse_device_info(&block)?);
        }

        let position = (PUBLIC_HEADER_SIZE + PRIVATE_HEADER_SIZE + device_count * DEVICE_INFO_SIZE) as u64;

        log::info!(
            "Opened {}: version={:?} devices={} frame={}ms size={}",
            path.display(),
            version,
            device_count,
            frame_duration_ms,
            file_size
        );

        Ok(LvxFile {
            reader,
            version,
            frame_duration_ms,
            devices,
            file_size,
            position,
            frames_read: 0,
            closed: false,
        })
    }

    pub fn frame_duration_ms(&self) -> u32 {
        self.frame_duration_ms
    }

    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl CaptureSource for LvxFile {
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
            return Err(ReplayError::SourceRead("capture is closed".into()));
        }

        let remaining = self.file_size.saturating_sub(self.position);
        if remaining == 0 {
            buffer.clear();
            return Ok(FrameStatus::AtEnd);
        }
        if remaining < FRAME_HEADER_SIZE as u64 {
            return Err(ReplayError::SourceRead(format!(
                "truncated frame header at offset {}",
                self.position
            )));
        }

        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.reader.read_exact(&mut header)?;
        let next_offset = read_u64(&header, 8, 0)?;
        let frame_index = read_u64(&header, 16, 0)?;

        let data_start = self.position + FRAME_HEADER_SIZE as u64;
        if next_offset < data_start || next_offset > self.file_size {
            return Err(ReplayError::SourceRead(format!(
                "frame {} has invalid next offset {} (frame data at {}, file size {})",
                frame_index, next_offset, data_start, self.file_size
            )));
        }

        let size = (next_offset - data_start) as usize;
        let capacity = buffer.capacity();
        let dst = buffer
            .fill(size)
            .ok_or(ReplayError::FrameTooLarge { size, capacity })?;
        self.reader.read_exact(dst)?;

        self.position = next_offset;
        self.frames_read += 1;
        log::trace!("Frame {}: {} bytes", frame_index, size);
        Ok(FrameStatus::Ok)
    }

    fn read_progress(&self) -> u8 {
        if self.file_size == 0 {
            return 100;
        }
        (self.position.min(self.file_size) * 100 / self.file_size) as u8
    }

    fn close(&mut self) {
        if !self.closed {
            log::debug!("Closing capture after {} frames", self.frames_read);
            self.closed = true;
        }
    }
}

/// Writer producing `.lvx` captures in either record layout.
pub struct LvxWriter<W: Write> {
    inner: W,
    position: u64,
    frame_index: u64,
}

impl LvxWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(
        path: P,
        version: FileVersion,
        devices: &[DeviceRecord],
    ) -> Result<Self> {
        let file = File::create(path)?;
        LvxWriter::new(BufWriter::new(file), version, DEFAULT_FRAME_DURATION_MS, devices)
    }
}

impl<W: Write> LvxWriter<W> {
    /// Write the file headers and device table.
    pub fn new(
        mut inner: W,
        version: FileVersion,
        frame_duration_ms: u32,
        devices: &[DeviceRecord],
    ) -> Result<Self> {
        let count = u8::try_from(devices.len()).map_err(|_| ReplayError::DeviceCount {
            count: devices.len(),
            max: u8::MAX as usize,
        })?;

        let mut public = [0u8; PUBLIC_HEADER_SIZE];
        public[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
        public[16..20].copy_from_slice(&version_bytes(version));
        public[20..24].copy_from_slice(&MAGIC_CODE.to_le_bytes());
        inner.write_all(&public)?;

        inner.write_all(&frame_duration_ms.to_le_bytes())?;
        inner.write_all(&[count])?;

        for (index, dev) in devices.iter().enumerate() {
            let mut block = Vec::with_capacity(DEVICE_INFO_SIZE);
            block.extend_from_slice(&dev.broadcast_code);
            block.extend_from_slice(&dev.hub_code);
            block.push(index as u8);
            block.push(dev.device_type);
            block.push(dev.extrinsic_enabled as u8);
            for v in [dev.roll, dev.pitch, dev.yaw, dev.x, dev.y, dev.z] {
                block.extend_from_slice(&v.to_le_bytes());
            }
            inner.write_all(&block)?;
        }

        Ok(LvxWriter {
            inner,
            position: (PUBLIC_HEADER_SIZE + PRIVATE_HEADER_SIZE + devices.len() * DEVICE_INFO_SIZE)
                as u64,
            frame_index: 0,
        })
    }

    /// Append one frame made of already-encoded packet records.
    pub fn write_frame(&mut self, records: &[u8]) -> Result<()> {
        let current = self.position;
        let next = current + (FRAME_HEADER_SIZE + records.len()) as u64;
        self.inner.write_all(&current.to_le_bytes())?;
        self.inner.write_all(&next.to_le_bytes())?;
        self.inner.write_all(&self.frame_index.to_le_bytes())?;
        self.inner.write_all(records)?;
        self.position = next;
        self.frame_index += 1;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_record;
    use crate::types::DataType;

    fn record(code: &str) -> DeviceRecord {
        let mut broadcast_code = [0u8; BROADCAST_CODE_SIZE];
        broadcast_code[..code.len()].copy_from_slice(code.as_bytes());
        DeviceRecord {
            device_type: 3,
            broadcast_code,
            hub_code: [0; BROADCAST_CODE_SIZE],
            roll: 1.0,
            pitch: -2.0,
            yaw: 90.0,
            x: 0.25,
            y: 0.0,
            z: 1.5,
            extrinsic_enabled: true,
        }
    }

    fn write_capture(path: &Path, version: FileVersion, frames: &[Vec<u8>]) {
        let mut writer = LvxWriter::create(path, version, &[record("0TFDFCE00502151")]).unwrap();
        for frame in frames {
            writer.write_frame(frame).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_headers_and_device_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.lvx");
        write_capture(&path, FileVersion::V1, &[]);

        let file = LvxFile::open(&path).unwrap();
        assert_eq!(file.file_version(), FileVersion::V1);
        assert_eq!(file.frame_duration_ms(), DEFAULT_FRAME_DURATION_MS);
        assert_eq!(file.device_count(), 1);
        let dev = file.device_info(0).unwrap();
        assert_eq!(dev, record("0TFDFCE00502151"));
        assert!(file.device_info(1).is_err());
    }

    #[test]
    fn test_frames_then_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.lvx");
        let frame_a = encode_record(FileVersion::V0, 0, DataType::Imu, 0, 1, &[0u8; 24]);
        let frame_b = [frame_a.clone(), frame_a.clone()].concat();
        write_capture(&path, FileVersion::V0, &[frame_a.clone(), frame_b.clone()]);

        let mut file = LvxFile::open(&path).unwrap();
        assert_eq!(file.file_version(), FileVersion::V0);
        let mut buffer = FrameBuffer::for_packets(4);

        assert_eq!(file.next_frame(&mut buffer).unwrap(), FrameStatus::Ok);
        assert_eq!(buffer.as_slice(), &frame_a[..]);
        assert!(file.read_progress() < 100);

        assert_eq!(file.next_frame(&mut buffer).unwrap(), FrameStatus::Ok);
        assert_eq!(buffer.as_slice(), &frame_b[..]);
        assert_eq!(file.read_progress(), 100);

        assert_eq!(file.next_frame(&mut buffer).unwrap(), FrameStatus::AtEnd);
        assert_eq!(file.frames_read(), 2);

        file.close();
        assert!(file.next_frame(&mut buffer).is_err());
    }

    #[test]
    fn test_frame_larger_than_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.lvx");
        write_capture(&path, FileVersion::V1, &[vec![0u8; 64]]);

        let mut file = LvxFile::open(&path).unwrap();
        let mut buffer = FrameBuffer::with_capacity(32);
        assert!(matches!(
            file.next_frame(&mut buffer),
            Err(ReplayError::FrameTooLarge { size: 64, capacity: 32 })
        ));
    }

    #[test]
    fn test_truncated_frame_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.lvx");
        write_capture(&path, FileVersion::V1, &[vec![7u8; 64]]);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();

        let mut file = LvxFile::open(&path).unwrap();
        let mut buffer = FrameBuffer::with_capacity(128);
        assert!(matches!(
            file.next_frame(&mut buffer),
            Err(ReplayError::SourceRead(_))
        ));
    }

    #[test]
    fn test_open_rejects_bad_files() {
        let dir = tempfile::tempdir().unwrap();

        let missing = LvxFile::open(dir.path().join("missing.lvx"));
        assert!(matches!(missing, Err(ReplayError::Open { .. })));

        let path = dir.path().join("bad.lvx");
        std::fs::write(&path, b"not a livox capture at all, definitely").unwrap();
        assert!(matches!(LvxFile::open(&path), Err(ReplayError::Open { .. })));
    }

    #[test]
    fn test_public_header_checks() {
        let mut header = [0u8; PUBLIC_HEADER_SIZE];
        header[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
        header[16..20].copy_from_slice(&[1, 1, 0, 0]);
        header[20..24].copy_from_slice(&MAGIC_CODE.to_le_bytes());
        assert_eq!(parse_public_header(&header).unwrap(), FileVersion::V1);

        header[17] = 7;
        assert!(parse_public_header(&header).is_err());

        header[17] = 0;
        header[20] ^= 0xff;
        assert!(parse_public_header(&header).is_err());
    }
}
