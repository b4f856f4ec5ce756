//! Frame buffer and sub-packet demultiplexing.

use crate::error::DecodeError;
use crate::protocol::{self, PacketHeader};
use crate::types::{DataType, FileVersion, StatusCode};

/// Fixed-capacity scratch buffer holding one frame's raw packets.
///
/// Allocated once per session and overwritten by every read.
pub struct FrameBuffer {
    data: Box<[u8]>,
    data_size: usize,
}

impl FrameBuffer {
    /// Allocate a buffer able to hold `max_packets` of the largest record type.
    pub fn for_packets(max_packets: usize) -> Self {
        Self::with_capacity(max_packets * protocol::MAX_RECORD_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            data_size: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes populated by the last fill.
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Populated bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.data_size]
    }

    /// Mutable view of the first `len` bytes for a source to fill.
    ///
    /// Marks `len` bytes as populated. Returns `None` if `len` exceeds capacity.
    pub fn fill(&mut self, len: usize) -> Option<&mut [u8]> {
        if len > self.data.len() {
            return None;
        }
        self.data_size = len;
        Some(&mut self.data[..len])
    }

    /// Replace the contents with `bytes`. Returns false if they do not fit.
    pub fn copy_from(&mut self, bytes: &[u8]) -> bool {
        match self.fill(bytes.len()) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.data_size = 0;
    }
}

/// One device's packet within a frame, borrowed from the frame buffer.
#[derive(Debug, Clone, Copy)]
pub struct SubPacket<'a> {
    pub device_handle: u8,
    pub data_type: DataType,
    pub status: StatusCode,
    pub timestamp: u64,
    /// Offset of the record within the frame.
    pub offset: usize,
    pub payload: &'a [u8],
}

/// Lazy iterator over the sub-packets of one frame, in buffer order.
///
/// Yields `Err` once and then stops if a record is malformed; it never reads
/// past the populated size of the buffer.
pub struct FrameDecoder<'a> {
    data: &'a [u8],
    version: FileVersion,
    cursor: usize,
    failed: bool,
}

impl<'a> FrameDecoder<'a> {
    pub fn new(buffer: &'a FrameBuffer, version: FileVersion) -> Self {
        Self::from_bytes(buffer.as_slice(), version)
    }

    pub fn from_bytes(data: &'a [u8], version: FileVersion) -> Self {
        Self {
            data,
            version,
            cursor: 0,
            failed: false,
        }
    }

    /// Current read offset into the frame.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn next_packet(&mut self) -> Result<SubPacket<'a>, DecodeError> {
        let record = &self.data[self.cursor..];
        let header: PacketHeader = protocol::parse_header(record, self.version, self.cursor)?;
        let payload = &record[header.payload_offset..header.payload_offset + header.payload_len];
        let packet = SubPacket {
            device_handle: header.device_handle,
            data_type: header.data_type,
            status: header.status,
            timestamp: header.timestamp,
            offset: self.cursor,
            payload,
        };
        self.cursor += header.record_len();
        Ok(packet)
    }
}

impl<'a> Iterator for FrameDecoder<'a> {
    type Item = Result<SubPacket<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.data.len() {
            return None;
        }
        match self.next_packet() {
            Ok(packet) => Some(Ok(packet)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode every sub-packet of a frame, or fail if any record is malformed.
pub fn decode_frame(
    buffer: &FrameBuffer,
    version: FileVersion,
) -> Result<Vec<SubPacket<'_>>, DecodeError> {
    FrameDecoder::new(buffer, version).collect()
}
