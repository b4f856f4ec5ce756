use crate::error::DecodeError;
use crate::types::{DataType, FileVersion, ImuSample, StatusCode};

// -- Livox Ethernet packet header --
pub const ETH_HEADER_SIZE: usize = 18;
const ETH_STATUS_OFFSET: usize = 4;
const ETH_DATA_TYPE_OFFSET: usize = 9;
const ETH_TIMESTAMP_OFFSET: usize = 10;

/// Trailing or leading device index byte stored with every packet.
pub const DEVICE_INDEX_SIZE: usize = 1;

/// Largest payload of any data type (96 × 14 and 48 × 28).
pub const MAX_PAYLOAD_SIZE: usize = 1344;

/// Largest record a frame buffer can hold.
pub const MAX_RECORD_SIZE: usize = DEVICE_INDEX_SIZE + ETH_HEADER_SIZE + MAX_PAYLOAD_SIZE;

// -- Point payloads --
pub const EXTEND_RAW_POINT_SIZE: usize = 14;
pub const IMU_SAMPLE_SIZE: usize = 24;

/// Raw coordinates are millimeters.
pub const RAW_UNIT_TO_METERS: f64 = 0.001;

/// Points carried by one packet of the given type.
pub fn points_per_packet(data_type: DataType) -> usize {
    match data_type {
        DataType::Cartesian | DataType::Spherical => 100,
        DataType::ExtendCartesian | DataType::ExtendSpherical => 96,
        DataType::DualExtendCartesian | DataType::DualExtendSpherical => 48,
        DataType::Imu => 1,
        DataType::TripleExtendCartesian | DataType::TripleExtendSpherical => 30,
    }
}

/// Size in bytes of one raw point of the given type.
pub fn point_size(data_type: DataType) -> usize {
    match data_type {
        DataType::Cartesian => 13,
        DataType::Spherical => 9,
        DataType::ExtendCartesian => EXTEND_RAW_POINT_SIZE,
        DataType::ExtendSpherical => 10,
        DataType::DualExtendCartesian => 28,
        DataType::DualExtendSpherical => 16,
        DataType::Imu => IMU_SAMPLE_SIZE,
        DataType::TripleExtendCartesian => 42,
        DataType::TripleExtendSpherical => 22,
    }
}

pub fn payload_len(data_type: DataType) -> usize {
    points_per_packet(data_type) * point_size(data_type)
}

/// Ethernet packet length (header + payload) for the given type.
pub fn eth_packet_len(data_type: DataType) -> usize {
    ETH_HEADER_SIZE + payload_len(data_type)
}

/// Bytes one record occupies in a frame buffer, device index included.
pub fn record_len(data_type: DataType) -> usize {
    eth_packet_len(data_type) + DEVICE_INDEX_SIZE
}

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub device_handle: u8,
    pub data_type: DataType,
    pub status: StatusCode,
    pub timestamp: u64,
    /// Offset of the payload relative to the record start.
    pub payload_offset: usize,
    pub payload_len: usize,
}

impl PacketHeader {
    /// Total bytes the record occupies, device index included.
    pub fn record_len(&self) -> usize {
        ETH_HEADER_SIZE + self.payload_len + DEVICE_INDEX_SIZE
    }
}

/// Parse the record header at the start of `bytes`.
///
/// `bytes` runs from the record start to the end of valid frame data;
/// `base` is the record's offset within the frame, used for error reports.
///
/// Layouts:
/// - V1: `[device_index][eth header (18)][payload]`
/// - V0: `[eth header (18)][payload][device_index]`
pub fn parse_header(
    bytes: &[u8],
    version: FileVersion,
    base: usize,
) -> Result<PacketHeader, DecodeError> {
    let eth_offset = match version {
        FileVersion::V1 => DEVICE_INDEX_SIZE,
        FileVersion::V0 => 0,
    };

    let raw_type = read_u8(bytes, eth_offset + ETH_DATA_TYPE_OFFSET, base)?;
    let data_type = DataType::from_u8(raw_type).ok_or(DecodeError::UnknownDataType {
        offset: base,
        data_type: raw_type,
    })?;
    let payload_len = payload_len(data_type);
    let record_len = ETH_HEADER_SIZE + payload_len + DEVICE_INDEX_SIZE;
    ensure_len(bytes, record_len, base)?;

    let device_handle = match version {
        FileVersion::V1 => read_u8(bytes, 0, base)?,
        FileVersion::V0 => read_u8(bytes, ETH_HEADER_SIZE + payload_len, base)?,
    };
    let status = StatusCode::from_bits_retain(read_u32(bytes, eth_offset + ETH_STATUS_OFFSET, base)?);
    let timestamp = read_u64(bytes, eth_offset + ETH_TIMESTAMP_OFFSET, base)?;

    Ok(PacketHeader {
        device_handle,
        data_type,
        status,
        timestamp,
        payload_offset: eth_offset + ETH_HEADER_SIZE,
        payload_len,
    })
}

fn ensure_len(bytes: &[u8], needed: usize, base: usize) -> Result<(), DecodeError> {
    if bytes.len() < needed {
        return Err(DecodeError::Truncated {
            offset: base,
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}

fn field<const N: usize>(bytes: &[u8], offset: usize, base: usize) -> Result<[u8; N], DecodeError> {
    bytes
        .get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(DecodeError::Truncated {
            offset: base,
            needed: offset + N,
            available: bytes.len(),
        })
}

pub fn read_u8(bytes: &[u8], offset: usize, base: usize) -> Result<u8, DecodeError> {
    Ok(field::<1>(bytes, offset, base)?[0])
}

pub fn read_u32(bytes: &[u8], offset: usize, base: usize) -> Result<u32, DecodeError> {
    field(bytes, offset, base).map(u32::from_le_bytes)
}

pub fn read_i32(bytes: &[u8], offset: usize, base: usize) -> Result<i32, DecodeError> {
    field(bytes, offset, base).map(i32::from_le_bytes)
}

pub fn read_u64(bytes: &[u8], offset: usize, base: usize) -> Result<u64, DecodeError> {
    field(bytes, offset, base).map(u64::from_le_bytes)
}

pub fn read_f32(bytes: &[u8], offset: usize, base: usize) -> Result<f32, DecodeError> {
    field(bytes, offset, base).map(f32::from_le_bytes)
}

/// Raw extended Cartesian point as stored on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendRawPoint {
    /// Millimeters, sensor-local.
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub reflectivity: u8,
    pub tag: u8,
}

impl ExtendRawPoint {
    /// A point with all-zero coordinates carries no return.
    pub fn is_sentinel(&self) -> bool {
        self.x == 0 && self.y == 0 && self.z == 0
    }
}

/// Parse one 14-byte extended raw point.
///
/// Layout: x, y, z (int32 LE mm), reflectivity (u8), tag (u8).
pub fn parse_extend_raw_point(data: &[u8]) -> Result<ExtendRawPoint, DecodeError> {
    Ok(ExtendRawPoint {
        x: read_i32(data, 0, 0)?,
        y: read_i32(data, 4, 0)?,
        z: read_i32(data, 8, 0)?,
        reflectivity: read_u8(data, 12, 0)?,
        tag: read_u8(data, 13, 0)?,
    })
}

/// Parse a 24-byte IMU payload: gyro x, y, z then accel x, y, z (f32 LE).
pub fn parse_imu_sample(data: &[u8]) -> Result<ImuSample, DecodeError> {
    Ok(ImuSample {
        gyro: [read_f32(data, 0, 0)?, read_f32(data, 4, 0)?, read_f32(data, 8, 0)?],
        accel: [
            read_f32(data, 12, 0)?,
            read_f32(data, 16, 0)?,
            read_f32(data, 20, 0)?,
        ],
    })
}

/// Extract a null-terminated string from a byte slice.
pub fn extract_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

/// Encode one record in the given layout. The payload must match the data type.
pub fn encode_record(
    version: FileVersion,
    device_handle: u8,
    data_type: DataType,
    status: u32,
    timestamp: u64,
    payload: &[u8],
) -> Vec<u8> {
    let mut eth = Vec::with_capacity(ETH_HEADER_SIZE + payload.len());
    eth.push(5); // packet protocol version
    eth.push(0); // slot
    eth.push(1); // lidar id
    eth.push(0);
    eth.extend_from_slice(&status.to_le_bytes());
    eth.push(0); // timestamp type: no sync source
    eth.push(data_type.as_u8());
    eth.extend_from_slice(&timestamp.to_le_bytes());
    eth.extend_from_slice(payload);

    let mut record = Vec::with_capacity(eth.len() + DEVICE_INDEX_SIZE);
    match version {
        FileVersion::V1 => {
            record.push(device_handle);
            record.extend_from_slice(&eth);
        }
        FileVersion::V0 => {
            record.extend_from_slice(&eth);
            record.push(device_handle);
        }
    }
    record
}

/// Encode extended Cartesian points (mm) into a payload.
pub fn encode_extend_points(points: &[ExtendRawPoint]) -> Vec<u8> {
    let mut out = Vec::with_capacity(points.len() * EXTEND_RAW_POINT_SIZE);
    for p in points {
        out.extend_from_slice(&p.x.to_le_bytes());
        out.extend_from_slice(&p.y.to_le_bytes());
        out.extend_from_slice(&p.z.to_le_bytes());
        out.push(p.reflectivity);
        out.push(p.tag);
    }
    out
}
