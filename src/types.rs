/// Length of a Livox broadcast code (device serial) in bytes.
pub const BROADCAST_CODE_SIZE: usize = 16;

/// Record-layout version of an LVX capture.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileVersion {
    /// Device index trails each packet.
    V0 = 0,
    /// Device index leads each packet.
    V1 = 1,
}

/// Where a device's packets originate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    RawLidar = 0,
    LvxFile = 1,
}

impl From<FileVersion> for DataSource {
    fn from(version: FileVersion) -> Self {
        match version {
            FileVersion::V1 => DataSource::RawLidar,
            FileVersion::V0 => DataSource::LvxFile,
        }
    }
}

/// Device connection state. Replayed devices are always sampling.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    Off = 0,
    On = 1,
    Config = 2,
    Sampling = 3,
}

/// Livox device model as recorded in the capture device table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Hub,
    Mid40,
    Tele15,
    Horizon,
    Mid70,
    Avia,
    Unknown(u8),
}

impl From<u8> for DeviceType {
    fn from(value: u8) -> Self {
        match value {
            0 => DeviceType::Hub,
            1 => DeviceType::Mid40,
            2 => DeviceType::Tele15,
            3 => DeviceType::Horizon,
            6 => DeviceType::Mid70,
            7 => DeviceType::Avia,
            other => DeviceType::Unknown(other),
        }
    }
}

impl DeviceType {
    pub fn as_u8(self) -> u8 {
        match self {
            DeviceType::Hub => 0,
            DeviceType::Mid40 => 1,
            DeviceType::Tele15 => 2,
            DeviceType::Horizon => 3,
            DeviceType::Mid70 => 6,
            DeviceType::Avia => 7,
            DeviceType::Unknown(other) => other,
        }
    }

    /// Number of scan lines the sensor interleaves within one packet.
    pub fn line_count(self) -> u8 {
        match self {
            DeviceType::Tele15 | DeviceType::Horizon | DeviceType::Avia => 6,
            _ => 1,
        }
    }
}

/// Point packet layout carried in a sub-packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Cartesian,
    Spherical,
    ExtendCartesian,
    ExtendSpherical,
    DualExtendCartesian,
    DualExtendSpherical,
    Imu,
    TripleExtendCartesian,
    TripleExtendSpherical,
}

impl DataType {
    pub fn from_u8(value: u8) -> Option<DataType> {
        Some(match value {
            0 => DataType::Cartesian,
            1 => DataType::Spherical,
            2 => DataType::ExtendCartesian,
            3 => DataType::ExtendSpherical,
            4 => DataType::DualExtendCartesian,
            5 => DataType::DualExtendSpherical,
            6 => DataType::Imu,
            7 => DataType::TripleExtendCartesian,
            8 => DataType::TripleExtendSpherical,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        match self {
            DataType::Cartesian => 0,
            DataType::Spherical => 1,
            DataType::ExtendCartesian => 2,
            DataType::ExtendSpherical => 3,
            DataType::DualExtendCartesian => 4,
            DataType::DualExtendSpherical => 5,
            DataType::Imu => 6,
            DataType::TripleExtendCartesian => 7,
            DataType::TripleExtendSpherical => 8,
        }
    }
}

/// Identity of one recorded sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub handle: u8,
    pub device_type: DeviceType,
    pub broadcast_code: [u8; BROADCAST_CODE_SIZE],
}

impl DeviceInfo {
    /// Broadcast code as text, stopping at the first NUL.
    pub fn broadcast_code_str(&self) -> String {
        crate::protocol::extract_string(&self.broadcast_code)
    }
}

/// Per-device extrinsic calibration.
///
/// `rotation` is always derived from `euler`; `enabled` decides whether the
/// reconstructor applies it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtrinsicParameter {
    /// [roll, pitch, yaw] in radians.
    pub euler: [f64; 3],
    /// [x, y, z] in meters.
    pub translation: [f64; 3],
    /// 3x3 row-major rotation matrix.
    pub rotation: [[f64; 3]; 3],
    pub enabled: bool,
}

impl ExtrinsicParameter {
    pub fn identity() -> Self {
        Self {
            euler: [0.0; 3],
            translation: [0.0; 3],
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            enabled: true,
        }
    }
}

/// One sensor in the replayed capture. Built once at init and never mutated.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub handle: u8,
    pub connect_state: ConnectState,
    pub info: DeviceInfo,
    pub data_source: DataSource,
    pub extrinsic: ExtrinsicParameter,
}

/// Device table record as stored in the capture.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub device_type: u8,
    pub broadcast_code: [u8; BROADCAST_CODE_SIZE],
    pub hub_code: [u8; BROADCAST_CODE_SIZE],
    /// Degrees.
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    /// Meters.
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub extrinsic_enabled: bool,
}

/// Reconstructed point in the shared reference frame.
///
/// Slots that hold no measurement are all-zero with `valid == false`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointRecord {
    /// Meters.
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub reflectivity: f32,
    pub tag: u8,
    pub line: u8,
    pub valid: bool,
}

/// One inertial sample decoded from an IMU sub-packet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImuSample {
    /// Angular rate [x, y, z] in rad/s.
    pub gyro: [f32; 3],
    /// Acceleration [x, y, z] in g.
    pub accel: [f32; 3],
}

bitflags::bitflags! {
    /// Status code reported in every Livox packet header.
    ///
    /// Multi-bit fields are exposed as masks; use `intersects` to test them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusCode: u32 {
        const TEMPERATURE    = 0b11;
        const VOLTAGE        = 0b11 << 2;
        const MOTOR          = 0b11 << 4;
        const DIRTY          = 0b11 << 6;
        const FIRMWARE_ERROR = 1 << 8;
        const PPS            = 1 << 9;
        const DEVICE         = 1 << 10;
        const FAN            = 1 << 11;
        const SELF_HEATING   = 1 << 12;
        const PTP            = 1 << 13;
        const TIME_SYNC      = 0b111 << 14;
        const SYSTEM         = 0b11 << 30;
    }
}

impl StatusCode {
    /// Fields that indicate a sensor fault rather than a sync state.
    pub fn has_fault(self) -> bool {
        self.intersects(
            StatusCode::TEMPERATURE
                | StatusCode::VOLTAGE
                | StatusCode::MOTOR
                | StatusCode::FIRMWARE_ERROR
                | StatusCode::DEVICE
                | StatusCode::FAN
                | StatusCode::SYSTEM,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_ids() {
        for id in 0..=8u8 {
            let dt = DataType::from_u8(id).unwrap();
            assert_eq!(dt.as_u8(), id);
        }
        assert_eq!(DataType::from_u8(9), None);
    }

    #[test]
    fn test_line_count() {
        assert_eq!(DeviceType::from(3).line_count(), 6);
        assert_eq!(DeviceType::from(1).line_count(), 1);
        assert_eq!(DeviceType::from(42), DeviceType::Unknown(42));
        assert_eq!(DeviceType::Unknown(42).as_u8(), 42);
    }

    #[test]
    fn test_status_fault() {
        assert!(!StatusCode::from_bits_truncate(0).has_fault());
        assert!(!StatusCode::PTP.has_fault());
        assert!(StatusCode::from_bits_truncate(0b01 << 4).has_fault());
    }
}
