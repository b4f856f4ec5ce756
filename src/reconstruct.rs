use crate::calibration;
use crate::decoder::SubPacket;
use crate::error::DecodeError;
use crate::protocol::{self, EXTEND_RAW_POINT_SIZE, RAW_UNIT_TO_METERS};
use crate::types::{DataType, DeviceEntry, ImuSample, PointRecord};

/// What a sub-packet turned into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconstructed {
    /// `points` slots of the output buffer were written.
    Points(usize),
    /// IMU sample; not forwarded downstream.
    Imu(ImuSample),
    /// Data type this reconstructor does not convert.
    Skipped(DataType),
}

/// Convert one sub-packet's payload into shared-frame point records.
///
/// `out` is resized to the packet's point count. Every slot is zeroed first,
/// then valid raw points are transformed into it; sentinel points keep the
/// zeroed, invalid record.
pub fn reconstruct_into(
    packet: &SubPacket<'_>,
    device: &DeviceEntry,
    out: &mut Vec<PointRecord>,
) -> Result<Reconstructed, DecodeError> {
    match packet.data_type {
        DataType::ExtendCartesian => {
            let count = protocol::points_per_packet(DataType::ExtendCartesian);
            out.clear();
            out.resize(count, PointRecord::default());
            extend_cartesian_to_points(packet.payload, device, out)?;
            Ok(Reconstructed::Points(count))
        }
        DataType::Imu => protocol::parse_imu_sample(packet.payload).map(Reconstructed::Imu),
        other => Ok(Reconstructed::Skipped(other)),
    }
}

/// Allocate and return the reconstructed points of an extended Cartesian packet.
pub fn reconstruct(
    packet: &SubPacket<'_>,
    device: &DeviceEntry,
) -> Result<Option<Vec<PointRecord>>, DecodeError> {
    let mut out = Vec::new();
    match reconstruct_into(packet, device, &mut out)? {
        Reconstructed::Points(_) => Ok(Some(out)),
        _ => Ok(None),
    }
}

fn extend_cartesian_to_points(
    payload: &[u8],
    device: &DeviceEntry,
    out: &mut [PointRecord],
) -> Result<(), DecodeError> {
    let extrinsic = &device.extrinsic;
    let line_count = device.info.device_type.line_count().max(1);

    for (i, (slot, raw)) in out
        .iter_mut()
        .zip(payload.chunks_exact(EXTEND_RAW_POINT_SIZE))
        .enumerate()
    {
        let raw = protocol::parse_extend_raw_point(raw)?;
        if raw.is_sentinel() {
            continue;
        }

        let local = [
            raw.x as f64 * RAW_UNIT_TO_METERS,
            raw.y as f64 * RAW_UNIT_TO_METERS,
            raw.z as f64 * RAW_UNIT_TO_METERS,
        ];
        let shared = if extrinsic.enabled {
            calibration::apply(extrinsic, local)
        } else {
            local
        };

        *slot = PointRecord {
            x: shared[0] as f32,
            y: shared[1] as f32,
            z: shared[2] as f32,
            reflectivity: raw.reflectivity as f32,
            tag: raw.tag,
            line: (i % line_count as usize) as u8,
            valid: true,
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::resolve;
    use crate::protocol::{encode_extend_points, ExtendRawPoint};
    use crate::types::{
        ConnectState, DataSource, DeviceInfo, DeviceType, ExtrinsicParameter, StatusCode,
    };

    fn device(device_type: DeviceType, extrinsic: ExtrinsicParameter) -> DeviceEntry {
        DeviceEntry {
            handle: 0,
            connect_state: ConnectState::Sampling,
            info: DeviceInfo {
                handle: 0,
                device_type,
                broadcast_code: [0; 16],
            },
            data_source: DataSource::RawLidar,
            extrinsic,
        }
    }

    fn packet(data_type: DataType, payload: &[u8]) -> SubPacket<'_> {
        SubPacket {
            device_handle: 0,
            data_type,
            status: StatusCode::empty(),
            timestamp: 0,
            offset: 0,
            payload,
        }
    }

    fn raw(x: i32, y: i32, z: i32) -> ExtendRawPoint {
        ExtendRawPoint {
            x,
            y,
            z,
            reflectivity: 100,
            tag: 0x10,
        }
    }

    #[test]
    fn test_identity_keeps_coordinates() {
        let points: Vec<_> = (0..96).map(|i| raw(1000 + i, -2000 - i, 500 * i + 1)).collect();
        let payload = encode_extend_points(&points);
        let dev = device(DeviceType::Mid40, ExtrinsicParameter::identity());

        let out = reconstruct(&packet(DataType::ExtendCartesian, &payload), &dev)
            .unwrap()
            .unwrap();
        assert_eq!(out.len(), 96);
        for (p, r) in out.iter().zip(points.iter()) {
            assert!(p.valid);
            assert_eq!(p.x, (r.x as f64 * 0.001) as f32);
            assert_eq!(p.y, (r.y as f64 * 0.001) as f32);
            assert_eq!(p.z, (r.z as f64 * 0.001) as f32);
            assert_eq!(p.reflectivity, 100.0);
            assert_eq!(p.tag, 0x10);
            assert_eq!(p.line, 0);
        }
    }

    #[test]
    fn test_sentinel_points_stay_zeroed() {
        let mut points = vec![raw(1000, 1000, 1000); 96];
        points[0] = raw(0, 0, 0);
        points[95] = raw(0, 0, 0);
        let payload = encode_extend_points(&points);
        let dev = device(
            DeviceType::Horizon,
            resolve(10.0, 20.0, 30.0, 1.0, 2.0, 3.0, true),
        );

        let out = reconstruct(&packet(DataType::ExtendCartesian, &payload), &dev)
            .unwrap()
            .unwrap();
        assert_eq!(out[0], PointRecord::default());
        assert_eq!(out[95], PointRecord::default());
        assert!(!out[0].valid);
        assert!(out[1].valid);
        assert_eq!(out.iter().filter(|p| p.valid).count(), 94);
    }

    #[test]
    fn test_calibration_applied_when_enabled() {
        let payload = encode_extend_points(&vec![raw(1000, 0, 0); 96]);
        let dev = device(DeviceType::Mid70, resolve(0.0, 0.0, 90.0, 0.5, 0.0, -1.0, true));
        let out = reconstruct(&packet(DataType::ExtendCartesian, &payload), &dev)
            .unwrap()
            .unwrap();
        assert!((out[0].x - 0.5).abs() < 1e-6);
        assert!((out[0].y - 1.0).abs() < 1e-6);
        assert!((out[0].z + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_calibration_skipped_when_disabled() {
        let payload = encode_extend_points(&vec![raw(1000, 0, 0); 96]);
        let ext = resolve(0.0, 0.0, 90.0, 0.5, 0.0, -1.0, false);
        assert_ne!(ext.rotation, ExtrinsicParameter::identity().rotation);
        let dev = device(DeviceType::Mid70, ext);
        let out = reconstruct(&packet(DataType::ExtendCartesian, &payload), &dev)
            .unwrap()
            .unwrap();
        assert_eq!((out[0].x, out[0].y, out[0].z), (1.0, 0.0, 0.0));
    }

    #[test]
    fn test_line_numbers_cycle() {
        let payload = encode_extend_points(&vec![raw(1, 1, 1); 96]);
        let dev = device(DeviceType::Horizon, ExtrinsicParameter::identity());
        let out = reconstruct(&packet(DataType::ExtendCartesian, &payload), &dev)
            .unwrap()
            .unwrap();
        let lines: Vec<u8> = out.iter().take(8).map(|p| p.line).collect();
        assert_eq!(lines, vec![0, 1, 2, 3, 4, 5, 0, 1]);
    }

    #[test]
    fn test_scratch_buffer_is_rezeroed() {
        let dev = device(DeviceType::Mid40, ExtrinsicParameter::identity());
        let mut scratch = Vec::new();

        let full = encode_extend_points(&vec![raw(5, 5, 5); 96]);
        reconstruct_into(&packet(DataType::ExtendCartesian, &full), &dev, &mut scratch).unwrap();
        assert!(scratch.iter().all(|p| p.valid));

        let empty = encode_extend_points(&vec![raw(0, 0, 0); 96]);
        reconstruct_into(&packet(DataType::ExtendCartesian, &empty), &dev, &mut scratch).unwrap();
        assert!(scratch.iter().all(|p| *p == PointRecord::default()));
    }

    #[test]
    fn test_imu_decoded_not_forwarded() {
        let mut payload = Vec::new();
        for v in [0.0f32, 0.0, 0.5, 0.0, 0.0, -1.0] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let dev = device(DeviceType::Avia, ExtrinsicParameter::identity());
        let mut scratch = Vec::new();
        let result = reconstruct_into(&packet(DataType::Imu, &payload), &dev, &mut scratch).unwrap();
        match result {
            Reconstructed::Imu(imu) => assert_eq!(imu.accel[2], -1.0),
            other => panic!("expected IMU, got {:?}", other),
        }
        assert!(scratch.is_empty());
        assert!(reconstruct(&packet(DataType::Imu, &payload), &dev).unwrap().is_none());
    }

    #[test]
    fn test_other_types_skipped() {
        let payload = vec![0u8; protocol::payload_len(DataType::Spherical)];
        let dev = device(DeviceType::Mid40, ExtrinsicParameter::identity());
        let mut scratch = Vec::new();
        assert_eq!(
            reconstruct_into(&packet(DataType::Spherical, &payload), &dev, &mut scratch).unwrap(),
            Reconstructed::Skipped(DataType::Spherical)
        );
    }
}
