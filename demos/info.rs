//! Print the header and device table of an `.lvx` capture.
//!
//! Usage: cargo run --example info -- <capture.lvx>

use lvx_replay::protocol::extract_string;
use lvx_replay::{calibration, CaptureSource, DeviceType, LvxFile};

fn main() {
    env_logger::init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("Usage: info <capture.lvx>");
        std::process::exit(2);
    };

    let file = match LvxFile::open(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("Version:  {:?}", file.file_version());
    println!("Frame:    {} ms", file.frame_duration_ms());
    println!("Devices:  {}", file.device_count());
    for (index, dev) in file.devices().iter().enumerate() {
        let extrinsic = calibration::resolve_record(dev);
        println!(
            "  [{}] {:<16} {:?}  rpy=[{:+.2}, {:+.2}, {:+.2}]  xyz=[{:+.3}, {:+.3}, {:+.3}]  extrinsic={}",
            index,
            extract_string(&dev.broadcast_code),
            DeviceType::from(dev.device_type),
            dev.roll, dev.pitch, dev.yaw,
            dev.x, dev.y, dev.z,
            if extrinsic.enabled { "on" } else { "off" },
        );
    }
}
