//! Replay an `.lvx` capture and print point frame rates to stdout.
//!
//! Usage: cargo run --example replay -- <capture.lvx>

use lvx_replay::{ChannelConsumer, ExitReason, ReplayConfig, ReplaySession};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("Usage: replay <capture.lvx>");
        std::process::exit(2);
    };

    let (consumer, frames) = ChannelConsumer::bounded(256);
    let mut session = ReplaySession::with_config(Arc::new(consumer), ReplayConfig::from_env());
    if let Err(e) = session.init(&path) {
        eprintln!("Failed to open capture: {}", e);
        std::process::exit(1);
    }

    for dev in session.devices() {
        println!(
            "Lidar {} [{}] {:?}",
            dev.handle,
            dev.info.broadcast_code_str(),
            dev.info.device_type
        );
    }
    println!();

    if let Err(e) = session.start() {
        eprintln!("Failed to start replay: {}", e);
        std::process::exit(1);
    }

    let start = Instant::now();
    let mut count: u64 = 0;
    let mut points: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        match frames.recv_timeout(Duration::from_millis(500)) {
            Some(frame) => {
                count += 1;
                points += frame.points.iter().filter(|p| p.valid).count() as u64;

                if count % 1000 == 1 {
                    if let Some(p) = frame.points.iter().find(|p| p.valid) {
                        println!(
                            "lidar={} ts={:<16} first=[{:+.3}, {:+.3}, {:+.3}] refl={}",
                            frame.device_handle, frame.timestamp, p.x, p.y, p.z, p.reflectivity,
                        );
                    }
                }

                let now = Instant::now();
                if now.duration_since(last_report) >= Duration::from_secs(3) {
                    let elapsed = start.elapsed().as_secs_f64();
                    println!(
                        "--- {} packets, {} points in {:.1}s ({:.0} pts/s), {}% read ---",
                        count,
                        points,
                        elapsed,
                        points as f64 / elapsed,
                        session.read_progress()
                    );
                    last_report = now;
                }
            }
            None if session.is_exit_requested() && frames.is_empty() => break,
            None => {}
        }
    }

    match session.wait_exit(Duration::from_secs(1)) {
        Some(ExitReason::SourceError(msg)) => eprintln!("Capture read failed: {}", msg),
        Some(reason) => println!("Replay ended: {:?}", reason),
        None => {}
    }
    let stats = session.stats();
    if let Err(e) = session.deinit() {
        eprintln!("Error: {}", e);
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "\nTotal: {} frames, {} packets ({} missed), {} points in {:.1}s",
        stats.frames_read, stats.packets_forwarded, stats.packets_missed, points, elapsed
    );
}
