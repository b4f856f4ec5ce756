use std::time::Duration;

/// Devices a capture may declare, upper bound.
pub const MAX_SOURCE_LIDAR: usize = 32;

/// Packets one frame may contain, used to size the frame buffer.
pub const MAX_PACKETS_PER_FRAME: usize = 8192;

/// Pause after each forwarded point packet.
pub const DEFAULT_PACKET_INTERVAL: Duration = Duration::from_micros(100);

/// Replay session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Sleep after each forwarded point packet; zero disables pacing.
    pub packet_interval: Duration,
    pub max_packets_per_frame: usize,
    pub max_devices: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            packet_interval: DEFAULT_PACKET_INTERVAL,
            max_packets_per_frame: MAX_PACKETS_PER_FRAME,
            max_devices: MAX_SOURCE_LIDAR,
        }
    }
}

impl ReplayConfig {
    /// Defaults overridden by `LVX_PACKET_INTERVAL_US`,
    /// `LVX_MAX_PACKETS_PER_FRAME` and `LVX_MAX_DEVICES`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            packet_interval: Duration::from_micros(read_env_u64(
                "LVX_PACKET_INTERVAL_US",
                defaults.packet_interval.as_micros() as u64,
            )),
            max_packets_per_frame: read_env_usize(
                "LVX_MAX_PACKETS_PER_FRAME",
                defaults.max_packets_per_frame,
            )
            .max(1),
            max_devices: read_env_usize("LVX_MAX_DEVICES", defaults.max_devices).max(1),
        };
        if config != defaults {
            log::info!(
                "Replay config: packetInterval={:?} maxPacketsPerFrame={} maxDevices={}",
                config.packet_interval,
                config.max_packets_per_frame,
                config.max_devices
            );
        }
        config
    }

    /// No pacing between packets; used to replay as fast as possible.
    pub fn unpaced() -> Self {
        Self {
            packet_interval: Duration::ZERO,
            ..Self::default()
        }
    }
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_env_usize(name: &str, default: usize) -> usize {
    match std::env::var(name) {
        Ok(v) => match v.trim().parse::<usize>() {
            Ok(n) => n,
            Err(_) => {
                log::warn!("Ignoring {}='{}', using {}", name, v, default);
                default
            }
        },
        Err(_) => default,
    }
}
