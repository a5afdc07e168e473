//! Session configuration
//!
//! A [`SessionConfig`] is built once and handed to each pipeline when a
//! session starts. Changing it never affects a running session; the new
//! value is picked up the next time the pipeline resumes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::encoded_size;
use crate::constants::*;
use crate::error::ConfigError;
use crate::protocol::PacketLayout;

/// UDP delivery topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CastMode {
    #[default]
    Unicast,
    Broadcast,
    Multicast,
}

impl std::fmt::Display for CastMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CastMode::Unicast => write!(f, "unicast"),
            CastMode::Broadcast => write!(f, "broadcast"),
            CastMode::Multicast => write!(f, "multicast"),
        }
    }
}

/// Network addressing shared by both pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    pub mode: CastMode,
    /// Peer address used in unicast mode
    pub unicast_addr: IpAddr,
    /// Subnet broadcast address
    pub broadcast_addr: Ipv4Addr,
    /// Multicast group joined by both ends
    pub multicast_addr: Ipv4Addr,
    /// Interface used for the group; the system picks one when unspecified
    pub multicast_interface: Ipv4Addr,
    /// Local address the receiver binds to
    pub bind_addr: IpAddr,
    pub port: u16,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            mode: CastMode::Unicast,
            unicast_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            broadcast_addr: Ipv4Addr::BROADCAST,
            multicast_addr: DEFAULT_MULTICAST_GROUP,
            multicast_interface: Ipv4Addr::UNSPECIFIED,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_UDP_PORT,
        }
    }
}

impl CastConfig {
    /// Address packets are sent to for the configured mode
    pub fn destination(&self) -> SocketAddr {
        let ip = match self.mode {
            CastMode::Unicast => self.unicast_addr,
            CastMode::Broadcast => IpAddr::V4(self.broadcast_addr),
            CastMode::Multicast => IpAddr::V4(self.multicast_addr),
        };
        SocketAddr::new(ip, self.port)
    }

    /// Address the receiving socket binds to
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

/// Audio and framing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    /// PCM samples per frame (mono)
    pub frame_size: usize,
    /// Compress frames with the codec; raw PCM16 otherwise
    pub compression: bool,
    /// Codec quality, 0 to 10
    pub quality: u8,
    /// Drop datagrams that originate from one of our own addresses
    pub echo_suppression: bool,
    /// Probability of skipping a sequence number per frame (diagnostics)
    pub fake_loss_probability: f64,
    /// Receive poll interval in milliseconds
    pub receive_poll_ms: u64,
    /// Input device name; default device when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<String>,
    /// Output device name; default device when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            compression: true,
            quality: DEFAULT_QUALITY,
            echo_suppression: true,
            fake_loss_probability: 0.0,
            receive_poll_ms: DEFAULT_RECEIVE_POLL_MS,
            input_device: None,
            output_device: None,
        }
    }
}

impl AudioSettings {
    /// PCM format of a frame
    pub fn format(&self) -> PcmFormat {
        PcmFormat {
            sample_rate: self.sample_rate,
            frame_size: self.frame_size,
        }
    }

    /// Payload length in bytes for one frame
    pub fn payload_len(&self) -> usize {
        if self.compression {
            encoded_size(self.quality, &self.format())
        } else {
            self.frame_size * BYTES_PER_SAMPLE
        }
    }

    pub fn receive_poll(&self) -> Duration {
        Duration::from_millis(self.receive_poll_ms.max(1))
    }
}

/// Mono 16-bit PCM frame format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub frame_size: usize,
}

impl PcmFormat {
    /// Frame duration in milliseconds
    pub fn frame_duration_ms(&self) -> f32 {
        self.frame_size as f32 * 1000.0 / self.sample_rate as f32
    }
}

/// Complete configuration of one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cast: CastConfig,
    pub audio: AudioSettings,
}

impl SessionConfig {
    /// Wire layout derived from these settings
    pub fn layout(&self) -> PacketLayout {
        PacketLayout::for_settings(&self.audio)
    }

    /// Check the settings are usable before starting a session
    pub fn validate(&self) -> Result<(), ConfigError> {
        let audio = &self.audio;

        if audio.quality > MAX_QUALITY {
            return Err(ConfigError::Invalid(format!(
                "quality {} out of range 0..={}",
                audio.quality, MAX_QUALITY
            )));
        }
        if audio.frame_size == 0 || audio.sample_rate == 0 {
            return Err(ConfigError::Invalid("frame size and sample rate must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&audio.fake_loss_probability) {
            return Err(ConfigError::Invalid(format!(
                "loss probability {} outside [0, 1]",
                audio.fake_loss_probability
            )));
        }

        if audio.compression {
            if !OPUS_SAMPLE_RATES.contains(&audio.sample_rate) {
                return Err(ConfigError::Invalid(format!(
                    "sample rate {} not supported by the codec",
                    audio.sample_rate
                )));
            }
            // Valid Opus frame durations are 2.5, 5, 10, 20, 40 and 60 ms
            let tenths_ms = audio.frame_size as u64 * 10_000 / audio.sample_rate as u64;
            let exact = audio.frame_size as u64 * 10_000 % audio.sample_rate as u64 == 0;
            if !exact || ![25, 50, 100, 200, 400, 600].contains(&tenths_ms) {
                return Err(ConfigError::Invalid(format!(
                    "frame of {} samples at {} Hz is not a codec frame duration",
                    audio.frame_size, audio.sample_rate
                )));
            }
        }

        let packet_len = self.layout().packet_len();
        if packet_len > MAX_DATAGRAM_SIZE {
            return Err(ConfigError::Invalid(format!(
                "packet of {} bytes exceeds the UDP limit",
                packet_len
            )));
        }

        if self.cast.mode == CastMode::Multicast && !self.cast.multicast_addr.is_multicast() {
            return Err(ConfigError::Invalid(format!(
                "{} is not a multicast group",
                self.cast.multicast_addr
            )));
        }

        Ok(())
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, or defaults when it does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Per-user config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        directories::ProjectDirs::from("org", "lan-ptt", "lan-ptt")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }
}
