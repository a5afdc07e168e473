//! # LAN Push-to-Talk
//!
//! Half-duplex voice transport over UDP on a local network.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────┐            ┌──────────────────────────────────┐
//! │           TALKING PEER           │            │          LISTENING PEER          │
//! │                                  │            │                                  │
//! │  ┌────────────┐                  │            │                  ┌────────────┐  │
//! │  │ Microphone │                  │            │                  │  Speaker   │  │
//! │  └─────┬──────┘                  │            │                  └─────▲──────┘  │
//! │        │ PCM16 frame             │            │             PCM16 frame│         │
//! │        ▼                         │            │                        │         │
//! │  ┌────────────────────────────┐  │            │  ┌─────────────────────┴──────┐  │
//! │  │   Recorder thread          │  │            │  │   Player thread            │  │
//! │  │   (pipeline::recorder)     │  │            │  │   (pipeline::player)       │  │
//! │  │                            │  │            │  │                            │  │
//! │  │   read ─▶ encode ─▶ header │  │            │  │ echo check ─▶ decode ─▶    │  │
//! │  │                     │      │  │            │  │ write ─▶ loss accounting   │  │
//! │  └─────────────────────┼──────┘  │            │  └────────────▲───────────────┘  │
//! │                        ▼         │            │               │                  │
//! │  ┌────────────────────────────┐  │  UDP       │  ┌────────────┴───────────────┐  │
//! │  │ TransportSocket (sender)   │──┼────────────┼─▶│ TransportSocket (receiver) │  │
//! │  │ unicast/broadcast/multicast│  │ [Seq|Data] │  │ joins group when multicast │  │
//! │  └────────────────────────────┘  │            │  └────────────────────────────┘  │
//! └──────────────────────────────────┘            └──────────────────────────────────┘
//! ```
//!
//! Each pipeline runs on its own thread and is driven from the outside by
//! `resume()`, `pause()` and `finish()` (see [`pipeline::Lifecycle`]).

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod network;
pub mod pipeline;
pub mod protocol;

pub use config::{AudioSettings, CastConfig, CastMode, SessionConfig};
pub use error::{Error, Result};
pub use pipeline::{LifecycleState, Player, Recorder};

/// Application-wide constants
pub mod constants {
    use std::net::Ipv4Addr;

    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

    /// Default frame size in samples (20 ms at 8 kHz)
    pub const DEFAULT_FRAME_SIZE: usize = 160;

    /// Bytes per PCM16 sample
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Default codec quality
    pub const DEFAULT_QUALITY: u8 = 4;

    /// Highest codec quality
    pub const MAX_QUALITY: u8 = 10;

    /// Sample rates accepted by the Opus codec
    pub const OPUS_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

    /// Default UDP port for voice
    pub const DEFAULT_UDP_PORT: u16 = 2010;

    /// Default multicast group
    pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 20, 10);

    /// Default receive poll interval in milliseconds
    pub const DEFAULT_RECEIVE_POLL_MS: u64 = 100;

    /// Maximum UDP payload over IPv4
    pub const MAX_DATAGRAM_SIZE: usize = 65_507;

    /// Frames buffered between the audio callback and the pipeline thread
    pub const DEVICE_QUEUE_FRAMES: usize = 16;
}
