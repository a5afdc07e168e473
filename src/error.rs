//! Error types for the push-to-talk transport

use thiserror::Error;

/// Top-level error returned by the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio device: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec: {0}")]
    Codec(#[from] CodecError),

    #[error("Network: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Microphone and speaker failures
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No such device: {0}")]
    DeviceNotFound(String),

    #[error("Stream failure: {0}")]
    StreamError(String),

    #[error("Unsupported device format: {0}")]
    UnsupportedFormat(String),

    /// The speaker did not drain its queue in time
    #[error("Playback queue full")]
    BufferOverflow,

    /// The microphone produced nothing in time
    #[error("No audio captured")]
    BufferUnderrun,

    #[error("Device already released")]
    Released,
}

/// Frame codec failures
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Cannot create encoder: {0}")]
    EncoderInit(String),

    #[error("Cannot create decoder: {0}")]
    DecoderInit(String),

    #[error("Encode failed: {0}")]
    EncodingFailed(String),

    #[error("Decode failed: {0}")]
    DecodingFailed(String),

    /// A frame or payload did not have the session's fixed size
    #[error("Unexpected frame size: {0}")]
    InvalidFrameSize(usize),
}

/// Socket failures and control signals
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Cannot bind socket: {0}")]
    BindFailed(String),

    #[error("Cannot set socket option {0}")]
    SocketOption(String),

    #[error("Multicast membership: {0}")]
    Multicast(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// The socket was closed by `pause()` or `finish()`.
    #[error("Socket closed")]
    Cancelled,

    /// No datagram arrived within the receive poll interval.
    #[error("Receive poll elapsed")]
    Timeout,
}

impl NetworkError {
    /// Whether this error is a control signal rather than a network failure.
    pub fn is_control(&self) -> bool {
        matches!(self, NetworkError::Cancelled | NetworkError::Timeout)
    }
}

/// Loading, saving and validating [`SessionConfig`](crate::SessionConfig)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("No config directory available on this platform")]
    NoConfigDir,
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
