//! Audio subsystem module
//!
//! Pipelines talk to sound hardware through the [`AudioBackend`],
//! [`InputDevice`] and [`OutputDevice`] traits. Devices are opened on the
//! pipeline thread at session start and released when the session ends,
//! so they need not be `Send`.

pub mod capture;
pub mod device;
pub mod playback;

pub use capture::CpalInput;
pub use device::{list_devices, CpalBackend, DeviceInfo};
pub use playback::CpalOutput;

use crate::config::AudioSettings;
use crate::error::AudioError;

/// Factory for input and output devices
pub trait AudioBackend: Send + Sync {
    /// Open the capture device described by `settings`
    fn open_input(&self, settings: &AudioSettings) -> Result<Box<dyn InputDevice>, AudioError>;

    /// Open the playback device described by `settings`
    fn open_output(&self, settings: &AudioSettings) -> Result<Box<dyn OutputDevice>, AudioError>;
}

/// Microphone-like source of mono PCM16 frames
pub trait InputDevice {
    /// Begin recording
    fn start(&mut self) -> Result<(), AudioError>;

    /// Block until `frame` is filled; returns samples read
    fn read(&mut self, frame: &mut [i16]) -> Result<usize, AudioError>;

    /// Stop recording. Safe to call repeatedly.
    fn stop(&mut self);

    /// Free the device. Safe to call repeatedly and after a failed start.
    fn release(&mut self);
}

/// Speaker-like sink of mono PCM16 frames
pub trait OutputDevice {
    /// Begin playing
    fn start(&mut self) -> Result<(), AudioError>;

    /// Queue `frame` for playback; returns samples written
    fn write(&mut self, frame: &[i16]) -> Result<usize, AudioError>;

    /// Stop playing. Safe to call repeatedly.
    fn stop(&mut self);

    /// Free the device. Safe to call repeatedly and after a failed start.
    fn release(&mut self);
}

/// Convert a float sample to PCM16
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Convert a PCM16 sample to float
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

/// Pack samples as little-endian PCM16 bytes
///
/// Writes `min(samples.len(), out.len() / 2)` samples.
pub fn pcm_to_le_bytes(samples: &[i16], out: &mut [u8]) {
    for (sample, bytes) in samples.iter().zip(out.chunks_exact_mut(2)) {
        bytes.copy_from_slice(&sample.to_le_bytes());
    }
}

/// Unpack little-endian PCM16 bytes into samples
pub fn pcm_from_le_bytes(bytes: &[u8], out: &mut [i16]) {
    for (sample, pair) in out.iter_mut().zip(bytes.chunks_exact(2)) {
        *sample = i16::from_le_bytes([pair[0], pair[1]]);
    }
}
