//! Frame codec adapter
//!
//! A codec turns one fixed-size PCM frame into a payload of a fixed byte
//! length and back. The length depends only on quality and frame format,
//! so both ends of a session compute the same packet size independently.

pub mod decoder;
pub mod encoder;

pub use decoder::OpusDecoder;
pub use encoder::OpusEncoder;

use crate::config::{AudioSettings, PcmFormat};
use crate::constants::MAX_QUALITY;
use crate::error::CodecError;

/// Constant bitrate per quality step, in bits per second
const QUALITY_BITRATES: [u32; MAX_QUALITY as usize + 1] = [
    6_000, 8_000, 10_000, 12_000, 14_000, 16_000, 18_000, 20_000, 24_000, 28_000, 32_000,
];

/// Bitrate used for a quality setting (clamped to the highest step)
pub fn bitrate_for_quality(quality: u8) -> u32 {
    QUALITY_BITRATES[quality.min(MAX_QUALITY) as usize]
}

/// Encoded payload size in bytes for one frame
pub fn encoded_size(quality: u8, format: &PcmFormat) -> usize {
    let bitrate = bitrate_for_quality(quality) as u64;
    let frame_size = format.frame_size.max(1) as u64;
    // Same integer steps libopus uses to size a CBR frame
    let frames_per_6s = (6 * format.sample_rate as u64 / frame_size).max(1);
    let bits = bitrate * 6 / frames_per_6s;
    ((bits + 4) / 8) as usize
}

/// Compresses PCM frames into fixed-size payloads
pub trait FrameEncoder: Send {
    /// Payload size every call to `encode` produces
    fn encoded_size(&self) -> usize;

    /// Encode one frame into `out`, which must be `encoded_size()` long
    fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, CodecError>;
}

/// Expands fixed-size payloads back into PCM frames
pub trait FrameDecoder: Send {
    /// Decode one payload into `pcm`; returns samples written
    fn decode(&mut self, payload: &[u8], pcm: &mut [i16]) -> Result<usize, CodecError>;
}

/// Encoder for the configured format and quality
pub fn open_encoder(settings: &AudioSettings) -> Result<Box<dyn FrameEncoder>, CodecError> {
    Ok(Box::new(OpusEncoder::new(settings.format(), settings.quality)?))
}

/// Decoder for the configured format
pub fn open_decoder(settings: &AudioSettings) -> Result<Box<dyn FrameDecoder>, CodecError> {
    Ok(Box::new(OpusDecoder::new(settings.format())?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_size_table() {
        let format = PcmFormat { sample_rate: 8000, frame_size: 160 };
        assert_eq!(encoded_size(0, &format), 15);
        assert_eq!(encoded_size(4, &format), 35);
        assert_eq!(encoded_size(10, &format), 80);
        // Out of range quality clamps
        assert_eq!(encoded_size(42, &format), 80);
    }

    #[test]
    fn test_encoded_size_grows_with_quality() {
        let format = PcmFormat { sample_rate: 16000, frame_size: 320 };
        let sizes: Vec<usize> = (0..=MAX_QUALITY).map(|q| encoded_size(q, &format)).collect();
        assert!(sizes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_encode_decode_keeps_frame_size() {
        let settings = AudioSettings::default();
        let mut encoder = open_encoder(&settings).unwrap();
        let mut decoder = open_decoder(&settings).unwrap();

        let pcm: Vec<i16> = (0..settings.frame_size)
            .map(|i| ((i as f32 * 0.3).sin() * 8000.0) as i16)
            .collect();
        let mut payload = vec![0u8; encoder.encoded_size()];
        let written = encoder.encode(&pcm, &mut payload).unwrap();
        assert_eq!(written, settings.payload_len());

        let mut decoded = vec![0i16; settings.frame_size];
        let samples = decoder.decode(&payload, &mut decoded).unwrap();
        assert_eq!(samples, settings.frame_size);
    }
}
