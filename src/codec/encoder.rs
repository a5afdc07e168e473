//! Opus encoder wrapper
//!
//! Runs libopus in hard CBR so every frame encodes to the same number of
//! bytes. The receiver relies on that to size its datagram buffer.

use opus::{Application, Channels, Encoder};

use super::{bitrate_for_quality, encoded_size, FrameEncoder};
use crate::config::PcmFormat;
use crate::error::CodecError;

/// Opus encoder with a fixed output size
pub struct OpusEncoder {
    encoder: Encoder,
    format: PcmFormat,
    quality: u8,
    encoded_size: usize,
    /// Frame counter for statistics
    frames_encoded: u64,
}

impl OpusEncoder {
    /// Create a mono voice encoder for the given frame format and quality
    pub fn new(format: PcmFormat, quality: u8) -> Result<Self, CodecError> {
        let mut encoder = Encoder::new(format.sample_rate, Channels::Mono, Application::Voip)
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        Self::configure_encoder(&mut encoder, quality)?;

        Ok(Self {
            encoder,
            format,
            quality,
            encoded_size: encoded_size(quality, &format),
            frames_encoded: 0,
        })
    }

    fn configure_encoder(encoder: &mut Encoder, quality: u8) -> Result<(), CodecError> {
        let bitrate = bitrate_for_quality(quality);
        encoder
            .set_bitrate(opus::Bitrate::Bits(bitrate as i32))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;

        // Constant size frames
        encoder
            .set_vbr(false)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set VBR: {}", e)))?;

        encoder
            .set_inband_fec(false)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set FEC: {}", e)))?;

        Ok(())
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }
}

impl FrameEncoder for OpusEncoder {
    fn encoded_size(&self) -> usize {
        self.encoded_size
    }

    fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, CodecError> {
        if pcm.len() != self.format.frame_size {
            return Err(CodecError::InvalidFrameSize(pcm.len()));
        }
        if out.len() < self.encoded_size {
            return Err(CodecError::EncodingFailed(format!(
                "output buffer of {} bytes, need {}",
                out.len(),
                self.encoded_size
            )));
        }

        let size = self
            .encoder
            .encode(pcm, &mut out[..self.encoded_size])
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        if size != self.encoded_size {
            return Err(CodecError::InvalidFrameSize(size));
        }

        self.frames_encoded += 1;
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrowband() -> PcmFormat {
        PcmFormat { sample_rate: 8000, frame_size: 160 }
    }

    #[test]
    fn test_encoder_creation() {
        let encoder = OpusEncoder::new(narrowband(), 4).unwrap();
        assert_eq!(encoder.quality(), 4);
        assert_eq!(encoder.encoded_size(), 35);
    }

    #[test]
    fn test_every_frame_has_same_size() {
        let mut encoder = OpusEncoder::new(narrowband(), 6).unwrap();
        let mut out = vec![0u8; encoder.encoded_size()];

        let silence = vec![0i16; 160];
        let tone: Vec<i16> = (0..160).map(|i| ((i as f32 * 0.7).sin() * 12000.0) as i16).collect();
        for frame in [&silence, &tone, &silence, &tone] {
            assert_eq!(encoder.encode(frame, &mut out).unwrap(), 45);
        }
        assert_eq!(encoder.frames_encoded(), 4);
    }

    #[test]
    fn test_rejects_wrong_frame_size() {
        let mut encoder = OpusEncoder::new(narrowband(), 4).unwrap();
        let mut out = vec![0u8; encoder.encoded_size()];
        assert!(matches!(
            encoder.encode(&[0i16; 100], &mut out),
            Err(CodecError::InvalidFrameSize(100))
        ));
    }

    #[test]
    fn test_wideband_encoder() {
        let format = PcmFormat { sample_rate: 16000, frame_size: 320 };
        let mut encoder = OpusEncoder::new(format, 10).unwrap();
        let mut out = vec![0u8; encoder.encoded_size()];
        assert_eq!(encoder.encode(&vec![0i16; 320], &mut out).unwrap(), 80);
    }
}
