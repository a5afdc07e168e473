//! Opus decoder wrapper

use opus::{Channels, Decoder};

use super::FrameDecoder;
use crate::config::PcmFormat;
use crate::error::CodecError;

/// Opus decoder producing fixed-size mono frames
pub struct OpusDecoder {
    decoder: Decoder,
    format: PcmFormat,
    /// Frames decoded
    frames_decoded: u64,
}

impl OpusDecoder {
    pub fn new(format: PcmFormat) -> Result<Self, CodecError> {
        let decoder = Decoder::new(format.sample_rate, Channels::Mono)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        Ok(Self {
            decoder,
            format,
            frames_decoded: 0,
        })
    }

    /// Reset decoder state
    pub fn reset(&mut self) -> Result<(), CodecError> {
        self.decoder
            .reset_state()
            .map_err(|e| CodecError::DecoderInit(e.to_string()))
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}

impl FrameDecoder for OpusDecoder {
    fn decode(&mut self, payload: &[u8], pcm: &mut [i16]) -> Result<usize, CodecError> {
        if pcm.len() < self.format.frame_size {
            return Err(CodecError::InvalidFrameSize(pcm.len()));
        }

        let samples = self
            .decoder
            .decode(payload, &mut pcm[..self.format.frame_size], false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        if samples != self.format.frame_size {
            return Err(CodecError::InvalidFrameSize(samples));
        }

        self.frames_decoded += 1;
        Ok(samples)
    }
}
