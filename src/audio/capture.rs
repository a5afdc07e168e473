//! Audio capture from input devices
//!
//! cpal delivers samples on its own callback thread. The callback downmixes
//! to mono PCM16 and hands chunks over a bounded channel, which `read`
//! drains to offer the blocking read the recorder loop expects.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{f32_to_i16, InputDevice};
use crate::config::PcmFormat;
use crate::constants::DEVICE_QUEUE_FRAMES;
use crate::error::AudioError;

/// Longest a read waits for the callback before reporting an underrun
const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Blocking reader over a cpal input stream
pub struct CpalInput {
    device: cpal::Device,
    config: StreamConfig,
    format: PcmFormat,
    stream: Option<cpal::Stream>,
    samples_rx: Option<Receiver<Vec<i16>>>,
    /// Chunk currently being consumed and the read position in it
    pending: Vec<i16>,
    pending_pos: usize,
    /// Chunks dropped because the reader fell behind
    overflows: Arc<AtomicU64>,
}

impl CpalInput {
    pub fn new(device: cpal::Device, config: StreamConfig, format: PcmFormat) -> Self {
        Self {
            device,
            config,
            format,
            stream: None,
            samples_rx: None,
            pending: Vec::new(),
            pending_pos: 0,
            overflows: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Chunks dropped since the device was opened
    pub fn overflow_count(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }
}

impl InputDevice for CpalInput {
    fn start(&mut self) -> Result<(), AudioError> {
        if let Some(stream) = &self.stream {
            return stream.play().map_err(|e| AudioError::StreamError(e.to_string()));
        }

        let (samples_tx, samples_rx) = bounded::<Vec<i16>>(DEVICE_QUEUE_FRAMES);
        let channels = self.config.channels.max(1) as usize;
        let overflows = self.overflows.clone();

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let chunk: Vec<i16> = data
                        .chunks(channels)
                        .map(|frame| f32_to_i16(frame.iter().sum::<f32>() / frame.len() as f32))
                        .collect();
                    if samples_tx.try_send(chunk).is_err() {
                        overflows.fetch_add(1, Ordering::Relaxed);
                    }
                },
                move |err| {
                    tracing::warn!("Input stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.stream = Some(stream);
        self.samples_rx = Some(samples_rx);
        Ok(())
    }

    fn read(&mut self, frame: &mut [i16]) -> Result<usize, AudioError> {
        let samples_rx = self.samples_rx.as_ref().ok_or(AudioError::Released)?;
        let mut filled = 0;

        while filled < frame.len() {
            if self.pending_pos >= self.pending.len() {
                match samples_rx.recv_timeout(READ_TIMEOUT) {
                    Ok(chunk) => {
                        self.pending = chunk;
                        self.pending_pos = 0;
                    }
                    Err(RecvTimeoutError::Timeout) => return Err(AudioError::BufferUnderrun),
                    Err(RecvTimeoutError::Disconnected) => return Err(AudioError::Released),
                }
            }

            let n = (frame.len() - filled).min(self.pending.len() - self.pending_pos);
            frame[filled..filled + n]
                .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
            filled += n;
            self.pending_pos += n;
        }

        Ok(filled)
    }

    fn stop(&mut self) {
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                tracing::debug!("Failed to pause input stream: {}", e);
            }
        }
    }

    fn release(&mut self) {
        // Dropping the stream closes the device
        self.stream = None;
        self.samples_rx = None;
        self.pending.clear();
        self.pending_pos = 0;
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.release();
    }
}
