//! Audio playback to output devices
//!
//! `write` queues whole frames on a bounded channel; the cpal callback
//! pulls samples from it and plays silence when the queue runs dry. A full
//! queue makes `write` block, which paces the player to the device clock.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{i16_to_f32, OutputDevice};
use crate::config::PcmFormat;
use crate::constants::DEVICE_QUEUE_FRAMES;
use crate::error::AudioError;

/// Longest a write waits for room in the queue
const WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// Blocking writer over a cpal output stream
pub struct CpalOutput {
    device: cpal::Device,
    config: StreamConfig,
    format: PcmFormat,
    stream: Option<cpal::Stream>,
    frames_tx: Option<Sender<Vec<i16>>>,
    /// Callback invocations that ran out of queued audio
    underruns: Arc<AtomicU64>,
}

impl CpalOutput {
    pub fn new(device: cpal::Device, config: StreamConfig, format: PcmFormat) -> Self {
        Self {
            device,
            config,
            format,
            stream: None,
            frames_tx: None,
            underruns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Callbacks that played silence for lack of data
    pub fn underrun_count(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }
}

impl OutputDevice for CpalOutput {
    fn start(&mut self) -> Result<(), AudioError> {
        if let Some(stream) = &self.stream {
            return stream.play().map_err(|e| AudioError::StreamError(e.to_string()));
        }

        let (frames_tx, frames_rx) = bounded::<Vec<i16>>(DEVICE_QUEUE_FRAMES);
        let channels = self.config.channels.max(1) as usize;
        let underruns = self.underruns.clone();
        let mut pending: Vec<i16> = Vec::new();
        let mut pending_pos = 0usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut starved = false;
                    for frame in data.chunks_mut(channels) {
                        if pending_pos >= pending.len() {
                            match frames_rx.try_recv() {
                                Ok(next) => {
                                    pending = next;
                                    pending_pos = 0;
                                }
                                Err(_) => {
                                    starved = true;
                                    frame.fill(0.0);
                                    continue;
                                }
                            }
                        }
                        frame.fill(i16_to_f32(pending[pending_pos]));
                        pending_pos += 1;
                    }
                    if starved {
                        underruns.fetch_add(1, Ordering::Relaxed);
                    }
                },
                move |err| {
                    tracing::warn!("Output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.stream = Some(stream);
        self.frames_tx = Some(frames_tx);
        Ok(())
    }

    fn write(&mut self, frame: &[i16]) -> Result<usize, AudioError> {
        let frames_tx = self.frames_tx.as_ref().ok_or(AudioError::Released)?;
        match frames_tx.send_timeout(frame.to_vec(), WRITE_TIMEOUT) {
            Ok(()) => Ok(frame.len()),
            Err(SendTimeoutError::Timeout(_)) => Err(AudioError::BufferOverflow),
            Err(SendTimeoutError::Disconnected(_)) => Err(AudioError::Released),
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                tracing::debug!("Failed to pause output stream: {}", e);
            }
        }
    }

    fn release(&mut self) {
        self.frames_tx = None;
        self.stream = None;
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.release();
    }
}
