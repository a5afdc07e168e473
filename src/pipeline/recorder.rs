//! Capture pipeline: microphone → codec → UDP
//!
//! Each session stamps packets with a fresh sequence starting at 1 and
//! sends exactly one datagram per captured frame.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

use super::{join_worker, spawn_worker, Control, LifecycleState, Session, Worker};
use crate::audio::{pcm_to_le_bytes, AudioBackend, InputDevice};
use crate::codec::{self, FrameEncoder};
use crate::config::SessionConfig;
use crate::error::{AudioError, ConfigError, Error, Result};
use crate::network::{AddressLookup, TransportSocket};
use crate::protocol::{payload_mut, write_header, SequenceCounter};

/// Capture counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Sequence number of the last packet sent this session; 0 before the first
    pub seq_num: u32,
    /// Packets sent since the recorder was created
    pub frames_sent: u64,
    /// Sends that failed for reasons other than a pause
    pub send_failures: u64,
    /// Sequence numbers skipped by loss injection this session
    pub injected_losses: u64,
}

/// Handle to the capture thread
pub struct Recorder {
    control: Arc<Control>,
    stats: Arc<Mutex<CaptureStats>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Recorder {
    /// Start the capture thread in the PAUSED state
    pub fn spawn(
        config: SessionConfig,
        backend: Arc<dyn AudioBackend>,
        addresses: Arc<dyn AddressLookup>,
    ) -> Result<Self> {
        config.validate()?;

        let control = Arc::new(Control::new(config));
        let stats = Arc::new(Mutex::new(CaptureStats::default()));
        let worker = CaptureWorker {
            control: control.clone(),
            stats: stats.clone(),
            backend,
            addresses,
        };
        let handle = spawn_worker("ptt-recorder", worker, control.clone())?;

        Ok(Self {
            control,
            stats,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Start talking; `false` once finished
    pub fn resume(&self) -> bool {
        self.control.lifecycle.resume()
    }

    /// Stop talking and release the microphone
    pub fn pause(&self) {
        self.control.lifecycle.pause();
    }

    /// Stop for good; the thread exits after releasing its resources
    pub fn finish(&self) {
        self.control.lifecycle.finish();
    }

    pub fn state(&self) -> LifecycleState {
        self.control.lifecycle.state()
    }

    /// Sequence number of the last packet sent this session
    pub fn seq_num(&self) -> u32 {
        self.stats.lock().seq_num
    }

    pub fn stats(&self) -> CaptureStats {
        *self.stats.lock()
    }

    /// Why the last session failed to start
    pub fn last_error(&self) -> Option<String> {
        self.control.lifecycle.last_error()
    }

    /// Configuration used from the next session on
    pub fn set_config(&self, config: SessionConfig) -> std::result::Result<(), ConfigError> {
        config.validate()?;
        *self.control.config.lock() = config;
        Ok(())
    }

    pub fn config(&self) -> SessionConfig {
        self.control.config.lock().clone()
    }

    /// Wait for the capture thread to exit. Call after [`finish`](Self::finish).
    pub fn join(&self) {
        join_worker("ptt-recorder", &self.handle);
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.finish();
        self.join();
    }
}

struct CaptureWorker {
    control: Arc<Control>,
    stats: Arc<Mutex<CaptureStats>>,
    backend: Arc<dyn AudioBackend>,
    addresses: Arc<dyn AddressLookup>,
}

struct CaptureSession {
    socket: Arc<TransportSocket>,
    input: Box<dyn InputDevice>,
    encoder: Option<Box<dyn FrameEncoder>>,
    sequence: SequenceCounter,
    pcm: Vec<i16>,
    packet: Vec<u8>,
}

impl CaptureSession {
    /// Capture one frame into the packet buffer; returns its sequence number
    fn fill_packet(&mut self) -> Result<u32> {
        let read = self.input.read(&mut self.pcm)?;
        if read < self.pcm.len() {
            self.pcm[read..].fill(0);
        }

        match &mut self.encoder {
            Some(encoder) => {
                encoder.encode(&self.pcm, payload_mut(&mut self.packet))?;
            }
            None => pcm_to_le_bytes(&self.pcm, payload_mut(&mut self.packet)),
        }

        let seq = self.sequence.current();
        write_header(&mut self.packet, seq);
        self.sequence.advance();
        Ok(seq)
    }
}

impl Worker for CaptureWorker {
    type Active = CaptureSession;

    const NAME: &'static str = "Recorder";

    fn open(&mut self, session: Session, config: &SessionConfig) -> Result<CaptureSession> {
        let audio = &config.audio;

        let sequence = SequenceCounter::new(audio.fake_loss_probability);
        {
            let mut stats = self.stats.lock();
            stats.seq_num = 0;
            stats.injected_losses = 0;
        }
        self.addresses.refresh();

        let socket = Arc::new(TransportSocket::open_sender(&config.cast)?);
        self.control.lifecycle.attach_socket(session, socket.clone());

        let layout = config.layout();
        let encoder = if audio.compression {
            Some(codec::open_encoder(audio)?)
        } else {
            None
        };

        let mut input = self.backend.open_input(audio)?;
        if let Err(e) = input.start() {
            input.release();
            return Err(e.into());
        }

        tracing::debug!(
            "Sending {}-byte packets to {}",
            layout.packet_len(),
            config.cast.destination()
        );

        Ok(CaptureSession {
            socket,
            input,
            encoder,
            sequence,
            pcm: vec![0; audio.frame_size],
            packet: layout.allocate(),
        })
    }

    fn step(&mut self, active: &mut CaptureSession) {
        let seq = match active.fill_packet() {
            Ok(seq) => seq,
            Err(Error::Audio(AudioError::BufferUnderrun)) => {
                tracing::trace!("No audio captured");
                return;
            }
            Err(e) => {
                tracing::warn!("Capture failed: {}", e);
                return;
            }
        };

        match active.socket.send(&active.packet) {
            Ok(_) => {
                let mut stats = self.stats.lock();
                stats.seq_num = seq;
                stats.frames_sent += 1;
                stats.injected_losses = active.sequence.skipped();
            }
            Err(e) if e.is_control() => {
                tracing::debug!("Send interrupted: {}", e);
            }
            Err(e) => {
                tracing::warn!("Send of packet {} failed: {}", seq, e);
                self.stats.lock().send_failures += 1;
            }
        }
    }

    fn close(&mut self, mut active: CaptureSession) {
        active.input.stop();
        active.input.release();
        active.socket.close();
    }
}
