//! Playback pipeline: UDP → codec → speaker
//!
//! Every datagram of the session length is played, then its sequence
//! number feeds the loss tracker. Datagrams from our own addresses and
//! datagrams of the wrong length are dropped before decoding.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

use super::{join_worker, spawn_worker, Control, LifecycleState, Session, Worker};
use crate::audio::{pcm_from_le_bytes, AudioBackend, OutputDevice};
use crate::codec::{self, FrameDecoder};
use crate::config::SessionConfig;
use crate::error::{ConfigError, NetworkError, Result};
use crate::network::{AddressLookup, TransportSocket};
use crate::protocol::{payload, read_header, LossTracker, PacketLayout};

/// Snapshot of the playback counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Sequence number of the last played packet
    pub seq_num: u32,
    /// Frames inferred missing from sequence gaps
    pub losses: u64,
    /// Frames played
    pub progress: u64,
    /// Datagrams dropped as our own echo
    pub suppressed: u64,
    /// Datagrams dropped for having the wrong length
    pub malformed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    tracker: LossTracker,
    suppressed: u64,
    malformed: u64,
}

/// Handle to the playback thread
pub struct Player {
    control: Arc<Control>,
    counters: Arc<Mutex<Counters>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    /// Start the playback thread in the PAUSED state
    pub fn spawn(
        config: SessionConfig,
        backend: Arc<dyn AudioBackend>,
        addresses: Arc<dyn AddressLookup>,
    ) -> Result<Self> {
        config.validate()?;

        let control = Arc::new(Control::new(config));
        let counters = Arc::new(Mutex::new(Counters::default()));
        let worker = PlaybackWorker {
            control: control.clone(),
            counters: counters.clone(),
            backend,
            addresses,
        };
        let handle = spawn_worker("ptt-player", worker, control.clone())?;

        Ok(Self {
            control,
            counters,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Start listening; `false` once finished
    pub fn resume(&self) -> bool {
        self.control.lifecycle.resume()
    }

    /// Stop listening, leave any multicast group and release the speaker
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

    /// Whether a session is running with its socket open
    pub fn is_listening(&self) -> bool {
        self.state() == LifecycleState::Running && self.control.lifecycle.has_socket()
    }

    pub fn losses(&self) -> u64 {
        self.counters.lock().tracker.losses()
    }

    /// Sequence number of the last played packet
    pub fn seq_num(&self) -> u32 {
        self.counters.lock().tracker.last_seq()
    }

    pub fn progress(&self) -> u64 {
        self.counters.lock().tracker.progress()
    }

    pub fn reset_losses(&self) {
        self.counters.lock().tracker.reset_losses();
    }

    pub fn reset_progress(&self) {
        self.counters.lock().tracker.reset_progress();
    }

    /// All counters, read together
    pub fn stats(&self) -> PlaybackStats {
        let counters = self.counters.lock();
        PlaybackStats {
            seq_num: counters.tracker.last_seq(),
            losses: counters.tracker.losses(),
            progress: counters.tracker.progress(),
            suppressed: counters.suppressed,
            malformed: counters.malformed,
        }
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

    /// Wait for the playback thread to exit. Call after [`finish`](Self::finish).
    pub fn join(&self) {
        join_worker("ptt-player", &self.handle);
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.finish();
        self.join();
    }
}

struct PlaybackWorker {
    control: Arc<Control>,
    counters: Arc<Mutex<Counters>>,
    backend: Arc<dyn AudioBackend>,
    addresses: Arc<dyn AddressLookup>,
}

struct PlaybackSession {
    socket: Arc<TransportSocket>,
    output: Box<dyn OutputDevice>,
    decoder: Option<Box<dyn FrameDecoder>>,
    layout: PacketLayout,
    echo_suppression: bool,
    /// One byte longer than a packet so oversized datagrams are detected
    packet: Vec<u8>,
    pcm: Vec<i16>,
}

impl Worker for PlaybackWorker {
    type Active = PlaybackSession;

    const NAME: &'static str = "Player";

    fn open(&mut self, session: Session, config: &SessionConfig) -> Result<PlaybackSession> {
        let audio = &config.audio;
        let layout = config.layout();
        let decoder = if audio.compression {
            Some(codec::open_decoder(audio)?)
        } else {
            None
        };

        let mut output = self.backend.open_output(audio)?;
        if let Err(e) = output.start() {
            output.release();
            return Err(e.into());
        }

        let socket = match TransportSocket::open_receiver(&config.cast, audio.receive_poll()) {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                output.stop();
                output.release();
                return Err(e.into());
            }
        };
        self.control.lifecycle.attach_socket(session, socket.clone());

        tracing::debug!(
            "Listening on {} for {}-byte packets",
            config.cast.listen_addr(),
            layout.packet_len()
        );

        Ok(PlaybackSession {
            socket,
            output,
            decoder,
            layout,
            echo_suppression: audio.echo_suppression,
            packet: vec![0u8; layout.packet_len() + 1],
            pcm: vec![0; audio.frame_size],
        })
    }

    fn step(&mut self, active: &mut PlaybackSession) {
        let (len, source) = match active.socket.recv(&mut active.packet) {
            Ok(received) => received,
            Err(NetworkError::Timeout) => return,
            Err(e) if e.is_control() => {
                tracing::debug!("Receive interrupted: {}", e);
                return;
            }
            Err(e) => {
                tracing::warn!("Receive failed: {}", e);
                return;
            }
        };

        if active.echo_suppression && self.addresses.contains(&source.ip()) {
            tracing::trace!("Dropping own datagram from {}", source);
            self.counters.lock().suppressed += 1;
            return;
        }

        if len != active.layout.packet_len() {
            tracing::debug!(
                "Dropping {}-byte datagram from {} (expected {})",
                len,
                source,
                active.layout.packet_len()
            );
            self.counters.lock().malformed += 1;
            return;
        }

        let packet = &active.packet[..len];
        match &mut active.decoder {
            Some(decoder) => {
                if let Err(e) = decoder.decode(payload(packet), &mut active.pcm) {
                    tracing::warn!("Dropping undecodable frame from {}: {}", source, e);
                    return;
                }
            }
            None => pcm_from_le_bytes(payload(packet), &mut active.pcm),
        }

        if let Err(e) = active.output.write(&active.pcm) {
            tracing::warn!("Playback failed: {}", e);
            return;
        }

        let seq = read_header(packet);
        let lost = self.counters.lock().tracker.record(seq);
        if lost > 0 {
            tracing::debug!("{} frame(s) lost before packet {}", lost, seq);
        }
    }

    fn close(&mut self, mut active: PlaybackSession) {
        active.socket.close();
        active.output.stop();
        active.output.release();
    }
}
