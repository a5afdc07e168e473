//! Shared helpers for integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lan_ptt::{
    audio::{AudioBackend, InputDevice, OutputDevice},
    error::AudioError,
    AudioSettings, CastMode, SessionConfig,
};

/// Device activity recorded by [`MockBackend`]
#[derive(Default)]
pub struct MockState {
    pub fail_input: AtomicBool,
    pub fail_output: AtomicBool,
    pub input_starts: AtomicUsize,
    pub input_releases: AtomicUsize,
    pub output_starts: AtomicUsize,
    pub output_releases: AtomicUsize,
    pub played: Mutex<Vec<Vec<i16>>>,
}

/// Audio backend that fakes a microphone and records what is played
#[derive(Clone)]
pub struct MockBackend {
    pub state: Arc<MockState>,
    /// Frames the microphone yields per session
    frames_per_session: usize,
    /// Delay before each captured frame
    pace: Duration,
}

impl MockBackend {
    pub fn new(frames_per_session: usize) -> Self {
        Self {
            state: Arc::new(MockState::default()),
            frames_per_session,
            pace: Duration::from_millis(1),
        }
    }

    /// Microphone that never runs dry
    pub fn endless() -> Self {
        let mut backend = Self::new(usize::MAX);
        backend.pace = Duration::from_millis(2);
        backend
    }

    pub fn played(&self) -> Vec<Vec<i16>> {
        self.state.played.lock().clone()
    }

    pub fn input_starts(&self) -> usize {
        self.state.input_starts.load(Ordering::SeqCst)
    }

    pub fn input_releases(&self) -> usize {
        self.state.input_releases.load(Ordering::SeqCst)
    }

    pub fn output_starts(&self) -> usize {
        self.state.output_starts.load(Ordering::SeqCst)
    }

    pub fn output_releases(&self) -> usize {
        self.state.output_releases.load(Ordering::SeqCst)
    }
}

impl AudioBackend for MockBackend {
    fn open_input(&self, settings: &AudioSettings) -> Result<Box<dyn InputDevice>, AudioError> {
        if self.state.fail_input.load(Ordering::SeqCst) {
            return Err(AudioError::DeviceNotFound("mock microphone".into()));
        }
        Ok(Box::new(MockInput {
            state: self.state.clone(),
            remaining: self.frames_per_session,
            produced: 0,
            pace: self.pace,
            frame_size: settings.frame_size,
        }))
    }

    fn open_output(&self, _settings: &AudioSettings) -> Result<Box<dyn OutputDevice>, AudioError> {
        if self.state.fail_output.load(Ordering::SeqCst) {
            return Err(AudioError::DeviceNotFound("mock speaker".into()));
        }
        Ok(Box::new(MockOutput {
            state: self.state.clone(),
        }))
    }
}

/// Deterministic content of the `index`-th captured frame (1-based)
pub fn test_frame(index: usize, frame_size: usize) -> Vec<i16> {
    (0..frame_size)
        .map(|i| (((index * 7 + i) % 1000) as i16 - 500) * 16)
        .collect()
}

struct MockInput {
    state: Arc<MockState>,
    remaining: usize,
    produced: usize,
    pace: Duration,
    frame_size: usize,
}

impl InputDevice for MockInput {
    fn start(&mut self) -> Result<(), AudioError> {
        self.state.input_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self, frame: &mut [i16]) -> Result<usize, AudioError> {
        thread::sleep(self.pace);
        if self.remaining == 0 {
            thread::sleep(Duration::from_millis(10));
            return Err(AudioError::BufferUnderrun);
        }
        self.remaining -= 1;
        self.produced += 1;
        let samples = test_frame(self.produced, self.frame_size);
        frame.copy_from_slice(&samples[..frame.len()]);
        Ok(frame.len())
    }

    fn stop(&mut self) {}

    fn release(&mut self) {
        self.state.input_releases.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockOutput {
    state: Arc<MockState>,
}

impl OutputDevice for MockOutput {
    fn start(&mut self) -> Result<(), AudioError> {
        self.state.output_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write(&mut self, frame: &[i16]) -> Result<usize, AudioError> {
        self.state.played.lock().push(frame.to_vec());
        Ok(frame.len())
    }

    fn stop(&mut self) {}

    fn release(&mut self) {
        self.state.output_releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// A UDP port that was free a moment ago
pub fn free_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .and_then(|socket| socket.local_addr())
        .map(|addr| addr.port())
        .unwrap()
}

/// Unicast over loopback with echo suppression off
pub fn loopback_config(port: u16, compression: bool) -> SessionConfig {
    let mut config = SessionConfig::default();
    config.cast.mode = CastMode::Unicast;
    config.cast.unicast_addr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.cast.bind_addr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.cast.port = port;
    config.audio.compression = compression;
    config.audio.echo_suppression = false;
    config.audio.receive_poll_ms = 20;
    config
}

/// Multicast over the loopback interface with echo suppression off
pub fn multicast_config(port: u16, group: Ipv4Addr) -> SessionConfig {
    let mut config = loopback_config(port, false);
    config.cast.mode = CastMode::Multicast;
    config.cast.multicast_addr = group;
    config.cast.multicast_interface = Ipv4Addr::LOCALHOST;
    config.cast.bind_addr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    config
}

/// Poll `condition` until it holds or five seconds pass
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
