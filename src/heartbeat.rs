//! Periodic on/off toggling of a pipeline
//!
//! Used to keep a link alive or to exercise pause/resume: while enabled,
//! the target is resumed for `on`, then paused for `off`, repeatedly.
//! The thread sleeps on a condition variable between toggles, so
//! disabling or stopping it takes effect immediately.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::pipeline::{Player, Recorder};

/// Something that can be switched on and off
pub trait Toggle: Send + Sync {
    fn resume(&self) -> bool;
    fn pause(&self);
}

impl Toggle for Recorder {
    fn resume(&self) -> bool {
        Recorder::resume(self)
    }

    fn pause(&self) {
        Recorder::pause(self)
    }
}

impl Toggle for Player {
    fn resume(&self) -> bool {
        Player::resume(self)
    }

    fn pause(&self) {
        Player::pause(self)
    }
}

#[derive(Debug)]
struct State {
    enabled: bool,
    stopped: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

impl Shared {
    /// Sleep for `period` unless stopped or disabled; `false` if interrupted
    fn wait(&self, period: Duration) -> bool {
        let deadline = Instant::now() + period;
        let mut state = self.state.lock();
        while state.enabled && !state.stopped {
            if self.wake.wait_until(&mut state, deadline).timed_out() {
                return state.enabled && !state.stopped;
            }
        }
        false
    }

    /// Block while disabled; `false` once stopped
    fn wait_enabled(&self) -> bool {
        let mut state = self.state.lock();
        while !state.enabled && !state.stopped {
            self.wake.wait(&mut state);
        }
        !state.stopped
    }
}

/// Background toggler
pub struct Heartbeat {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Start toggling `target`; enabled from the start
    pub fn spawn(target: Arc<dyn Toggle>, on: Duration, off: Duration) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                enabled: true,
                stopped: false,
            }),
            wake: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("ptt-heartbeat".to_string())
            .spawn(move || run(thread_shared, target, on, off))?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Suspend or restart toggling; a disabled heartbeat leaves the target paused
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.state.lock().enabled = enabled;
        self.shared.wake.notify_all();
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.state.lock().enabled
    }

    /// Stop the thread and wait for it
    pub fn stop(&mut self) {
        self.shared.state.lock().stopped = true;
        self.shared.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Heartbeat thread panicked");
            }
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: Arc<Shared>, target: Arc<dyn Toggle>, on: Duration, off: Duration) {
    tracing::debug!("Heartbeat started ({:?} on, {:?} off)", on, off);

    while shared.wait_enabled() {
        if !target.resume() {
            tracing::debug!("Heartbeat target finished");
            break;
        }
        let completed = shared.wait(on);
        target.pause();
        if completed {
            shared.wait(off);
        }
    }

    tracing::debug!("Heartbeat stopped");
}
