//! Pause/resume/finish state machine shared by both pipelines
//!
//! ```text
//!              resume()                  finish()
//!   PAUSED ──────────────▶ RUNNING ──────────────▶ FINISHED
//!     ▲  (initial)            │                      ▲
//!     └───────────────────────┘                      │
//!              pause()                               │
//!     PAUSED ────────────────────────────────────────┘
//!                          finish()
//! ```
//!
//! The worker thread parks on the condition variable while PAUSED. Each
//! PAUSED → RUNNING transition opens a new session epoch, so a quick
//! `pause(); resume();` still ends the old session (tearing its devices
//! down) before a fresh one starts.
//!
//! The session socket is registered here so that `pause()` can close it
//! under the monitor, which cancels a send or receive blocked on it.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

use crate::network::TransportSocket;

/// Externally visible pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Paused,
    Finished,
}

/// Identifies one RUNNING period of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    epoch: u64,
}

impl Session {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[derive(Debug)]
struct Inner {
    state: LifecycleState,
    epoch: u64,
    socket: Option<Arc<TransportSocket>>,
    last_error: Option<String>,
}

/// Monitor guarding a pipeline's lifecycle
#[derive(Debug)]
pub struct Lifecycle {
    inner: Mutex<Inner>,
    wake: Condvar,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: LifecycleState::Paused,
                epoch: 0,
                socket: None,
                last_error: None,
            }),
            wake: Condvar::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// Start a new session, or just wake the worker if already running
    ///
    /// Returns `false` once finished; a finished pipeline never runs again.
    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            LifecycleState::Finished => return false,
            LifecycleState::Paused => {
                inner.state = LifecycleState::Running;
                inner.epoch += 1;
                inner.last_error = None;
            }
            LifecycleState::Running => {}
        }
        self.wake.notify_all();
        true
    }

    /// Stop the current session and close its socket
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        Self::pause_locked(&mut inner);
    }

    /// Pause, then move to FINISHED for good
    pub fn finish(&self) {
        let mut inner = self.inner.lock();
        Self::pause_locked(&mut inner);
        inner.state = LifecycleState::Finished;
        self.wake.notify_all();
    }

    fn pause_locked(inner: &mut Inner) {
        if let Some(socket) = inner.socket.take() {
            socket.close();
        }
        if inner.state == LifecycleState::Running {
            inner.state = LifecycleState::Paused;
        }
    }

    /// Block while PAUSED; `None` once FINISHED
    pub fn wait_for_session(&self) -> Option<Session> {
        let mut inner = self.inner.lock();
        while inner.state == LifecycleState::Paused {
            self.wake.wait(&mut inner);
        }
        if inner.state == LifecycleState::Finished {
            None
        } else {
            Some(Session { epoch: inner.epoch })
        }
    }

    /// Whether `session` should keep processing frames
    pub fn is_current(&self, session: Session) -> bool {
        let inner = self.inner.lock();
        inner.state == LifecycleState::Running && inner.epoch == session.epoch
    }

    /// Register the session socket so `pause()` can close it
    ///
    /// If the session already ended the socket is closed right away.
    pub fn attach_socket(&self, session: Session, socket: Arc<TransportSocket>) {
        let mut inner = self.inner.lock();
        if inner.state == LifecycleState::Running && inner.epoch == session.epoch {
            if let Some(previous) = inner.socket.replace(socket) {
                previous.close();
            }
        } else {
            socket.close();
        }
    }

    /// Close and forget the socket of an ending session
    pub fn detach_socket(&self, session: Session) {
        let mut inner = self.inner.lock();
        if inner.epoch == session.epoch {
            if let Some(socket) = inner.socket.take() {
                socket.close();
            }
        }
    }

    /// Whether a session socket is currently registered
    pub fn has_socket(&self) -> bool {
        self.inner.lock().socket.is_some()
    }

    /// End `session` after it failed to start; a later `resume()` retries
    pub fn fail_session(&self, session: Session, error: String) {
        let mut inner = self.inner.lock();
        if inner.epoch == session.epoch {
            if inner.state == LifecycleState::Running {
                Self::pause_locked(&mut inner);
            }
            inner.last_error = Some(error);
        }
    }

    /// Why the most recent session failed to start, if it did
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }
}
