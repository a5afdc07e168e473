//! Capture and playback pipelines
//!
//! Both pipelines run the same outer loop on a dedicated thread:
//!
//! ```text
//! while let Some(session) = lifecycle.wait_for_session() {
//!     open session resources          (devices, socket, buffers)
//!     while lifecycle.is_current(session) { process one frame }
//!     close session resources         (exactly once)
//! }
//! ```
//!
//! What differs is captured by the [`Worker`] trait.

pub mod lifecycle;
pub mod player;
pub mod recorder;

pub use lifecycle::{Lifecycle, LifecycleState, Session};
pub use player::{Player, PlaybackStats};
pub use recorder::{CaptureStats, Recorder};

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thread_priority::ThreadPriority;

use crate::config::SessionConfig;
use crate::error::Result;

/// Per-pipeline session logic driven by [`run_sessions`]
pub(crate) trait Worker {
    /// Resources held for the duration of one session
    type Active;

    /// Name used in logs
    const NAME: &'static str;

    /// Acquire everything a session needs
    ///
    /// On error, anything already acquired must have been released.
    fn open(&mut self, session: Session, config: &SessionConfig) -> Result<Self::Active>;

    /// Process one frame
    fn step(&mut self, active: &mut Self::Active);

    /// Release the session's resources
    fn close(&mut self, active: Self::Active);
}

/// State shared between a pipeline handle and its worker thread
pub(crate) struct Control {
    pub lifecycle: Lifecycle,
    /// Configuration for the next session
    pub config: Mutex<SessionConfig>,
}

impl Control {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            config: Mutex::new(config),
        }
    }
}

/// Outer loop of a pipeline thread; returns once finished
pub(crate) fn run_sessions<W: Worker>(mut worker: W, control: &Control) {
    raise_priority(W::NAME);

    while let Some(session) = control.lifecycle.wait_for_session() {
        let config = control.config.lock().clone();
        tracing::info!(
            "{} session {} starting ({}, compression {})",
            W::NAME,
            session.epoch(),
            config.cast.mode,
            if config.audio.compression { "on" } else { "off" }
        );

        match worker.open(session, &config) {
            Ok(mut active) => {
                while control.lifecycle.is_current(session) {
                    worker.step(&mut active);
                }
                worker.close(active);
                tracing::info!("{} session {} stopped", W::NAME, session.epoch());
            }
            Err(e) => {
                tracing::error!("{} failed to start: {}", W::NAME, e);
                control.lifecycle.fail_session(session, e.to_string());
            }
        }

        control.lifecycle.detach_socket(session);
    }

    tracing::info!("{} finished", W::NAME);
}

/// Start the named worker thread
pub(crate) fn spawn_worker<W>(name: &str, worker: W, control: Arc<Control>) -> Result<JoinHandle<()>>
where
    W: Worker + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || run_sessions(worker, &control))?;
    Ok(handle)
}

/// Wait for a worker thread, logging a panic instead of propagating it
pub(crate) fn join_worker(name: &str, handle: &Mutex<Option<JoinHandle<()>>>) {
    let handle = handle.lock().take();
    if let Some(handle) = handle {
        if handle.join().is_err() {
            tracing::error!("{} thread panicked", name);
        }
    }
}

/// Request the highest scheduling priority for audio work
fn raise_priority(name: &str) {
    match thread_priority::set_current_thread_priority(ThreadPriority::Max) {
        Ok(()) => tracing::debug!("{} thread priority raised", name),
        Err(e) => tracing::warn!("{} could not raise thread priority: {:?}", name, e),
    }
}
