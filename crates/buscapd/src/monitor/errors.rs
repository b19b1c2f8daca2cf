//! Error surface of the monitor session and capture controller.

use std::io;

use thiserror::Error;

use crate::capture::LogError;

use super::bus::TransportError;

/// Errors raised by a [`BusMonitorSession`](super::BusMonitorSession).
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The bus connection could not be established.
    #[error("failed to connect to bus '{bus}': {reason}")]
    BusConnect {
        /// Bus that was targeted.
        bus: String,
        /// Description of the failure.
        reason: String,
    },
    /// The bus daemon refused the monitor registration.
    #[error("bus daemon rejected monitor registration: {reason}")]
    MonitorRegistration {
        /// Description of the failure.
        reason: String,
    },
    /// The connection dropped while capturing.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Persisting a record failed.
    #[error(transparent)]
    Log(#[from] LogError),
    /// The session already ran to completion.
    #[error("monitor session has stopped and cannot be restarted")]
    SessionStopped,
    /// `run_loop` was called before a successful `start`.
    #[error("monitor session is not running")]
    NotRunning,
}

/// Errors surfaced by the [`CaptureController`](super::CaptureController).
#[derive(Debug, Error)]
pub enum ControlError {
    /// Starting the monitor session failed.
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    /// Clearing the log failed.
    #[error(transparent)]
    Log(#[from] LogError),
    /// The log cannot be cleared while a session appends to it.
    #[error("cannot clear the capture log while capture is active")]
    ClearWhileCapturing,
    /// The monitor thread could not be spawned.
    #[error("failed to spawn monitor thread: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The monitor thread panicked.
    #[error("monitor thread panicked")]
    ThreadPanic,
    /// The controller lock was poisoned by a panicking thread.
    #[error("capture controller lock poisoned")]
    LockPoisoned,
}
