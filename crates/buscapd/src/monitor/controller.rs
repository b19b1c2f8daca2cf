//! Administrative surface over the monitor session.
//!
//! The controller owns at most one session at a time and runs its drain
//! loop on a dedicated thread. Every operation reports the resulting
//! capture status so callers never need a second round trip.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capture::CaptureLog;

use super::MONITOR_TARGET;
use super::bus::BusConnector;
use super::errors::{ControlError, MonitorError};
use super::flag::CaptureFlag;
use super::session::{BusMonitorSession, SessionSummary};

type SessionHandle = JoinHandle<Result<SessionSummary, MonitorError>>;

/// Capture status reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureStatus {
    /// Whether a monitor session is currently appending to the log.
    pub is_capturing: bool,
}

/// Starts, stops and clears capture on behalf of control clients.
#[derive(Debug)]
pub struct CaptureController<C> {
    connector: Arc<C>,
    capture_path: PathBuf,
    poll_interval: Duration,
    flag: CaptureFlag,
    session: Mutex<Option<SessionHandle>>,
}

impl<C: BusConnector> CaptureController<C> {
    /// Builds an idle controller.
    pub fn new(connector: C, capture_path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            connector: Arc::new(connector),
            capture_path: capture_path.into(),
            poll_interval,
            flag: CaptureFlag::new(),
            session: Mutex::new(None),
        }
    }

    /// Path of the capture log.
    #[must_use]
    pub fn capture_path(&self) -> &Path {
        &self.capture_path
    }

    /// Reports whether capture is active.
    #[must_use]
    pub fn is_capturing(&self) -> CaptureStatus {
        self.status()
    }

    /// Starts a new monitor session unless one is already running.
    ///
    /// Connection and registration happen on the caller's thread so their
    /// failures reach the caller. The drain loop then runs on its own thread.
    pub fn start_capture(&self) -> Result<CaptureStatus, ControlError> {
        let mut slot = self.lock()?;
        if self.flag.is_raised() {
            debug!(target: MONITOR_TARGET, "capture already active");
            return Ok(self.status());
        }
        reap(&mut slot);

        let mut session: BusMonitorSession<C::Bus> = BusMonitorSession::new(
            CaptureLog::new(&self.capture_path),
            self.flag.clone(),
            self.poll_interval,
        );
        session.start(self.connector.as_ref())?;

        let handle = thread::Builder::new()
            .name("buscap-monitor".to_owned())
            .spawn(move || session.run_loop())
            .map_err(|source| {
                self.flag.lower();
                ControlError::Spawn { source }
            })?;
        *slot = Some(handle);
        info!(target: MONITOR_TARGET, "capture started");
        Ok(self.status())
    }

    /// Stops the running session and waits for its thread to finish.
    ///
    /// The wait is bounded by the session's poll interval plus the time
    /// needed to persist a message already in hand.
    pub fn stop_capture(&self) -> Result<CaptureStatus, ControlError> {
        let mut slot = self.lock()?;
        self.flag.lower();
        if let Some(handle) = slot.take() {
            match handle.join() {
                Ok(Ok(_)) => info!(target: MONITOR_TARGET, "capture stopped"),
                Ok(Err(error)) => warn!(
                    target: MONITOR_TARGET,
                    %error,
                    "capture had already ended with an error"
                ),
                Err(_) => return Err(ControlError::ThreadPanic),
            }
        }
        Ok(self.status())
    }

    /// Truncates the capture log.
    ///
    /// Rejected while a session is appending; stop capture first.
    pub fn clear_capture(&self) -> Result<CaptureStatus, ControlError> {
        let _slot = self.lock()?;
        if self.flag.is_raised() {
            return Err(ControlError::ClearWhileCapturing);
        }
        CaptureLog::new(&self.capture_path).clear()?;
        info!(
            target: MONITOR_TARGET,
            log = %self.capture_path.display(),
            "capture log cleared"
        );
        Ok(self.status())
    }

    fn status(&self) -> CaptureStatus {
        CaptureStatus {
            is_capturing: self.flag.is_raised(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<SessionHandle>>, ControlError> {
        self.session.lock().map_err(|_| ControlError::LockPoisoned)
    }
}

impl<C> Drop for CaptureController<C> {
    fn drop(&mut self) {
        self.flag.lower();
    }
}

/// Joins a session thread that already ended on its own.
fn reap(slot: &mut Option<SessionHandle>) {
    let Some(handle) = slot.take() else {
        return;
    };
    match handle.join() {
        Ok(Ok(summary)) => debug!(
            target: MONITOR_TARGET,
            appended = summary.appended,
            "reaped finished session"
        ),
        Ok(Err(error)) => debug!(target: MONITOR_TARGET, %error, "reaped failed session"),
        Err(_) => warn!(target: MONITOR_TARGET, "previous monitor thread panicked"),
    }
}
