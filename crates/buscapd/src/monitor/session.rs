//! Bus monitor session: negotiation and the drain loop.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::capture::{CaptureLog, CaptureRecord, unix_timestamp};

use super::MONITOR_TARGET;
use super::bus::{BusConnector, MonitorBus};
use super::errors::MonitorError;
use super::flag::CaptureFlag;

/// Empty rule set: the daemon forwards every message.
const MATCH_EVERYTHING: &[&str] = &[];

/// Lifecycle of a session. There is no way back from `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no connection yet.
    Init,
    /// Registered as a monitor and ready to drain.
    Running,
    /// Terminated, either cooperatively or by a transport failure.
    Stopped,
}

/// Counters reported when a session ends cooperatively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Records written to the log.
    pub appended: u64,
    /// Messages skipped because a field was unreadable.
    pub skipped: u64,
}

/// Owns one monitor connection and persists everything it observes.
#[derive(Debug)]
pub struct BusMonitorSession<B> {
    bus: Option<B>,
    log: CaptureLog,
    flag: CaptureFlag,
    poll_interval: Duration,
    state: SessionState,
    summary: SessionSummary,
}

impl<B: MonitorBus> BusMonitorSession<B> {
    /// Creates a session that will append to `log`.
    ///
    /// `poll_interval` bounds each wait for traffic, and therefore how long
    /// [`stop`](Self::stop) can take to be observed.
    pub fn new(log: CaptureLog, flag: CaptureFlag, poll_interval: Duration) -> Self {
        Self {
            bus: None,
            log,
            flag,
            poll_interval,
            state: SessionState::Init,
            summary: SessionSummary::default(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Shared activity flag.
    #[must_use]
    pub const fn flag(&self) -> &CaptureFlag {
        &self.flag
    }

    /// Connects, registers as a monitor, creates the log and raises the flag.
    ///
    /// Connection and registration failures leave the session in `Init` so
    /// the caller sees the error; nothing is retried.
    pub fn start<C>(&mut self, connector: &C) -> Result<(), MonitorError>
    where
        C: BusConnector<Bus = B>,
    {
        match self.state {
            SessionState::Init => {}
            SessionState::Running => return Ok(()),
            SessionState::Stopped => return Err(MonitorError::SessionStopped),
        }

        let mut bus = connector.connect()?;
        bus.become_monitor(MATCH_EVERYTHING)?;
        self.log.ensure_created()?;

        self.bus = Some(bus);
        self.state = SessionState::Running;
        self.flag.raise();
        info!(
            target: MONITOR_TARGET,
            log = %self.log.path().display(),
            "registered as bus monitor"
        );
        Ok(())
    }

    /// Drains messages into the log until the flag is lowered.
    ///
    /// Each wait is bounded by the poll interval. A message with an
    /// unreadable field is skipped. A transport or log failure ends the
    /// session and is returned. Either way the session finishes `Stopped`
    /// with the flag lowered.
    pub fn run_loop(&mut self) -> Result<SessionSummary, MonitorError> {
        if self.state != SessionState::Running {
            return Err(match self.state {
                SessionState::Stopped => MonitorError::SessionStopped,
                SessionState::Init | SessionState::Running => MonitorError::NotRunning,
            });
        }
        let outcome = self.drain();
        self.finish();

        match &outcome {
            Ok(summary) => info!(
                target: MONITOR_TARGET,
                appended = summary.appended,
                skipped = summary.skipped,
                "monitor session stopped"
            ),
            Err(error) => warn!(
                target: MONITOR_TARGET,
                %error,
                appended = self.summary.appended,
                skipped = self.summary.skipped,
                "monitor session failed"
            ),
        }
        outcome
    }

    /// Requests a cooperative stop.
    pub fn stop(&self) {
        self.flag.lower();
    }

    fn drain(&mut self) -> Result<SessionSummary, MonitorError> {
        let Some(bus) = self.bus.as_mut() else {
            return Err(MonitorError::NotRunning);
        };

        while self.flag.is_raised() {
            let Some(message) = bus.next_message(self.poll_interval)? else {
                continue;
            };
            match CaptureRecord::observe(&message, unix_timestamp()) {
                Ok(record) => {
                    self.log.append(&record)?;
                    self.summary.appended += 1;
                }
                Err(error) => {
                    self.summary.skipped += 1;
                    debug!(
                        target: MONITOR_TARGET,
                        %error,
                        "skipping unconvertible message"
                    );
                }
            }
        }
        Ok(self.summary)
    }

    fn finish(&mut self) {
        self.bus = None;
        self.state = SessionState::Stopped;
        self.flag.lower();
    }
}
