//! Table of live stream relays keyed by connection.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::capture::CaptureLog;

use super::RELAY_TARGET;
use super::errors::RelayError;
use super::peer::Peer;
use super::stream::{StepOutcome, StreamRelay};

/// Status reported to a peer when the capture log cannot be streamed.
pub const UPSTREAM_ERROR_STATUS: u16 = 502;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of a streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates a process-unique identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters from one [`RelayRegistry::pump`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Relays that read or delivered bytes.
    pub progressed: usize,
    /// Relays that closed and were removed.
    pub closed: usize,
}

#[derive(Debug)]
struct RelayEntry<P> {
    relay: StreamRelay,
    peer: P,
}

/// Owns every active relay and the peer it feeds.
#[derive(Debug)]
pub struct RelayRegistry<P> {
    log_path: PathBuf,
    chunk_size: usize,
    relays: HashMap<ConnectionId, RelayEntry<P>>,
}

impl<P: Peer> RelayRegistry<P> {
    /// Creates an empty registry streaming the log at `log_path`.
    #[must_use]
    pub fn new(log_path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            log_path: log_path.into(),
            chunk_size,
            relays: HashMap::new(),
        }
    }

    /// Number of live relays.
    #[must_use]
    pub fn len(&self) -> usize {
        self.relays.len()
    }

    /// Whether no relay is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// Whether `id` has a live relay.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.relays.contains_key(&id)
    }

    /// Opens a relay for a new connection and takes its first step.
    ///
    /// When the log does not exist the peer receives an upstream error and
    /// is closed, and nothing is registered. A relay that closes on its first
    /// step is not registered either.
    pub fn on_open(&mut self, id: ConnectionId, mut peer: P) -> Result<StepOutcome, RelayError> {
        if self.relays.contains_key(&id) {
            peer.close_connection();
            return Err(RelayError::DuplicateConnection { id });
        }

        let log = CaptureLog::new(&self.log_path);
        let mut relay = match StreamRelay::open(&log, self.chunk_size) {
            Ok(relay) => relay,
            Err(error) => {
                warn!(
                    target: RELAY_TARGET,
                    connection_id = %id,
                    %error,
                    "cannot stream capture log"
                );
                peer.report_unavailable(UPSTREAM_ERROR_STATUS, &error.to_string());
                peer.close_connection();
                return Err(error);
            }
        };

        let outcome = relay.step(&mut peer);
        if outcome == StepOutcome::Closed {
            debug!(target: RELAY_TARGET, connection_id = %id, "relay closed on first step");
        } else {
            info!(target: RELAY_TARGET, connection_id = %id, "stream relay opened");
            self.relays.insert(id, RelayEntry { relay, peer });
        }
        Ok(outcome)
    }

    /// Drops the relay for `id`. Unknown identifiers are ignored.
    ///
    /// Returns whether a relay was removed.
    pub fn on_close(&mut self, id: ConnectionId) -> bool {
        let Some(mut entry) = self.relays.remove(&id) else {
            return false;
        };
        entry.relay.reset_buffers();
        debug!(target: RELAY_TARGET, connection_id = %id, "stream relay discarded");
        true
    }

    /// Steps every relay once and removes the ones that closed.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        let mut closed = Vec::new();
        for (id, entry) in &mut self.relays {
            match entry.relay.step(&mut entry.peer) {
                StepOutcome::Progressed => report.progressed += 1,
                StepOutcome::Waiting => {}
                StepOutcome::Closed => closed.push(*id),
            }
        }
        for id in closed {
            if self.on_close(id) {
                report.closed += 1;
            }
        }
        report
    }

    /// Closes every relay and its peer, then discards it.
    pub fn close_all(&mut self) {
        let ids: Vec<_> = self.relays.keys().copied().collect();
        for id in ids {
            if let Some(entry) = self.relays.get_mut(&id) {
                entry.relay.close(&mut entry.peer);
            }
            self.on_close(id);
        }
    }
}
