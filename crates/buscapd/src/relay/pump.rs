//! Background thread that drives every registered relay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use super::RELAY_TARGET;
use super::errors::RelayError;
use super::peer::Peer;
use super::registry::RelayRegistry;

/// Registry shared between connection threads and the pump.
pub type SharedRegistry<P> = Arc<Mutex<RelayRegistry<P>>>;

/// Steps relays cooperatively on a single thread.
///
/// When a pass makes no progress the pump sleeps for `backoff` before trying
/// again, mirroring the accept loop of the socket listener.
#[derive(Debug)]
pub struct RelayPump<P> {
    registry: SharedRegistry<P>,
    backoff: Duration,
}

impl<P: Peer> RelayPump<P> {
    /// Creates a pump over `registry`.
    #[must_use]
    pub const fn new(registry: SharedRegistry<P>, backoff: Duration) -> Self {
        Self { registry, backoff }
    }

    /// Spawns the pump thread.
    pub fn start(self) -> Result<PumpHandle, RelayError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("buscap-relay".to_owned())
            .spawn(move || self.run(&shutdown_flag))
            .map_err(|source| RelayError::Spawn { source })?;
        Ok(PumpHandle {
            shutdown,
            handle: Some(handle),
        })
    }

    fn run(&self, shutdown: &AtomicBool) {
        info!(target: RELAY_TARGET, "relay pump active");
        while !shutdown.load(Ordering::SeqCst) {
            let Ok(mut registry) = self.registry.lock() else {
                error!(target: RELAY_TARGET, "relay registry lock poisoned");
                return;
            };
            let report = registry.pump();
            drop(registry);

            if report.closed > 0 {
                debug!(target: RELAY_TARGET, closed = report.closed, "reaped stream relays");
            }
            if report.progressed == 0 {
                thread::sleep(self.backoff);
            }
        }

        if let Ok(mut registry) = self.registry.lock() {
            registry.close_all();
        }
        info!(target: RELAY_TARGET, "relay pump stopped");
    }
}

/// Handle to the relay pump thread.
#[derive(Debug)]
pub struct PumpHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PumpHandle {
    /// Asks the pump to stop after its current pass.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the pump thread to exit.
    pub fn join(mut self) -> Result<(), RelayError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| RelayError::PumpPanic),
            None => Ok(()),
        }
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::time::Instant;

    use super::*;
    use crate::relay::ConnectionId;
    use crate::tests::support::RecordingPeer;

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn pump_relays_appended_bytes_and_closes_on_shutdown() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("capture.jsonl");
        fs::write(&path, b"first\n").expect("seed log");
        let registry: SharedRegistry<RecordingPeer> =
            Arc::new(Mutex::new(RelayRegistry::new(&path, 32)));
        let peer = RecordingPeer::new();
        registry
            .lock()
            .expect("lock registry")
            .on_open(ConnectionId::next(), peer.clone())
            .expect("open relay");

        let handle = RelayPump::new(Arc::clone(&registry), Duration::from_millis(5))
            .start()
            .expect("start pump");
        let mut appender = OpenOptions::new().append(true).open(&path).expect("open log");
        appender.write_all(b"second\n").expect("append");

        assert!(wait_until(|| peer.chunks().concat() == b"first\nsecond\n".to_vec()));

        handle.shutdown();
        handle.join().expect("join pump");
        assert!(peer.is_closed());
        assert!(registry.lock().expect("lock registry").is_empty());
    }
}
