//! Wires configuration, capture, relays and the control socket together.

use std::sync::{Arc, Mutex};

use buscap_config::Config;
use tracing::{info, warn};

use crate::dispatch::{CaptureConnectionHandler, SocketPeer};
use crate::monitor::{BusConnector, CaptureController, ZbusConnector};
use crate::relay::{PumpHandle, RelayPump, RelayRegistry, SharedRegistry};
use crate::telemetry;
use crate::transport::{ListenerHandle, SocketListener};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Runs the daemon with the process arguments, environment and real bus.
///
/// Returns after a termination signal once capture, relays and the listener
/// have been stopped.
pub fn run_daemon() -> Result<(), LaunchError> {
    let config = Config::load()?;
    telemetry::initialise(&config)?;
    let connector = ZbusConnector::new(config.bus().clone());
    run_daemon_with(&config, connector, &SystemShutdownSignal, |_| {})
}

/// Runs the daemon with injected collaborators.
///
/// `on_ready` receives the bound listener address once the control socket is
/// accepting connections; TCP endpoints configured with port zero use it to
/// learn the chosen port.
pub(crate) fn run_daemon_with<C, S, R>(
    config: &Config,
    connector: C,
    shutdown: &S,
    on_ready: R,
) -> Result<(), LaunchError>
where
    C: BusConnector,
    S: ShutdownSignal,
    R: FnOnce(Option<std::net::SocketAddr>),
{
    info!(
        target: PROCESS_TARGET,
        socket = %config.daemon_socket(),
        bus = %config.bus(),
        capture_path = %config.capture_path(),
        "starting daemon"
    );
    config.daemon_socket().prepare_filesystem()?;
    let listener = SocketListener::bind(config.daemon_socket())?;
    let local_addr = listener.local_addr();

    let capture_path = config.capture_path().as_std_path();
    let controller = Arc::new(CaptureController::new(
        connector,
        capture_path,
        config.monitor_poll_interval(),
    ));
    let relays: SharedRegistry<SocketPeer> = Arc::new(Mutex::new(RelayRegistry::new(
        capture_path,
        config.chunk_size(),
    )));
    let pump = RelayPump::new(Arc::clone(&relays), config.relay_backoff()).start()?;

    if config.capture_on_start()
        && let Err(error) = controller.start_capture()
    {
        warn!(target: PROCESS_TARGET, %error, "capture did not start at launch");
    }

    let handler = Arc::new(CaptureConnectionHandler::new(Arc::clone(&controller), relays));
    let listener_handle = match listener.start(handler) {
        Ok(handle) => handle,
        Err(error) => {
            pump.shutdown();
            return Err(error.into());
        }
    };
    info!(target: PROCESS_TARGET, "daemon ready");
    on_ready(local_addr);

    let waited = shutdown.wait();
    let stopped = teardown(&controller, pump, listener_handle);
    waited?;
    stopped?;
    info!(target: PROCESS_TARGET, "shutdown complete");
    Ok(())
}

/// Stops capture, then the relays, then the listener.
///
/// Every stage runs even if an earlier one fails; the first error wins.
fn teardown<C: BusConnector>(
    controller: &CaptureController<C>,
    pump: PumpHandle,
    listener: ListenerHandle,
) -> Result<(), LaunchError> {
    let capture = controller.stop_capture().map(drop).map_err(LaunchError::from);
    pump.shutdown();
    let relays = pump.join().map_err(LaunchError::from);
    listener.shutdown();
    let socket = listener.join().map_err(LaunchError::from);
    capture.and(relays).and(socket)
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use buscap_config::SocketEndpoint;
    use camino::Utf8PathBuf;
    use serde_json::Value;

    use super::*;
    use crate::process::ShutdownError;
    use crate::tests::support::{FakeMessage, ScriptedConnector};

    /// Shutdown signal released by the test through a channel.
    struct ChannelShutdown(Mutex<mpsc::Receiver<()>>);

    impl ShutdownSignal for ChannelShutdown {
        fn wait(&self) -> Result<(), ShutdownError> {
            if let Ok(receiver) = self.0.lock() {
                let _released = receiver.recv();
            }
            Ok(())
        }
    }

    fn send(addr: SocketAddr, line: &str) -> Value {
        let mut client = TcpStream::connect(addr).expect("connect");
        client.write_all(line.as_bytes()).expect("write");
        let mut response = String::new();
        BufReader::new(client).read_line(&mut response).expect("read");
        serde_json::from_str(&response).expect("json response")
    }

    #[test]
    fn daemon_serves_control_requests_until_shutdown() {
        let dir = tempfile::tempdir().expect("temp dir");
        let capture_path =
            Utf8PathBuf::from_path_buf(dir.path().join("capture.jsonl")).expect("utf8 path");
        let config = Config {
            daemon_socket: SocketEndpoint::tcp("127.0.0.1", 0),
            capture_path: capture_path.clone(),
            monitor_poll_ms: 10,
            relay_backoff_ms: 5,
            capture_on_start: true,
            ..Config::default()
        };
        let connector = ScriptedConnector::with_messages(vec![
            FakeMessage::signal().with_member("NameOwnerChanged"),
        ]);
        let (release, released) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let daemon = thread::spawn(move || {
            let shutdown = ChannelShutdown(Mutex::new(released));
            run_daemon_with(&config, connector, &shutdown, move |addr| {
                let _sent = ready_tx.send(addr);
            })
        });
        let addr = ready_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("daemon ready")
            .expect("tcp address");

        let status = send(addr, "{\"command\":\"status\"}\n");
        assert_eq!(status.get("is_capturing").and_then(Value::as_bool), Some(true));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::fs::read_to_string(&capture_path).map_or(true, |log| log.is_empty()) {
            assert!(std::time::Instant::now() < deadline, "message never captured");
            thread::sleep(Duration::from_millis(10));
        }
        let stopped = send(addr, "{\"command\":\"stop\"}\n");
        assert_eq!(stopped.get("is_capturing").and_then(Value::as_bool), Some(false));

        release.send(()).expect("release shutdown");
        daemon.join().expect("join daemon").expect("daemon result");

        let log = std::fs::read_to_string(capture_path).expect("read capture log");
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains("\"member\":\"NameOwnerChanged\""));
    }
}
