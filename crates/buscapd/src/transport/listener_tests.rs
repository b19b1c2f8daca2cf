//! Tests for the control socket listener.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use buscap_config::SocketEndpoint;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::listener::SocketListener;
use super::{ConnectionHandler, CountingHandler, EchoLineHandler, ListenerError};

#[fixture]
fn loopback() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", 0)
}

#[fixture]
fn socket_dir() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

fn unix_endpoint(dir: &TempDir) -> SocketEndpoint {
    let path = dir.path().join("buscapd.sock");
    SocketEndpoint::unix(path.to_str().expect("utf8 path"))
}

fn wait_for_count(count: &AtomicUsize, expected: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if count.load(Ordering::SeqCst) >= expected {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[rstest]
fn tcp_listener_serves_each_connection(loopback: SocketEndpoint) {
    let listener = SocketListener::bind(&loopback).expect("bind tcp listener");
    let addr = listener.local_addr().expect("tcp listener has an address");
    let (count, handler) = CountingHandler::new();
    let handle = listener.start(handler).expect("start listener");

    for _ in 0..3 {
        TcpStream::connect(addr).expect("connect client");
    }

    assert!(wait_for_count(&count, 3), "expected three connections");
    handle.shutdown();
    handle.join().expect("join listener");
}

#[rstest]
fn connections_are_handled_concurrently(loopback: SocketEndpoint) {
    let listener = SocketListener::bind(&loopback).expect("bind tcp listener");
    let addr = listener.local_addr().expect("tcp listener has an address");
    let handler: Arc<dyn ConnectionHandler> = Arc::new(EchoLineHandler);
    let handle = listener.start(handler).expect("start listener");

    let idle = TcpStream::connect(addr).expect("connect idle client");
    let mut active = TcpStream::connect(addr).expect("connect active client");
    active.write_all(b"ping\n").expect("write");

    let mut reply = String::new();
    BufReader::new(&mut active).read_line(&mut reply).expect("read reply");
    assert_eq!(reply, "ping\n");

    drop(idle);
    handle.shutdown();
    handle.join().expect("join listener");
}

#[cfg(unix)]
#[rstest]
fn stale_unix_socket_is_reclaimed_and_removed_on_shutdown(socket_dir: TempDir) {
    let endpoint = unix_endpoint(&socket_dir);
    let path = endpoint.unix_path().expect("unix path").as_std_path().to_path_buf();
    drop(std::os::unix::net::UnixListener::bind(&path).expect("bind stale listener"));
    assert!(path.exists(), "stale socket file should remain");

    let listener = SocketListener::bind(&endpoint).expect("bind over stale socket");
    let (count, handler) = CountingHandler::new();
    let handle = listener.start(handler).expect("start listener");
    std::os::unix::net::UnixStream::connect(&path).expect("connect unix client");
    assert!(wait_for_count(&count, 1));

    handle.shutdown();
    handle.join().expect("join listener");
    assert!(!path.exists(), "socket file should be removed on shutdown");
}

#[cfg(unix)]
#[rstest]
fn live_unix_socket_is_not_stolen(socket_dir: TempDir) {
    let endpoint = unix_endpoint(&socket_dir);
    let path = endpoint.unix_path().expect("unix path").as_std_path().to_path_buf();
    let _live = std::os::unix::net::UnixListener::bind(&path).expect("bind live listener");

    let error = SocketListener::bind(&endpoint).expect_err("bind should fail");
    assert!(matches!(error, ListenerError::UnixInUse { .. }));
}

#[cfg(unix)]
#[rstest]
fn regular_file_is_not_replaced(socket_dir: TempDir) {
    let endpoint = unix_endpoint(&socket_dir);
    let path = endpoint.unix_path().expect("unix path").as_std_path().to_path_buf();
    std::fs::write(&path, b"not a socket").expect("write file");

    let error = SocketListener::bind(&endpoint).expect_err("bind should fail");
    assert!(matches!(error, ListenerError::UnixNotSocket { .. }));
    assert!(path.exists());
}
