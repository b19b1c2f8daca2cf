//! Default values used when no flag, environment variable or file sets a field.

use camino::Utf8PathBuf;
#[cfg(unix)]
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

use crate::socket::SocketEndpoint;

/// Default TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 9780;

/// Configuration file read when no other path is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/buscap/buscapd.toml";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Well-known location of the capture log.
pub const DEFAULT_CAPTURE_PATH: &str = "/var/lib/buscap/dbus_capture.jsonl";

/// Relay chunk size: one mebibyte per delivery.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Upper bound on how long the monitor waits for a message before it
/// re-checks the capture flag.
pub const DEFAULT_MONITOR_POLL_MS: u64 = 250;

/// Pause taken by the relay pump when no stream made progress.
pub const DEFAULT_RELAY_BACKOFF_MS: u64 = 25;

/// Owned log filter value used where allocation is required.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default capture log path.
#[must_use]
pub fn default_capture_path() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_CAPTURE_PATH)
}

/// Computes the default control socket for the daemon.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    default_socket_endpoint_inner()
}

#[cfg(unix)]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    let (mut base, apply_namespace) = runtime_base_directory()
        .map_or_else(|| (fallback_base_directory(), true), |dir| (dir, false));

    base.push("buscap");
    if apply_namespace {
        base.push(user_namespace());
    }

    SocketEndpoint::unix(base.join("buscapd.sock"))
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(unix)]
fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}
