//! Shared configuration for the bus capture daemon.
//!
//! Values resolve from command-line flags first, `BUSCAP_*` environment
//! variables second and a TOML configuration file third, falling back to the
//! defaults in [`defaults`]. The file is the one named by `--config-path` or
//! `BUSCAP_CONFIG_PATH`, or [`DEFAULT_CONFIG_PATH`] when that exists. The
//! resulting [`Config`] is validated before it is handed to the daemon so
//! that nonsensical sizes or intervals fail at startup rather than deep in
//! the capture or relay paths.

mod bus;
pub mod defaults;
mod file;
mod logging;
mod socket;

use std::ffi::OsString;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{CommandFactory, FromArgMatches, Parser};
use serde::Serialize;
use thiserror::Error;

use file::FileLayer;

pub use bus::BusAddress;
pub use defaults::{
    DEFAULT_CAPTURE_PATH, DEFAULT_CHUNK_SIZE, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER, DEFAULT_MONITOR_POLL_MS,
    DEFAULT_RELAY_BACKOFF_MS, DEFAULT_TCP_PORT, default_capture_path, default_log_filter_string,
    default_log_format, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Parser, Serialize)]
#[command(name = "buscapd", version, about = "Capture bus traffic and stream it to clients")]
pub struct Config {
    /// TOML file supplying values not set by flags or the environment.
    #[arg(long, env = "BUSCAP_CONFIG_PATH")]
    pub config_path: Option<Utf8PathBuf>,

    /// Control socket, as `unix:///path` or `tcp://host:port`.
    #[arg(long, env = "BUSCAP_DAEMON_SOCKET", default_value_t = default_socket_endpoint())]
    pub daemon_socket: SocketEndpoint,

    /// Bus to monitor: `system`, `session`, or a D-Bus address.
    #[arg(long, env = "BUSCAP_BUS", default_value_t = BusAddress::System)]
    pub bus: BusAddress,

    /// Location of the capture log.
    #[arg(long, env = "BUSCAP_CAPTURE_PATH", default_value_t = default_capture_path())]
    pub capture_path: Utf8PathBuf,

    /// Maximum bytes delivered to a stream client per chunk.
    #[arg(long, env = "BUSCAP_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Longest wait, in milliseconds, for a bus message before the monitor
    /// re-checks whether it should stop.
    #[arg(long, env = "BUSCAP_MONITOR_POLL_MS", default_value_t = DEFAULT_MONITOR_POLL_MS)]
    pub monitor_poll_ms: u64,

    /// Pause, in milliseconds, when no stream had anything to do.
    #[arg(long, env = "BUSCAP_RELAY_BACKOFF_MS", default_value_t = DEFAULT_RELAY_BACKOFF_MS)]
    pub relay_backoff_ms: u64,

    /// Tracing filter expression.
    #[arg(long, env = "BUSCAP_LOG_FILTER", default_value_t = default_log_filter_string())]
    pub log_filter: String,

    /// Log output format.
    #[arg(long, env = "BUSCAP_LOG_FORMAT", default_value_t = default_log_format())]
    pub log_format: LogFormat,

    /// Begin capturing as soon as the daemon is ready.
    #[arg(long, env = "BUSCAP_CAPTURE_ON_START")]
    pub capture_on_start: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: None,
            daemon_socket: default_socket_endpoint(),
            bus: BusAddress::System,
            capture_path: default_capture_path(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            monitor_poll_ms: DEFAULT_MONITOR_POLL_MS,
            relay_backoff_ms: DEFAULT_RELAY_BACKOFF_MS,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            capture_on_start: false,
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments, environment and
    /// configuration file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// The first item is the program name, as with [`std::env::args_os`].
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command()
            .try_get_matches_from(args)
            .map_err(ConfigError::cli)?;
        let mut config = Self::from_arg_matches(&matches).map_err(ConfigError::cli)?;
        FileLayer::load(config.config_path.as_deref())?.apply(&mut config, &matches)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would stall the monitor or the relay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid("chunk_size", "must be at least one byte"));
        }
        if self.monitor_poll_ms == 0 {
            return Err(ConfigError::invalid(
                "monitor_poll_ms",
                "must be at least one millisecond",
            ));
        }
        if self.relay_backoff_ms == 0 {
            return Err(ConfigError::invalid(
                "relay_backoff_ms",
                "must be at least one millisecond",
            ));
        }
        if self.capture_path.file_name().is_none() {
            return Err(ConfigError::invalid("capture_path", "must name a file"));
        }
        Ok(())
    }

    /// Control socket endpoint.
    #[must_use]
    pub const fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Bus the monitor attaches to.
    #[must_use]
    pub const fn bus(&self) -> &BusAddress {
        &self.bus
    }

    /// Capture log location.
    #[must_use]
    pub fn capture_path(&self) -> &Utf8Path {
        &self.capture_path
    }

    /// Relay chunk size in bytes.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bound on a single monitor wait.
    #[must_use]
    pub const fn monitor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_poll_ms)
    }

    /// Idle pause of the relay pump.
    #[must_use]
    pub const fn relay_backoff(&self) -> Duration {
        Duration::from_millis(self.relay_backoff_ms)
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether capture begins at startup.
    #[must_use]
    pub const fn capture_on_start(&self) -> bool {
        self.capture_on_start
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Arguments or environment values could not be parsed.
    ///
    /// This also carries clap's `--help` and `--version` output, which
    /// callers should print via [`clap::Error::exit`].
    #[error("{source}")]
    Cli {
        /// Underlying clap error.
        #[source]
        source: Box<clap::Error>,
    },
    /// The configuration file could not be read or parsed.
    #[error("failed to load configuration file {path}: {source}")]
    File {
        /// File that was read.
        path: Utf8PathBuf,
        /// Underlying loader error.
        #[source]
        source: Box<config::ConfigError>,
    },
    /// A configuration file value does not parse.
    #[error("invalid {field} in configuration file: {reason}")]
    FileValue {
        /// Offending key.
        field: &'static str,
        /// Parser message.
        reason: String,
    },
    /// A value parsed but is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl ConfigError {
    const fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }

    fn cli(source: clap::Error) -> Self {
        Self::Cli {
            source: Box::new(source),
        }
    }
}
