//! Optional TOML configuration file sitting beneath environment and flags.

use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ArgMatches;
use clap::parser::ValueSource;
use serde::Deserialize;

use crate::defaults::DEFAULT_CONFIG_PATH;
use crate::{BusAddress, Config, ConfigError, LogFormat, SocketEndpoint};

/// Values read from the configuration file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileLayer {
    daemon_socket: Option<String>,
    bus: Option<String>,
    capture_path: Option<Utf8PathBuf>,
    chunk_size: Option<usize>,
    monitor_poll_ms: Option<u64>,
    relay_backoff_ms: Option<u64>,
    log_filter: Option<String>,
    log_format: Option<String>,
    capture_on_start: Option<bool>,
}

impl FileLayer {
    /// Reads `explicit`, or the well-known path when none was given.
    ///
    /// An explicitly named file must exist; the well-known one may not.
    pub(crate) fn load(explicit: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let (path, required) = explicit.map_or_else(
            || (Utf8Path::new(DEFAULT_CONFIG_PATH), false),
            |path| (path, true),
        );
        config::Config::builder()
            .add_source(config::File::from(path.as_std_path()).required(required))
            .build()
            .and_then(|layers| layers.try_deserialize::<Self>())
            .map_err(|source| ConfigError::File {
                path: path.to_owned(),
                source: Box::new(source),
            })
    }

    /// Fills every field that neither a flag nor the environment set.
    pub(crate) fn apply(self, config: &mut Config, matches: &ArgMatches) -> Result<(), ConfigError> {
        let unset = |id: &str| {
            !matches!(
                matches.value_source(id),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            )
        };

        if let Some(raw) = self.daemon_socket.filter(|_| unset("daemon_socket")) {
            config.daemon_socket = parse::<SocketEndpoint>("daemon_socket", &raw)?;
        }
        if let Some(raw) = self.bus.filter(|_| unset("bus")) {
            config.bus = parse::<BusAddress>("bus", &raw)?;
        }
        if let Some(path) = self.capture_path.filter(|_| unset("capture_path")) {
            config.capture_path = path;
        }
        if let Some(size) = self.chunk_size.filter(|_| unset("chunk_size")) {
            config.chunk_size = size;
        }
        if let Some(millis) = self.monitor_poll_ms.filter(|_| unset("monitor_poll_ms")) {
            config.monitor_poll_ms = millis;
        }
        if let Some(millis) = self.relay_backoff_ms.filter(|_| unset("relay_backoff_ms")) {
            config.relay_backoff_ms = millis;
        }
        if let Some(filter) = self.log_filter.filter(|_| unset("log_filter")) {
            config.log_filter = filter;
        }
        if let Some(raw) = self.log_format.filter(|_| unset("log_format")) {
            config.log_format = parse::<LogFormat>("log_format", &raw)?;
        }
        if let Some(enabled) = self.capture_on_start.filter(|_| unset("capture_on_start")) {
            config.capture_on_start = enabled;
        }
        Ok(())
    }
}

fn parse<T>(field: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    raw.parse().map_err(|error: T::Err| ConfigError::FileValue {
        field,
        reason: error.to_string(),
    })
}
