use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::capture::LogError;

use super::ConnectionId;

/// Errors raised while opening or driving stream relays.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The capture log does not exist yet.
    #[error("capture log '{path}' does not exist")]
    SourceNotFound {
        /// Expected log location.
        path: PathBuf,
    },
    /// The capture log exists but could not be opened.
    #[error(transparent)]
    Log(#[from] LogError),
    /// A relay is already registered for this connection.
    #[error("connection {id} already has an active relay")]
    DuplicateConnection {
        /// Offending identifier.
        id: ConnectionId,
    },
    /// The relay pump thread could not be spawned.
    #[error("failed to spawn relay pump: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The relay pump thread panicked.
    #[error("relay pump thread panicked")]
    PumpPanic,
}
