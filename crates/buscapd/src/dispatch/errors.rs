//! Errors surfaced while serving a control request.

use std::io;

use thiserror::Error;

use crate::monitor::{ControlError, MonitorError};
use crate::relay::{RelayError, UPSTREAM_ERROR_STATUS};

const BAD_REQUEST: u16 = 400;
const CONFLICT: u16 = 409;
const INTERNAL_ERROR: u16 = 500;

/// Errors raised while reading, executing or answering a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request line is not a valid control request.
    #[error("malformed request: {message}")]
    MalformedJsonl {
        /// Human-readable description.
        message: String,
        /// Parser error, when there is one.
        #[source]
        source: Option<serde_json::Error>,
    },
    /// The request line exceeds the size limit.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },
    /// The capture controller rejected the command.
    #[error(transparent)]
    Control(#[from] ControlError),
    /// The stream could not be set up.
    #[error(transparent)]
    Relay(#[from] RelayError),
    /// The relay registry lock was poisoned.
    #[error("relay registry lock poisoned")]
    RegistryPoisoned,
    /// Socket IO failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// A response could not be encoded.
    #[error("failed to serialise response: {0}")]
    SerializeResponse(#[from] serde_json::Error),
}

impl DispatchError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJsonl {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn from_json_error(error: serde_json::Error) -> Self {
        Self::MalformedJsonl {
            message: error.to_string(),
            source: Some(error),
        }
    }

    /// HTTP-style status code reported to the client.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::MalformedJsonl { .. } | Self::RequestTooLarge { .. } => BAD_REQUEST,
            Self::Control(ControlError::ClearWhileCapturing) => CONFLICT,
            Self::Control(ControlError::Monitor(
                MonitorError::BusConnect { .. } | MonitorError::MonitorRegistration { .. },
            ))
            | Self::Relay(RelayError::SourceNotFound { .. }) => UPSTREAM_ERROR_STATUS,
            Self::Control(_)
            | Self::Relay(_)
            | Self::RegistryPoisoned
            | Self::Io(_)
            | Self::SerializeResponse(_) => INTERNAL_ERROR,
        }
    }
}
