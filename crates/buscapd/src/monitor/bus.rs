//! Seams between the capture session and a concrete bus client.

use std::time::Duration;

use thiserror::Error;

use crate::capture::MessageKind;

use super::errors::MonitorError;

/// Per-message header accessors.
///
/// `Ok(None)` means the message does not carry the field. `Err` means the
/// field is present but unreadable, which makes the message unconvertible.
pub trait BusMessage {
    /// Message class.
    fn kind(&self) -> Result<MessageKind, FieldError>;
    /// Serial number.
    fn cookie(&self) -> Result<Option<u64>, FieldError>;
    /// Serial this message replies to.
    fn reply_cookie(&self) -> Result<Option<u64>, FieldError>;
    /// Object path.
    fn path(&self) -> Result<Option<String>, FieldError>;
    /// Interface name.
    fn interface(&self) -> Result<Option<String>, FieldError>;
    /// Sender unique name.
    fn sender(&self) -> Result<Option<String>, FieldError>;
    /// Destination name.
    fn destination(&self) -> Result<Option<String>, FieldError>;
    /// Method or signal name.
    fn member(&self) -> Result<Option<String>, FieldError>;
    /// Body signature.
    fn signature(&self) -> Result<Option<String>, FieldError>;
}

/// A bus connection that can be switched into monitor mode and drained.
pub trait MonitorBus: Send + 'static {
    /// Message type yielded by [`next_message`](Self::next_message).
    type Message: BusMessage;

    /// Asks the bus daemon to turn this connection into a monitor.
    ///
    /// An empty `match_rules` slice matches every message.
    fn become_monitor(&mut self, match_rules: &[&str]) -> Result<(), MonitorError>;

    /// Waits at most `timeout` for the next message.
    ///
    /// `Ok(None)` means the wait elapsed without traffic.
    fn next_message(&mut self, timeout: Duration) -> Result<Option<Self::Message>, TransportError>;
}

/// Factory for monitor connections.
pub trait BusConnector: Send + Sync + 'static {
    /// Connection type produced by [`connect`](Self::connect).
    type Bus: MonitorBus;

    /// Establishes a new bus connection.
    fn connect(&self) -> Result<Self::Bus, MonitorError>;
}

/// A header field could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unreadable message field '{field}': {reason}")]
pub struct FieldError {
    field: &'static str,
    reason: String,
}

impl FieldError {
    /// Builds an error for `field`.
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the failing field.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        self.field
    }
}

/// The bus connection can no longer deliver messages.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection was closed by the peer or the reader stopped.
    #[error("bus connection closed")]
    Closed,
    /// Reading from the connection failed.
    #[error("bus read failed: {reason}")]
    Read {
        /// Description of the failure.
        reason: String,
    },
}
