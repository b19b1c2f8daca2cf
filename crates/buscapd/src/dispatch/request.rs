//! Control request parsing.

use std::io::{self, Read};

use serde::Deserialize;

use super::errors::DispatchError;

/// Maximum size of a request line in bytes.
pub(crate) const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Operation requested by a control client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    /// Report whether capture is active.
    Status,
    /// Start capturing.
    Start,
    /// Stop capturing.
    Stop,
    /// Truncate the capture log.
    Clear,
    /// Follow the capture log on this connection.
    Stream,
}

/// One request line.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlRequest {
    /// Requested operation.
    pub command: ControlCommand,
}

impl ControlRequest {
    /// Parses a request line, ignoring surrounding whitespace.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }
        serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)
    }
}

/// Reads one newline-terminated request from `reader`.
///
/// `Ok(None)` means the client closed without sending anything. A final line
/// without a terminator is accepted at end of stream.
pub(crate) fn read_request_line<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, DispatchError> {
    let mut line = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error.into()),
        };
        let Some(received) = chunk.get(..read) else {
            return Err(DispatchError::malformed("read past buffer"));
        };
        if received.is_empty() {
            return Ok((!line.is_empty()).then_some(line));
        }
        match received.iter().position(|byte| *byte == b'\n') {
            Some(end) => {
                line.extend(received.iter().take(end + 1));
                check_size(line.len())?;
                return Ok(Some(line));
            }
            None => {
                line.extend_from_slice(received);
                check_size(line.len())?;
            }
        }
    }
}

const fn check_size(size: usize) -> Result<(), DispatchError> {
    if size > MAX_REQUEST_BYTES {
        return Err(DispatchError::RequestTooLarge {
            size,
            max_size: MAX_REQUEST_BYTES,
        });
    }
    Ok(())
}
