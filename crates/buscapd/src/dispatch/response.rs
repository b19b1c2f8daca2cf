//! Response lines written back to control clients.

use std::io::Write;

use serde::Serialize;

use crate::monitor::CaptureStatus;

use super::errors::DispatchError;

/// One response line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlResponse {
    /// Capture status after the command ran.
    Status {
        /// Whether capture is active.
        is_capturing: bool,
    },
    /// The command failed.
    Error {
        /// HTTP-style status code.
        status: u16,
        /// Description of the failure.
        message: String,
    },
}

impl ControlResponse {
    /// Builds an error response.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::Error {
            status,
            message: message.into(),
        }
    }
}

impl From<CaptureStatus> for ControlResponse {
    fn from(status: CaptureStatus) -> Self {
        Self::Status {
            is_capturing: status.is_capturing,
        }
    }
}

/// Writes JSONL responses to a client stream.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Wraps `writer`.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes `response` as one line and flushes.
    pub fn write_response(&mut self, response: &ControlResponse) -> Result<(), DispatchError> {
        let mut line = serde_json::to_vec(response)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes the status produced by a successful command.
    pub fn write_status(&mut self, status: CaptureStatus) -> Result<(), DispatchError> {
        self.write_response(&status.into())
    }

    /// Writes an error line carrying the error's status code.
    pub fn write_error(&mut self, error: &DispatchError) -> Result<(), DispatchError> {
        self.write_response(&ControlResponse::error(error.status(), error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn written(write: impl FnOnce(&mut ResponseWriter<&mut Vec<u8>>)) -> Value {
        let mut output = Vec::new();
        write(&mut ResponseWriter::new(&mut output));
        assert_eq!(output.last(), Some(&b'\n'));
        serde_json::from_slice(&output).expect("valid json line")
    }

    #[test]
    fn status_line_has_kind_and_flag() {
        let value = written(|writer| {
            writer
                .write_status(CaptureStatus { is_capturing: true })
                .expect("write status");
        });
        assert_eq!(value, json!({"kind": "status", "is_capturing": true}));
    }

    #[test]
    fn error_line_carries_status_code() {
        let value = written(|writer| {
            writer
                .write_error(&DispatchError::malformed("empty request line"))
                .expect("write error");
        });
        assert_eq!(value.get("kind"), Some(&json!("error")));
        assert_eq!(value.get("status"), Some(&json!(400)));
        assert!(
            value
                .get("message")
                .and_then(Value::as_str)
                .is_some_and(|message| message.contains("empty request line"))
        );
    }
}
