//! Relay peer backed by a client socket.

use std::io::{self, Read, Write};

use tracing::debug;

use crate::relay::Peer;
use crate::transport::ConnectionStream;

use super::DISPATCH_TARGET;
use super::response::{ControlResponse, ResponseWriter};

/// A streaming client connection in non-blocking mode.
#[derive(Debug)]
pub(crate) struct SocketPeer {
    stream: ConnectionStream,
    closed: bool,
}

impl SocketPeer {
    /// Wraps `stream`, switching it to non-blocking IO.
    pub(crate) fn new(stream: ConnectionStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream,
            closed: false,
        })
    }
}

impl Peer for SocketPeer {
    fn send_chunk(&mut self, chunk: &[u8]) -> io::Result<usize> {
        self.stream.write(chunk)
    }

    fn close_connection(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(error) = self.stream.shutdown() {
            debug!(target: DISPATCH_TARGET, %error, "stream shutdown failed");
        }
    }

    fn report_unavailable(&mut self, status: u16, message: &str) {
        let response = ControlResponse::error(status, message);
        if let Err(error) = ResponseWriter::new(&mut self.stream).write_response(&response) {
            debug!(target: DISPATCH_TARGET, %error, "failed to report stream error");
        }
    }

    fn is_disconnected(&mut self) -> bool {
        let mut discard = [0_u8; 256];
        match self.stream.read(&mut discard) {
            Ok(0) => true,
            Ok(_) => false,
            Err(error) => !matches!(
                error.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
        }
    }
}
