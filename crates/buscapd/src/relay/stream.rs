//! Per-connection relay from the capture log to a peer.

use std::io;

use tracing::{debug, warn};

use crate::capture::{CaptureLog, ReadOutcome, StreamCursor};

use super::RELAY_TARGET;
use super::errors::RelayError;
use super::peer::Peer;

/// Relay lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Opened, nothing read yet.
    Idle,
    /// Waiting for the log to yield bytes.
    Reading,
    /// One chunk is being handed to the peer.
    Delivering,
    /// Terminal; the cursor and peer are released.
    Closed,
}

/// What a single [`StreamRelay::step`] achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Bytes were read or delivered.
    Progressed,
    /// Nothing to do until the log grows or the peer drains.
    Waiting,
    /// The relay reached [`RelayState::Closed`].
    Closed,
}

#[derive(Debug)]
struct OutgoingBuffer {
    bytes: Box<[u8]>,
    len: usize,
    sent: usize,
}

impl OutgoingBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity].into_boxed_slice(),
            len: 0,
            sent: 0,
        }
    }

    fn load(&mut self, data: &[u8]) -> bool {
        let Some(target) = self.bytes.get_mut(..data.len()) else {
            return false;
        };
        target.copy_from_slice(data);
        self.len = data.len();
        self.sent = 0;
        true
    }

    fn pending(&self) -> &[u8] {
        self.bytes.get(self.sent..self.len).unwrap_or_default()
    }

    fn advance(&mut self, count: usize) {
        self.sent = self.sent.saturating_add(count).min(self.len);
    }

    const fn reset(&mut self) {
        self.len = 0;
        self.sent = 0;
    }
}

/// Streams the capture log to one peer, one chunk at a time.
///
/// The relay owns its read cursor and both buffers; dropping it releases
/// them. No read is issued while a chunk is still being delivered, so at most
/// one chunk is ever in flight.
#[derive(Debug)]
pub struct StreamRelay {
    cursor: Option<StreamCursor>,
    scratch: Box<[u8]>,
    outgoing: OutgoingBuffer,
    state: RelayState,
}

impl StreamRelay {
    /// Opens a relay over `log` with buffers of `chunk_size` bytes.
    ///
    /// Fails with [`RelayError::SourceNotFound`] when the log has not been
    /// created yet.
    pub fn open(log: &CaptureLog, chunk_size: usize) -> Result<Self, RelayError> {
        if !log.exists() {
            return Err(RelayError::SourceNotFound {
                path: log.path().to_path_buf(),
            });
        }
        let cursor = log.open_for_read().map_err(|error| {
            if error.is_not_found() {
                RelayError::SourceNotFound {
                    path: log.path().to_path_buf(),
                }
            } else {
                RelayError::Log(error)
            }
        })?;
        Ok(Self {
            cursor: Some(cursor),
            scratch: vec![0; chunk_size].into_boxed_slice(),
            outgoing: OutgoingBuffer::with_capacity(chunk_size),
            state: RelayState::Idle,
        })
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RelayState {
        self.state
    }

    /// Bytes consumed from the log so far.
    #[must_use]
    pub fn cursor_offset(&self) -> u64 {
        self.cursor.as_ref().map_or(0, StreamCursor::offset)
    }

    /// Advances the state machine by one step.
    pub fn step<P: Peer + ?Sized>(&mut self, peer: &mut P) -> StepOutcome {
        match self.state {
            RelayState::Closed => StepOutcome::Closed,
            RelayState::Idle | RelayState::Reading => {
                self.state = RelayState::Reading;
                self.read(peer)
            }
            RelayState::Delivering => self.deliver(peer),
        }
    }

    /// Discards any undelivered bytes.
    pub const fn reset_buffers(&mut self) {
        self.outgoing.reset();
    }

    /// Releases the cursor and closes the peer.
    pub fn close<P: Peer + ?Sized>(&mut self, peer: &mut P) -> StepOutcome {
        if self.state != RelayState::Closed {
            self.state = RelayState::Closed;
            self.cursor = None;
            self.outgoing.reset();
            peer.close_connection();
        }
        StepOutcome::Closed
    }

    fn read<P: Peer + ?Sized>(&mut self, peer: &mut P) -> StepOutcome {
        let Some(cursor) = self.cursor.as_mut() else {
            return self.close(peer);
        };
        match cursor.read_chunk(&mut self.scratch) {
            Ok(ReadOutcome::Data(count)) => {
                let loaded = self
                    .scratch
                    .get(..count)
                    .is_some_and(|data| self.outgoing.load(data));
                if !loaded {
                    return self.close(peer);
                }
                self.state = RelayState::Delivering;
                match self.deliver(peer) {
                    StepOutcome::Closed => StepOutcome::Closed,
                    StepOutcome::Progressed | StepOutcome::Waiting => StepOutcome::Progressed,
                }
            }
            Ok(ReadOutcome::NoData) => {
                if peer.is_disconnected() {
                    debug!(target: RELAY_TARGET, "peer disconnected while idle");
                    self.close(peer)
                } else {
                    StepOutcome::Waiting
                }
            }
            Err(error) => {
                warn!(target: RELAY_TARGET, %error, "capture log read failed");
                self.close(peer)
            }
        }
    }

    fn deliver<P: Peer + ?Sized>(&mut self, peer: &mut P) -> StepOutcome {
        let mut progressed = false;
        loop {
            let pending = self.outgoing.pending();
            if pending.is_empty() {
                self.outgoing.reset();
                self.state = RelayState::Reading;
                return StepOutcome::Progressed;
            }
            match peer.send_chunk(pending) {
                Ok(0) => {
                    debug!(target: RELAY_TARGET, "peer accepted no bytes");
                    return self.close(peer);
                }
                Ok(count) => {
                    self.outgoing.advance(count);
                    progressed = true;
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    return if progressed {
                        StepOutcome::Progressed
                    } else {
                        StepOutcome::Waiting
                    };
                }
                Err(error) => {
                    debug!(target: RELAY_TARGET, %error, "chunk delivery failed");
                    return self.close(peer);
                }
            }
        }
    }
}
