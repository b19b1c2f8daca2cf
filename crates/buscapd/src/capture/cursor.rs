//! Non-blocking read cursor over the capture log.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::path::Path;

/// Result of a single cursor read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were copied into the buffer and the cursor advanced by `n`.
    Data(usize),
    /// Nothing beyond the current offset yet.
    NoData,
}

/// Read handle positioned at a monotonically increasing offset.
///
/// The cursor never seeks. If the log is truncated underneath it, reads keep
/// reporting [`ReadOutcome::NoData`] until the file grows past the old offset.
#[derive(Debug)]
pub struct StreamCursor {
    file: File,
    offset: u64,
}

impl StreamCursor {
    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_NONBLOCK);
        }
        let file = options.open(path)?;
        Ok(Self { file, offset: 0 })
    }

    /// Bytes consumed so far.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads at most `buffer.len()` bytes from the current offset.
    ///
    /// End of file and `WouldBlock` both map to [`ReadOutcome::NoData`]: the
    /// log is expected to keep growing while capture runs.
    pub fn read_chunk(&mut self, buffer: &mut [u8]) -> io::Result<ReadOutcome> {
        loop {
            match self.file.read(buffer) {
                Ok(0) => return Ok(ReadOutcome::NoData),
                Ok(count) => {
                    self.offset += count as u64;
                    return Ok(ReadOutcome::Data(count));
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadOutcome::NoData);
                }
                Err(error) => return Err(error),
            }
        }
    }
}
