//! Capture data model and its durable log.

mod cursor;
mod log;
mod record;

pub use self::cursor::{ReadOutcome, StreamCursor};
pub use self::log::{CaptureLog, LogError};
pub use self::record::{CaptureRecord, MessageKind, unix_timestamp};
