//! JSONL control protocol.
//!
//! A client sends one request line and receives one response line:
//!
//! ```json
//! {"command":"start"}
//! {"kind":"status","is_capturing":true}
//! ```
//!
//! Failures are reported as
//! `{"kind":"error","status":409,"message":"..."}`. The `stream` command is
//! the exception: the connection then carries raw capture log bytes for as
//! long as the client keeps it open.

mod errors;
mod handler;
mod request;
mod response;
mod stream_peer;

pub use self::errors::DispatchError;
pub(crate) use self::handler::CaptureConnectionHandler;
pub use self::request::{ControlCommand, ControlRequest};
pub use self::response::{ControlResponse, ResponseWriter};
pub(crate) use self::stream_peer::SocketPeer;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
