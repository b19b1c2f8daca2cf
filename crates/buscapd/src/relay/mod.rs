//! Streaming relays from the capture log to connected clients.
//!
//! Each relay follows the log with its own cursor and hands one chunk at a
//! time to its peer. All relays are stepped cooperatively by a single pump
//! thread.

mod errors;
mod peer;
mod pump;
mod registry;
mod stream;

pub use self::errors::RelayError;
pub use self::peer::Peer;
pub use self::pump::{PumpHandle, RelayPump, SharedRegistry};
pub use self::registry::{ConnectionId, PumpReport, RelayRegistry, UPSTREAM_ERROR_STATUS};
pub use self::stream::{RelayState, StepOutcome, StreamRelay};

pub(crate) const RELAY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::relay");
