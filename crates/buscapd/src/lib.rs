//! Bus capture daemon.
//!
//! `buscapd` attaches to a message bus as a monitor, appends every observed
//! message to a JSON Lines capture log and streams that log to clients on
//! request. Clients drive it over a local control socket with one JSON
//! request per connection; see the `dispatch` module for the wire format.
//!
//! The moving parts, in start-up order:
//!
//! 1. configuration comes from `buscap_config`;
//! 2. [`telemetry`] installs the tracing subscriber;
//! 3. the control socket is bound and the [`relay`] pump started;
//! 4. [`monitor::CaptureController`] starts and stops capture sessions.
//!
//! Capture runs on its own thread. Stream relays are stepped cooperatively
//! by a single pump thread so a slow client never holds up capture.

pub mod capture;
mod dispatch;
pub mod monitor;
mod process;
pub mod relay;
pub mod telemetry;
mod transport;

pub use dispatch::{ControlCommand, ControlRequest, ControlResponse, DispatchError};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
