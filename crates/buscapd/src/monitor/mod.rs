//! Bus monitoring: connection seams, the capture session and its controller.

mod bus;
mod controller;
mod errors;
mod flag;
mod session;
mod zbus_bus;

pub use self::bus::{BusConnector, BusMessage, FieldError, MonitorBus, TransportError};
pub use self::controller::{CaptureController, CaptureStatus};
pub use self::errors::{ControlError, MonitorError};
pub use self::flag::CaptureFlag;
pub use self::session::{BusMonitorSession, SessionState, SessionSummary};
pub use self::zbus_bus::{ZbusConnector, ZbusMessage, ZbusMonitor};

pub(crate) const MONITOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::monitor");
