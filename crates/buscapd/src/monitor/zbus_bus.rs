//! Monitor connections backed by `zbus`.
//!
//! `zbus` exposes a blocking message iterator without a timeout, so a reader
//! thread forwards messages over a bounded channel and the session waits on
//! the channel instead. The iterator subscribes before `BecomeMonitor` is
//! sent, so nothing the daemon emits during registration is missed. Dropping
//! the monitor closes the connection, which also ends the reader.

use std::io;
use std::num::NonZeroU32;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

use buscap_config::BusAddress;
use tracing::{debug, warn};
use zbus::blocking::{Connection, MessageIterator, connection};

use crate::capture::MessageKind;

use super::MONITOR_TARGET;
use super::bus::{BusConnector, BusMessage, FieldError, MonitorBus, TransportError};
use super::errors::MonitorError;

const DBUS_SERVICE: &str = "org.freedesktop.DBus";
const DBUS_PATH: &str = "/org/freedesktop/DBus";
const MONITORING_INTERFACE: &str = "org.freedesktop.DBus.Monitoring";
const BECOME_MONITOR: &str = "BecomeMonitor";

/// Messages buffered between the reader thread and the session.
const READER_BACKLOG: usize = 1024;

/// Opens monitor connections to a configured bus.
#[derive(Debug, Clone)]
pub struct ZbusConnector {
    bus: BusAddress,
}

impl ZbusConnector {
    /// Creates a connector for `bus`.
    #[must_use]
    pub const fn new(bus: BusAddress) -> Self {
        Self { bus }
    }

    fn builder(&self) -> zbus::Result<connection::Builder<'static>> {
        match &self.bus {
            BusAddress::System => connection::Builder::system(),
            BusAddress::Session => connection::Builder::session(),
            BusAddress::Address(address) => connection::Builder::address(address.as_str()),
        }
    }
}

impl BusConnector for ZbusConnector {
    type Bus = ZbusMonitor;

    fn connect(&self) -> Result<Self::Bus, MonitorError> {
        let connection = self
            .builder()
            .and_then(connection::Builder::build)
            .map_err(|error| MonitorError::BusConnect {
                bus: self.bus.to_string(),
                reason: error.to_string(),
            })?;
        debug!(target: MONITOR_TARGET, bus = %self.bus, "connected to bus");
        Ok(ZbusMonitor {
            connection,
            messages: None,
        })
    }
}

/// A `zbus` connection that is, or is about to become, a bus monitor.
#[derive(Debug)]
pub struct ZbusMonitor {
    connection: Connection,
    messages: Option<Receiver<zbus::Result<zbus::Message>>>,
}

impl MonitorBus for ZbusMonitor {
    type Message = ZbusMessage;

    fn become_monitor(&mut self, match_rules: &[&str]) -> Result<(), MonitorError> {
        let rules: Vec<&str> = match_rules.to_vec();
        let iterator = MessageIterator::from(self.connection.clone());
        let reply = self
            .connection
            .call_method(
                Some(DBUS_SERVICE),
                DBUS_PATH,
                Some(MONITORING_INTERFACE),
                BECOME_MONITOR,
                &(rules, 0_u32),
            )
            .map_err(|error| MonitorError::MonitorRegistration {
                reason: error.to_string(),
            })?;
        let registration = reply.header().reply_serial();

        let (sender, receiver) = mpsc::sync_channel(READER_BACKLOG);
        spawn_reader(iterator, registration, sender).map_err(|error| {
            MonitorError::MonitorRegistration {
                reason: format!("failed to spawn bus reader: {error}"),
            }
        })?;
        self.messages = Some(receiver);
        Ok(())
    }

    fn next_message(&mut self, timeout: Duration) -> Result<Option<Self::Message>, TransportError> {
        let Some(messages) = self.messages.as_ref() else {
            return Err(TransportError::Closed);
        };
        loop {
            match messages.recv_timeout(timeout) {
                Ok(Ok(message)) => return Ok(Some(ZbusMessage(message))),
                Ok(Err(zbus::Error::InputOutput(error))) => {
                    return Err(TransportError::Read {
                        reason: error.to_string(),
                    });
                }
                Ok(Err(error)) => {
                    debug!(target: MONITOR_TARGET, %error, "discarding undecodable message");
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed),
            }
        }
    }
}

impl Drop for ZbusMonitor {
    fn drop(&mut self) {
        self.messages = None;
        if let Err(error) = self.connection.clone().close() {
            debug!(target: MONITOR_TARGET, %error, "closing monitor connection failed");
        }
    }
}

/// Forwards `iterator` into `sender`, dropping the reply to the registration
/// call identified by `registration`.
fn spawn_reader(
    iterator: MessageIterator,
    registration: Option<NonZeroU32>,
    sender: SyncSender<zbus::Result<zbus::Message>>,
) -> io::Result<()> {
    thread::Builder::new()
        .name("buscap-bus-reader".to_owned())
        .spawn(move || {
            let mut pending_reply = registration;
            for item in iterator {
                let is_registration_reply = pending_reply.is_some()
                    && item
                        .as_ref()
                        .is_ok_and(|message| message.header().reply_serial() == pending_reply);
                if is_registration_reply {
                    pending_reply = None;
                    continue;
                }
                if sender.send(item).is_err() {
                    return;
                }
            }
            warn!(target: MONITOR_TARGET, "bus message stream ended");
        })
        .map(drop)
}

/// A message observed on a monitor connection.
#[derive(Debug, Clone)]
pub struct ZbusMessage(zbus::Message);

impl From<zbus::Message> for ZbusMessage {
    fn from(message: zbus::Message) -> Self {
        Self(message)
    }
}

impl BusMessage for ZbusMessage {
    fn kind(&self) -> Result<MessageKind, FieldError> {
        let code = self.0.header().message_type() as u8;
        MessageKind::from_code(code)
            .ok_or_else(|| FieldError::new("type", format!("unknown message type {code}")))
    }

    fn cookie(&self) -> Result<Option<u64>, FieldError> {
        Ok(Some(u64::from(self.0.header().primary().serial_num().get())))
    }

    fn reply_cookie(&self) -> Result<Option<u64>, FieldError> {
        Ok(self
            .0
            .header()
            .reply_serial()
            .map(|serial| u64::from(serial.get())))
    }

    fn path(&self) -> Result<Option<String>, FieldError> {
        Ok(self.0.header().path().map(ToString::to_string))
    }

    fn interface(&self) -> Result<Option<String>, FieldError> {
        Ok(self.0.header().interface().map(ToString::to_string))
    }

    fn sender(&self) -> Result<Option<String>, FieldError> {
        Ok(self.0.header().sender().map(ToString::to_string))
    }

    fn destination(&self) -> Result<Option<String>, FieldError> {
        Ok(self.0.header().destination().map(ToString::to_string))
    }

    fn member(&self) -> Result<Option<String>, FieldError> {
        Ok(self.0.header().member().map(ToString::to_string))
    }

    fn signature(&self) -> Result<Option<String>, FieldError> {
        Ok(self.0.header().signature().map(ToString::to_string))
    }
}
