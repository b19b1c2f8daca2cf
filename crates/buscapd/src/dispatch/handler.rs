//! Connection handler for the control protocol.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::monitor::{BusConnector, CaptureController, CaptureStatus};
use crate::relay::{ConnectionId, SharedRegistry};
use crate::transport::{ConnectionHandler, ConnectionStream};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::request::{ControlCommand, ControlRequest, read_request_line};
use super::response::ResponseWriter;
use super::stream_peer::SocketPeer;

/// Serves control requests against a capture controller.
///
/// Every command except `stream` gets exactly one response line before the
/// connection closes. A `stream` connection is handed over to the relay
/// registry and stays open until either side closes it.
#[derive(Debug)]
pub(crate) struct CaptureConnectionHandler<C> {
    controller: Arc<CaptureController<C>>,
    relays: SharedRegistry<SocketPeer>,
}

impl<C: BusConnector> CaptureConnectionHandler<C> {
    pub(crate) const fn new(
        controller: Arc<CaptureController<C>>,
        relays: SharedRegistry<SocketPeer>,
    ) -> Self {
        Self { controller, relays }
    }

    fn dispatch(&self, mut stream: ConnectionStream) {
        let request = match read_request_line(&mut stream)
            .and_then(|line| line.map(|bytes| ControlRequest::parse(&bytes)).transpose())
        {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(target: DISPATCH_TARGET, "client closed without a request");
                return;
            }
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "rejected request");
                reply_error(&mut stream, &error);
                return;
            }
        };

        debug!(target: DISPATCH_TARGET, command = ?request.command, "dispatching request");
        let outcome = match request.command {
            ControlCommand::Stream => {
                if let Err(error) = self.open_stream(stream) {
                    warn!(target: DISPATCH_TARGET, %error, "stream not opened");
                }
                return;
            }
            ControlCommand::Status => Ok(self.controller.is_capturing()),
            ControlCommand::Start => self.controller.start_capture(),
            ControlCommand::Stop => self.controller.stop_capture(),
            ControlCommand::Clear => self.controller.clear_capture(),
        };
        self.reply(&mut stream, outcome.map_err(DispatchError::from));
    }

    fn reply(&self, stream: &mut ConnectionStream, outcome: Result<CaptureStatus, DispatchError>) {
        let written = match outcome {
            Ok(status) => ResponseWriter::new(&mut *stream).write_status(status),
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "command failed");
                ResponseWriter::new(&mut *stream).write_error(&error)
            }
        };
        if let Err(error) = written {
            debug!(
                target: DISPATCH_TARGET,
                %error,
                capturing = self.controller.is_capturing().is_capturing,
                "failed to write response"
            );
        }
    }

    /// Registers the connection with the relay registry.
    ///
    /// Registry failures have already been reported to the peer.
    fn open_stream(&self, mut stream: ConnectionStream) -> Result<(), DispatchError> {
        let Ok(mut relays) = self.relays.lock() else {
            let error = DispatchError::RegistryPoisoned;
            reply_error(&mut stream, &error);
            return Err(error);
        };
        let peer = SocketPeer::new(stream)?;
        let id = ConnectionId::next();
        relays.on_open(id, peer)?;
        debug!(target: DISPATCH_TARGET, connection_id = %id, "stream handed to relay");
        Ok(())
    }
}

impl<C: BusConnector> ConnectionHandler for CaptureConnectionHandler<C> {
    fn handle(&self, stream: ConnectionStream) {
        self.dispatch(stream);
    }
}

fn reply_error(stream: &mut ConnectionStream, error: &DispatchError) {
    if let Err(write_error) = ResponseWriter::new(stream).write_error(error) {
        debug!(target: DISPATCH_TARGET, error = %write_error, "failed to write error");
    }
}
