//! Hand-written fakes for the bus and relay seams.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::capture::MessageKind;
use crate::monitor::{
    BusConnector, BusMessage, CaptureFlag, FieldError, MonitorBus, MonitorError, TransportError,
};
use crate::relay::Peer;

/// In-memory bus message with optional header fields.
#[derive(Debug, Clone)]
pub struct FakeMessage {
    kind: MessageKind,
    cookie: Option<u64>,
    reply_cookie: Option<u64>,
    path: Option<String>,
    interface: Option<String>,
    sender: Option<String>,
    destination: Option<String>,
    member: Option<String>,
    signature: Option<String>,
    failing: Option<&'static str>,
}

impl FakeMessage {
    fn of_kind(kind: MessageKind) -> Self {
        Self {
            kind,
            cookie: None,
            reply_cookie: None,
            path: None,
            interface: None,
            sender: None,
            destination: None,
            member: None,
            signature: None,
            failing: None,
        }
    }

    pub fn signal() -> Self {
        Self::of_kind(MessageKind::Signal)
    }

    pub fn method_call(path: &str) -> Self {
        Self {
            path: Some(path.to_owned()),
            ..Self::of_kind(MessageKind::MethodCall)
        }
    }

    pub fn method_return(reply_cookie: u64) -> Self {
        Self {
            reply_cookie: Some(reply_cookie),
            ..Self::of_kind(MessageKind::MethodReturn)
        }
    }

    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = Some(cookie);
        self
    }

    pub fn with_member(mut self, member: &str) -> Self {
        self.member = Some(member.to_owned());
        self
    }

    pub fn with_interface(mut self, interface: &str) -> Self {
        self.interface = Some(interface.to_owned());
        self
    }

    pub fn with_sender(mut self, sender: &str) -> Self {
        self.sender = Some(sender.to_owned());
        self
    }

    pub fn with_signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_owned());
        self
    }

    /// Makes the named accessor fail.
    pub fn failing(mut self, field: &'static str) -> Self {
        self.failing = Some(field);
        self
    }

    fn read<T: Clone>(&self, field: &'static str, value: &T) -> Result<T, FieldError> {
        if self.failing == Some(field) {
            return Err(FieldError::new(field, "scripted failure"));
        }
        Ok(value.clone())
    }
}

impl BusMessage for FakeMessage {
    fn kind(&self) -> Result<MessageKind, FieldError> {
        self.read("type", &self.kind)
    }

    fn cookie(&self) -> Result<Option<u64>, FieldError> {
        self.read("cookie", &self.cookie)
    }

    fn reply_cookie(&self) -> Result<Option<u64>, FieldError> {
        self.read("reply_cookie", &self.reply_cookie)
    }

    fn path(&self) -> Result<Option<String>, FieldError> {
        self.read("path", &self.path)
    }

    fn interface(&self) -> Result<Option<String>, FieldError> {
        self.read("interface", &self.interface)
    }

    fn sender(&self) -> Result<Option<String>, FieldError> {
        self.read("sender", &self.sender)
    }

    fn destination(&self) -> Result<Option<String>, FieldError> {
        self.read("destination", &self.destination)
    }

    fn member(&self) -> Result<Option<String>, FieldError> {
        self.read("member", &self.member)
    }

    fn signature(&self) -> Result<Option<String>, FieldError> {
        self.read("signature", &self.signature)
    }
}

/// What a scripted bus does once its messages run out.
#[derive(Debug, Clone)]
enum WhenDrained {
    /// Wait out each timeout with no traffic.
    Idle,
    /// Report the connection as closed.
    Close,
    /// Lower the given flag, then idle.
    Stop(CaptureFlag),
}

#[derive(Debug)]
struct ConnectorState {
    messages: Vec<FakeMessage>,
    when_drained: WhenDrained,
    refuse_connect: bool,
    refuse_monitor: bool,
    connections: AtomicUsize,
}

/// Connector handing out scripted buses.
#[derive(Debug, Clone)]
pub struct ScriptedConnector(Arc<ConnectorState>);

impl ScriptedConnector {
    fn build(messages: Vec<FakeMessage>, when_drained: WhenDrained) -> Self {
        Self(Arc::new(ConnectorState {
            messages,
            when_drained,
            refuse_connect: false,
            refuse_monitor: false,
            connections: AtomicUsize::new(0),
        }))
    }

    /// A bus with no traffic at all.
    pub fn idle() -> Self {
        Self::build(Vec::new(), WhenDrained::Idle)
    }

    /// Delivers `messages`, then stays quiet.
    pub fn with_messages(messages: Vec<FakeMessage>) -> Self {
        Self::build(messages, WhenDrained::Idle)
    }

    /// Delivers `messages`, then lowers `flag` so the drain loop ends.
    pub fn stopping(flag: &CaptureFlag, messages: Vec<FakeMessage>) -> Self {
        Self::build(messages, WhenDrained::Stop(flag.clone()))
    }

    /// Delivers `messages`, then drops the connection.
    pub fn dropping_after(messages: Vec<FakeMessage>) -> Self {
        Self::build(messages, WhenDrained::Close)
    }

    /// Drops the connection straight away.
    pub fn closing() -> Self {
        Self::dropping_after(Vec::new())
    }

    pub fn refusing_connect() -> Self {
        let mut state = Self::idle();
        if let Some(inner) = Arc::get_mut(&mut state.0) {
            inner.refuse_connect = true;
        }
        state
    }

    pub fn refusing_monitor() -> Self {
        let mut state = Self::idle();
        if let Some(inner) = Arc::get_mut(&mut state.0) {
            inner.refuse_monitor = true;
        }
        state
    }

    /// Connections opened so far.
    pub fn connections(&self) -> usize {
        self.0.connections.load(Ordering::SeqCst)
    }
}

impl BusConnector for ScriptedConnector {
    type Bus = ScriptedBus;

    fn connect(&self) -> Result<Self::Bus, MonitorError> {
        if self.0.refuse_connect {
            return Err(MonitorError::BusConnect {
                bus: "scripted".to_owned(),
                reason: "connection refused".to_owned(),
            });
        }
        self.0.connections.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedBus {
            queue: self.0.messages.iter().cloned().collect(),
            when_drained: self.0.when_drained.clone(),
            refuse_monitor: self.0.refuse_monitor,
            monitoring: false,
        })
    }
}

/// Bus replaying a fixed message list.
#[derive(Debug)]
pub struct ScriptedBus {
    queue: VecDeque<FakeMessage>,
    when_drained: WhenDrained,
    refuse_monitor: bool,
    monitoring: bool,
}

impl MonitorBus for ScriptedBus {
    type Message = FakeMessage;

    fn become_monitor(&mut self, match_rules: &[&str]) -> Result<(), MonitorError> {
        assert!(match_rules.is_empty(), "monitor should match every message");
        if self.refuse_monitor {
            return Err(MonitorError::MonitorRegistration {
                reason: "access denied".to_owned(),
            });
        }
        self.monitoring = true;
        Ok(())
    }

    fn next_message(&mut self, timeout: Duration) -> Result<Option<Self::Message>, TransportError> {
        assert!(self.monitoring, "messages requested before monitor registration");
        if let Some(message) = self.queue.pop_front() {
            return Ok(Some(message));
        }
        match &self.when_drained {
            WhenDrained::Close => Err(TransportError::Closed),
            WhenDrained::Stop(flag) => {
                flag.lower();
                Ok(None)
            }
            WhenDrained::Idle => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Default)]
struct PeerState {
    chunks: Vec<Vec<u8>>,
    reports: Vec<(u16, String)>,
    closed: bool,
    blocked: bool,
    failing: bool,
    disconnected: bool,
    accept_limit: Option<usize>,
}

/// Peer that records everything a relay hands it.
///
/// Clones share state, so a test can keep one handle while the registry owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct RecordingPeer(Arc<Mutex<PeerState>>);

impl RecordingPeer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PeerState> {
        self.0.lock().expect("peer state lock")
    }

    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.state().chunks.clone()
    }

    pub fn reports(&self) -> Vec<(u16, String)> {
        self.state().reports.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Makes `send_chunk` report `WouldBlock`.
    pub fn set_blocked(&self, blocked: bool) {
        self.state().blocked = blocked;
    }

    /// Makes `send_chunk` fail with a broken pipe.
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Caps how many bytes each `send_chunk` accepts.
    pub fn set_accept_limit(&self, limit: Option<usize>) {
        self.state().accept_limit = limit;
    }

    /// Simulates the client hanging up.
    pub fn disconnect(&self) {
        self.state().disconnected = true;
    }
}

impl Peer for RecordingPeer {
    fn send_chunk(&mut self, chunk: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.closed || state.failing || state.disconnected {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        if state.blocked {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let accepted = state.accept_limit.map_or(chunk.len(), |limit| limit.min(chunk.len()));
        state.chunks.push(chunk.iter().take(accepted).copied().collect());
        Ok(accepted)
    }

    fn close_connection(&mut self) {
        self.state().closed = true;
    }

    fn report_unavailable(&mut self, status: u16, message: &str) {
        self.state().reports.push((status, message.to_owned()));
    }

    fn is_disconnected(&mut self) -> bool {
        self.state().disconnected
    }
}
