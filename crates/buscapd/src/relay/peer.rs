use std::io;

/// The receiving side of a stream relay.
///
/// Implementations wrap a client connection. None of the methods may block
/// for long: they run on the shared relay pump thread.
pub trait Peer: Send + 'static {
    /// Offers `chunk` to the client and returns how many bytes were accepted.
    ///
    /// `WouldBlock` means the client cannot take data right now; the relay
    /// retries the same bytes on its next step. Any other error, or zero bytes
    /// accepted from a non-empty chunk, closes the relay.
    fn send_chunk(&mut self, chunk: &[u8]) -> io::Result<usize>;

    /// Closes the client connection.
    fn close_connection(&mut self);

    /// Tells the client the stream cannot be served.
    fn report_unavailable(&mut self, status: u16, message: &str);

    /// Whether the client has gone away.
    ///
    /// Polled while the relay waits for the log to grow.
    fn is_disconnected(&mut self) -> bool;
}
