//! The adapter seam between the session engine and the wire.

use std::{future::Future, sync::Arc};

use tokio_rustls::rustls::ServerConfig;

use crate::{
    command::{Command, Reply},
    error::ProtocolError,
};

mod socket;

pub use socket::SmtpStream;

/// What the session engine needs from a connection.
///
/// The engine is constructible with anything satisfying this contract;
/// production uses the socket-backed [`SmtpStream`], tests use scripted
/// in-memory adapters.
pub trait Protocol: Send {
    /// Produces the next parsed command.
    ///
    /// Dropping the returned future must not lose buffered bytes: the
    /// engine races this read against the quit signal and retries after
    /// recoverable errors.
    ///
    /// # Errors
    /// [`ProtocolError::LineTooLong`] is recoverable (the engine replies
    /// 500 and reads again); any other error ends the session.
    fn get_cmd(&mut self) -> impl Future<Output = Result<Command, ProtocolError>> + Send;

    /// Writes one reply, multi-line replies included.
    fn send(&mut self, reply: &Reply) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Drains the message body into `body`, dot-unstuffed, until the
    /// `<CRLF>.<CRLF>` terminator.
    ///
    /// # Errors
    /// [`ProtocolError::LineTooLong`] skips the offending line and is
    /// resumable: call again to continue from the current position.
    /// [`ProtocolError::Incomplete`] means the stream closed mid-body.
    fn read_body(
        &mut self,
        body: &mut Vec<u8>,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Upgrades the underlying stream to TLS in-band.
    ///
    /// # Errors
    /// Any error means the handshake did not complete; what state the
    /// stream is left in is adapter-defined.
    fn start_tls(
        &mut self,
        config: Arc<ServerConfig>,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Releases the stream. Further reads and writes fail.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    /// The peer's IP, used to populate the session state at accept time.
    fn remote_ip(&self) -> &str;
}
