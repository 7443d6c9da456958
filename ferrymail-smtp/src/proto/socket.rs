use std::{io, mem, sync::Arc};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::{TlsAcceptor, rustls::ServerConfig, server::TlsStream};

use crate::{
    command::{Command, Reply},
    error::ProtocolError,
    proto::Protocol,
};

/// RFC 5321 §4.5.3.1.4: command line limit, terminator included.
const MAX_COMMAND_LINE: usize = 512;
/// RFC 5321 §4.5.3.1.6: text line limit, terminator included.
const MAX_TEXT_LINE: usize = 1000;
const READ_CHUNK: usize = 8192;

enum Connection<S> {
    Plain(S),
    Tls(Box<TlsStream<S>>),
    Closed,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Connection<S> {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read(buf).await,
            Self::Tls(stream) => stream.read(buf).await,
            Self::Closed => Err(closed()),
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(bytes).await,
            Self::Tls(stream) => stream.write_all(bytes).await,
            Self::Closed => Err(closed()),
        }
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is closed")
}

/// Socket-backed [`Protocol`] adapter: a buffered line codec over a
/// plain or TLS stream.
pub struct SmtpStream<S> {
    conn: Connection<S>,
    remote_ip: String,
    /// Bytes read off the stream but not yet consumed as lines.
    buf: Vec<u8>,
    /// Prefix of `buf` already scanned for a terminator.
    scanned: usize,
    /// An over-long line is being thrown away up to its terminator.
    discarding: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> SmtpStream<S> {
    pub fn new(stream: S, remote_ip: String) -> Self {
        Self {
            conn: Connection::Plain(stream),
            remote_ip,
            buf: Vec::new(),
            scanned: 0,
            discarding: false,
        }
    }

    /// Reads one line, terminator stripped.
    ///
    /// Over-long lines are consumed through their terminator before
    /// `LineTooLong` is returned, so the next call starts on a fresh
    /// line. Cancellation-safe: bytes land in `self.buf` only after a
    /// completed read.
    async fn read_line(&mut self, limit: usize) -> Result<Vec<u8>, ProtocolError> {
        loop {
            if let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
                let end = self.scanned + offset;
                let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                self.scanned = 0;

                if mem::take(&mut self.discarding) || line.len() > limit {
                    return Err(ProtocolError::LineTooLong);
                }

                if line.last() == Some(&b'\n') {
                    line.pop();
                }
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(line);
            }

            self.scanned = self.buf.len();

            if self.buf.len() > limit {
                // Past the limit with no terminator in sight: stop
                // accumulating and discard until end of line.
                self.discarding = true;
                self.buf.clear();
                self.scanned = 0;
            }

            let mut chunk = [0u8; READ_CHUNK];
            let bytes_read = self.conn.read(&mut chunk).await?;
            if bytes_read == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
            self.buf.extend_from_slice(&chunk[..bytes_read]);
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Protocol for SmtpStream<S> {
    async fn get_cmd(&mut self) -> Result<Command, ProtocolError> {
        let line = self.read_line(MAX_COMMAND_LINE).await?;
        let line = String::from_utf8_lossy(&line);

        tracing::trace!("<< {line}");

        Ok(Command::parse(&line))
    }

    async fn send(&mut self, reply: &Reply) -> Result<(), ProtocolError> {
        tracing::trace!(">> {reply}");

        let mut text = reply.to_string();
        text.push_str("\r\n");
        self.conn.write_all(text.as_bytes()).await?;
        Ok(())
    }

    async fn read_body(&mut self, body: &mut Vec<u8>) -> Result<(), ProtocolError> {
        loop {
            let line = match self.read_line(MAX_TEXT_LINE).await {
                Ok(line) => line,
                // The stream went away before the terminating dot.
                Err(ProtocolError::ConnectionClosed) => return Err(ProtocolError::Incomplete),
                Err(err) => return Err(err),
            };

            if line == b"." {
                return Ok(());
            }

            // Dot-unstuffing per RFC 5321 §4.5.2.
            let unstuffed = line.strip_prefix(b".").unwrap_or(&line);
            body.extend_from_slice(unstuffed);
            body.extend_from_slice(b"\r\n");
        }
    }

    async fn start_tls(&mut self, config: Arc<ServerConfig>) -> Result<(), ProtocolError> {
        match mem::replace(&mut self.conn, Connection::Closed) {
            Connection::Plain(stream) => {
                let acceptor = TlsAcceptor::from(config);
                // On failure the plain stream is gone with the acceptor;
                // the connection stays closed and the session winds down
                // on its next read.
                let stream = acceptor
                    .accept(stream)
                    .await
                    .map_err(|err| ProtocolError::Tls(err.to_string()))?;
                self.conn = Connection::Tls(Box::new(stream));

                // Anything buffered before the handshake was plaintext
                // and must not leak into the secured conversation.
                self.buf.clear();
                self.scanned = 0;
                self.discarding = false;
                Ok(())
            }
            Connection::Tls(stream) => {
                self.conn = Connection::Tls(stream);
                Err(ProtocolError::Tls(
                    "connection is already in TLS mode".to_string(),
                ))
            }
            Connection::Closed => Err(ProtocolError::ConnectionClosed),
        }
    }

    async fn close(&mut self) {
        match &mut self.conn {
            Connection::Plain(stream) => {
                let _ = stream.shutdown().await;
            }
            Connection::Tls(stream) => {
                let _ = stream.shutdown().await;
            }
            Connection::Closed => {}
        }
        self.conn = Connection::Closed;
    }

    fn remote_ip(&self) -> &str {
        &self.remote_ip
    }
}
