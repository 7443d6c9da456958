//! Error types for the protocol adapter and TLS configuration.

use std::io;

use thiserror::Error;

/// Errors surfaced by a [`crate::proto::Protocol`] adapter.
///
/// Only [`ProtocolError::LineTooLong`] is recoverable at the command-read
/// point; during a DATA drain [`ProtocolError::Incomplete`] additionally
/// lets the session continue after discarding the transaction. Everything
/// else ends the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A command or text line exceeded the allowed length. The offending
    /// line has been consumed; the next read resumes past it.
    #[error("Line too long")]
    LineTooLong,

    /// The stream closed in the middle of a message body.
    #[error("Unexpected end of mail data")]
    Incomplete,

    /// The peer closed the connection between commands.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// The in-band TLS upgrade did not complete.
    #[error("TLS handshake failed: {0}")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Whether the engine may keep reading commands after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::LineTooLong)
    }
}

/// Errors loading the TLS certificate and key at startup.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Unable to load TLS certificate {path}: {source}")]
    CertificateLoad {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Unable to load TLS key {path}: {reason}")]
    KeyLoad { path: String, reason: String },

    #[error(transparent)]
    Config(#[from] tokio_rustls::rustls::Error),
}
