//! Error types shared across the ferrymail crates.

use std::io;

use thiserror::Error;

/// Errors that end a single client session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// I/O failure on the underlying connection.
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// The protocol adapter reported an unrecoverable failure.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    /// Returns `true` if the error is a client-side issue rather than a
    /// server bug.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Protocol(_))
    }
}

/// Errors raised by the connection supervisor.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("Failed to bind listener to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to accept an incoming connection with a non-transient error.
    #[error("Failed to accept connection: {0}")]
    Accept(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn session_error_display() {
        let err = SessionError::Protocol("unexpected reply".to_string());
        assert_eq!(err.to_string(), "Protocol error: unexpected reply");
        assert!(err.is_client_error());
    }

    #[test]
    fn server_error_source_chain() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let bind_err = ServerError::Bind {
            address: "0.0.0.0:25".to_string(),
            source: io_err,
        };

        assert!(bind_err.source().is_some());
        assert_eq!(
            bind_err.to_string(),
            "Failed to bind listener to 0.0.0.0:25: access denied"
        );
    }
}
