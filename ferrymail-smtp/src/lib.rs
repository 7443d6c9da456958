//! SMTP session engine and connection supervisor.
//!
//! The [`Server`] accepts TCP connections and runs a [`session::Session`]
//! per connection. Each session drives the RFC 5321 conversation over a
//! [`proto::Protocol`] adapter, accumulates an envelope in a
//! [`SessionState`], and hands every completed message to the injected
//! [`MailHandler`].

pub mod command;
pub mod error;
pub mod id;
pub mod proto;
pub mod server;
pub mod session;
pub mod state;

pub use command::{Command, Reply};
pub use server::{Config, Server};
pub use state::SessionState;

/// The interface invoked when a mail was received.
///
/// One handler instance is shared by every session, so implementations
/// must tolerate concurrent invocation.
pub trait MailHandler: Send + Sync {
    fn handle_mail(&self, state: &SessionState);
}

/// Allow plain functions and closures to be used as a handler.
impl<F> MailHandler for F
where
    F: Fn(&SessionState) + Send + Sync,
{
    fn handle_mail(&self, state: &SessionState) {
        self(state);
    }
}

/// Connection-time IP screening. A `true` verdict rejects the client
/// before the greeting is sent.
pub trait Blacklist: Send + Sync {
    fn check_ip(&self, ip: &str) -> bool;
}
