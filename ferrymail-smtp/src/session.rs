//! The per-connection SMTP state machine.

use std::sync::Arc;

use ferrymail_common::{Signal, error::SessionError, status::Status};
use tokio::sync::broadcast;
use tokio_rustls::rustls::ServerConfig;

use crate::{
    Blacklist, MailHandler,
    command::{Command, Reply},
    error::ProtocolError,
    proto::Protocol,
    state::SessionState,
};

/// Shared, read-only context handed to every session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Hostname advertised in the greeting and the EHLO reply.
    pub hostname: Arc<str>,
    /// TLS configuration; `None` disables STARTTLS.
    pub tls: Option<Arc<ServerConfig>>,
    pub handler: Arc<dyn MailHandler>,
    pub blacklist: Option<Arc<dyn Blacklist>>,
}

/// Whether the command loop keeps running after a dispatch.
enum Flow {
    Continue,
    Quit,
}

/// What the select over the quit signal and the pending read produced.
enum Event {
    Signal(Result<Signal, broadcast::error::RecvError>),
    Cmd(Result<Command, ProtocolError>),
}

/// One client conversation, generic over the protocol adapter so tests
/// can drive it with a scripted in-memory implementation.
pub struct Session<P: Protocol> {
    proto: P,
    state: SessionState,
    config: SessionConfig,
}

impl<P: Protocol> Session<P> {
    /// Builds a session around an established connection. The state is
    /// born reset, with a fresh id and the peer's IP captured from the
    /// adapter.
    pub fn create(proto: P, config: SessionConfig) -> Self {
        let state = SessionState::new(proto.remote_ip());
        Self {
            proto,
            state,
            config,
        }
    }

    /// Drives the conversation to completion.
    ///
    /// The connection is closed on every exit path. A blacklisted peer
    /// is refused before the greeting.
    ///
    /// # Errors
    /// Returns `SessionError` when the connection fails underneath the
    /// conversation; protocol-level trouble is answered in-band instead.
    pub async fn run(mut self, signal: broadcast::Receiver<Signal>) -> Result<(), SessionError> {
        if let Some(blacklist) = self.config.blacklist.as_deref() {
            if blacklist.check_ip(&self.state.remote_ip) {
                tracing::info!(
                    "Refused blacklisted client {} (session {})",
                    self.state.remote_ip,
                    self.state.session_id
                );
                self.proto.close().await;
                return Ok(());
            }
        }

        tracing::debug!(
            "Session {} connected from {}",
            self.state.session_id,
            self.state.remote_ip
        );

        let result = self.serve(signal).await;
        self.proto.close().await;

        tracing::debug!("Session {} closed", self.state.session_id);
        result
    }

    async fn serve(
        &mut self,
        mut signal: broadcast::Receiver<Signal>,
    ) -> Result<(), SessionError> {
        self.send(&Reply::new(
            Status::Ready,
            format!("{} Service Ready", self.config.hostname),
        ))
        .await?;

        while let Some(cmd) = self.next_cmd(&mut signal).await? {
            if let Flow::Quit = self.dispatch(cmd).await? {
                break;
            }
        }

        Ok(())
    }

    /// Reads the next command, racing the pending read against the quit
    /// signal. `None` means the quit phase fired and the goodbye has
    /// been sent.
    ///
    /// The `Shutdown` phase only concerns the accept loop; sessions note
    /// it and keep serving.
    async fn next_cmd(
        &mut self,
        signal: &mut broadcast::Receiver<Signal>,
    ) -> Result<Option<Command>, SessionError> {
        loop {
            let event = tokio::select! {
                sig = signal.recv() => Event::Signal(sig),
                cmd = self.proto.get_cmd() => Event::Cmd(cmd),
            };

            match event {
                Event::Signal(Ok(Signal::Shutdown))
                | Event::Signal(Err(broadcast::error::RecvError::Lagged(_))) => {}
                Event::Signal(_) => {
                    let _ = self
                        .send(&Reply::new(Status::ShuttingDown, "Server is going down."))
                        .await;
                    return Ok(None);
                }
                Event::Cmd(Ok(cmd)) => return Ok(Some(cmd)),
                Event::Cmd(Err(ProtocolError::LineTooLong)) => {
                    self.send(&Reply::new(Status::SyntaxError, "Line too long."))
                        .await?;
                }
                Event::Cmd(Err(err)) => {
                    tracing::debug!(
                        "Session {} read failed: {err}",
                        self.state.session_id
                    );
                    return Err(SessionError::Protocol(err.to_string()));
                }
            }
        }
    }

    /// The dispatch table. The `Command` enum is closed, so a variant
    /// without an arm here is a compile error rather than a runtime
    /// surprise.
    async fn dispatch(&mut self, cmd: Command) -> Result<Flow, SessionError> {
        match cmd {
            Command::Helo { domain } => {
                self.state.hostname = Some(domain);
                self.send(&Reply::new(Status::Ok, self.config.hostname.to_string()))
                    .await?;
            }

            Command::Ehlo { domain } => {
                self.state.reset();
                self.state.hostname = Some(domain);

                let mut lines = vec![self.config.hostname.to_string(), "8BITMIME".to_string()];
                if self.config.tls.is_some() && !self.state.secure {
                    lines.push("STARTTLS".to_string());
                }
                lines.push("OK".to_string());

                self.send(&Reply::multi(Status::Ok, lines)).await?;
            }

            Command::Mail {
                from,
                eight_bit_mime,
            } => {
                if let Err(reason) = self.state.can_receive_mail() {
                    self.send(&Reply::new(Status::BadSequence, reason)).await?;
                    return Ok(Flow::Continue);
                }

                self.state.from = Some(from);
                self.state.eight_bit_mime = eight_bit_mime;

                let message = if eight_bit_mime {
                    "Sender and 8BITMIME ok"
                } else {
                    "Sender ok"
                };
                self.send(&Reply::new(Status::Ok, message)).await?;
            }

            Command::Rcpt { to } => {
                if let Err(reason) = self.state.can_receive_rcpt() {
                    self.send(&Reply::new(Status::BadSequence, reason)).await?;
                    return Ok(Flow::Continue);
                }

                self.state.to.push(to);
                self.send(&Reply::new(Status::Ok, "OK")).await?;
            }

            Command::Data => self.receive_data().await?,

            Command::Rset => {
                self.state.reset();
                self.send(&Reply::new(Status::Ok, "OK")).await?;
            }

            Command::StartTls => self.start_tls().await?,

            Command::Noop => {
                self.send(&Reply::new(Status::Ok, "OK")).await?;
            }

            Command::Vrfy | Command::Expn | Command::Send | Command::Soml | Command::Saml => {
                self.send(&Reply::new(
                    Status::NotImplemented,
                    "Command not implemented",
                ))
                .await?;
            }

            Command::Quit => {
                self.send(&Reply::new(Status::Closing, "Bye!")).await?;
                return Ok(Flow::Quit);
            }

            Command::Invalid { reason } => {
                self.send(&Reply::new(Status::SyntaxErrorParam, reason))
                    .await?;
            }

            Command::Unknown { .. } => {
                self.send(&Reply::new(Status::SyntaxError, "Command not recognized"))
                    .await?;
            }
        }

        Ok(Flow::Continue)
    }

    /// 354, drain the body, hand the envelope over, reset.
    async fn receive_data(&mut self) -> Result<(), SessionError> {
        if let Err(reason) = self.state.can_receive_data() {
            // RFC 5321 §3.3: without a 354 the client must not send the
            // message data.
            return self.send(&Reply::new(Status::BadSequence, reason)).await;
        }

        let message = if self.state.eight_bit_mime {
            "Start 8BITMIME mail input; end with <CRLF>.<CRLF>"
        } else {
            "Start mail input; end with <CRLF>.<CRLF>"
        };
        self.send(&Reply::new(Status::StartData, message)).await?;

        loop {
            match self.proto.read_body(&mut self.state.data).await {
                Ok(()) => break,
                Err(ProtocolError::LineTooLong) => {
                    self.send(&Reply::new(Status::SyntaxError, "Line too long"))
                        .await?;
                }
                Err(ProtocolError::Incomplete) => {
                    self.send(&Reply::new(
                        Status::SyntaxError,
                        "Could not parse mail data",
                    ))
                    .await?;
                    self.state.reset();
                    return Ok(());
                }
                Err(err) => return Err(SessionError::Protocol(err.to_string())),
            }
        }

        self.config.handler.handle_mail(&self.state);

        self.send(&Reply::new(Status::Ok, "Mail delivered")).await?;

        // Clean slate so further mails can flow over the same session.
        self.state.reset();
        Ok(())
    }

    async fn start_tls(&mut self) -> Result<(), SessionError> {
        let Some(tls) = self.config.tls.clone() else {
            return self
                .send(&Reply::new(
                    Status::NotImplemented,
                    "STARTTLS is not implemented",
                ))
                .await;
        };

        if self.state.secure {
            return self
                .send(&Reply::new(Status::NotImplemented, "Already in TLS mode"))
                .await;
        }

        self.send(&Reply::new(Status::Ready, "Ready for TLS handshake"))
            .await?;

        match self.proto.start_tls(tls).await {
            Ok(()) => {
                tracing::debug!("Session {} upgraded to TLS", self.state.session_id);
                // RFC 3207 §4.2: the envelope must not survive the
                // handshake.
                self.state.reset();
                self.state.secure = true;
            }
            Err(err) => {
                tracing::warn!(
                    "Session {} TLS handshake failed: {err}",
                    self.state.session_id
                );
            }
        }

        Ok(())
    }

    async fn send(&mut self, reply: &Reply) -> Result<(), SessionError> {
        self.proto
            .send(reply)
            .await
            .map_err(|err| SessionError::Protocol(format!("Failed to send reply: {err}")))
    }
}
