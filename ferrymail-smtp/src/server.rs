//! The connection supervisor: TCP accept loop and two-phase shutdown.

use std::{
    fs::File,
    io::{self, BufReader},
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use ferrymail_common::{Signal, error::ServerError};
use futures_util::future::join_all;
use serde::Deserialize;
use tokio::{net::TcpListener, sync::broadcast, time};
use tokio_rustls::rustls::{ServerConfig as RustlsServerConfig, pki_types::CertificateDer};

use crate::{
    Blacklist, MailHandler,
    error::TlsError,
    proto::SmtpStream,
    session::{Session, SessionConfig},
};

/// Server configuration, typically deserialized from TOML.
///
/// TLS is enabled when both `tls_cert` and `tls_key` are present and
/// loadable; a load failure downgrades to cleartext-only with a warning
/// rather than refusing to start.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Bind address.
    #[serde(default = "default_ip")]
    pub ip: IpAddr,
    /// Hostname advertised in the greeting and EHLO reply.
    pub hostname: String,
    /// TCP port to listen on.
    pub port: u16,
    #[serde(default)]
    pub tls_cert: Option<PathBuf>,
    #[serde(default)]
    pub tls_key: Option<PathBuf>,
    /// Seconds between the shutdown signal (stop accepting) and the
    /// quit signal (terminate in-flight sessions).
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

const fn default_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_grace_period() -> u64 {
    10
}

/// An MTA server: owns the shutdown channel and the per-session context.
pub struct Server {
    config: Config,
    session_config: SessionConfig,
    signal: broadcast::Sender<Signal>,
}

impl Server {
    /// Creates a server that hands every received mail to `handler`.
    #[must_use]
    pub fn new(config: Config, handler: Arc<dyn MailHandler>) -> Self {
        let tls = match (config.tls_cert.as_deref(), config.tls_key.as_deref()) {
            (Some(cert), Some(key)) => match load_keypair(cert, key) {
                Ok(tls) => Some(Arc::new(tls)),
                Err(err) => {
                    tracing::warn!("Could not load TLS keypair, STARTTLS disabled: {err}");
                    None
                }
            },
            _ => None,
        };

        let (signal, _) = broadcast::channel(16);

        Self {
            session_config: SessionConfig {
                hostname: config.hostname.as_str().into(),
                tls,
                handler,
                blacklist: None,
            },
            config,
            signal,
        }
    }

    /// Screens connecting IPs before the greeting.
    #[must_use]
    pub fn with_blacklist(mut self, blacklist: Arc<dyn Blacklist>) -> Self {
        self.session_config.blacklist = Some(blacklist);
        self
    }

    /// Whether STARTTLS will be offered.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.session_config.tls.is_some()
    }

    /// A handle that can drive the two-phase shutdown from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> Shutdown {
        Shutdown {
            signal: self.signal.clone(),
            grace: Duration::from_secs(self.config.grace_period_secs),
        }
    }

    /// Binds `(ip, port)` and serves until shut down.
    ///
    /// # Errors
    /// Returns `ServerError` when the bind fails or the accept loop hits
    /// a non-transient error.
    pub async fn listen_and_serve(&self) -> Result<(), ServerError> {
        let address = format!("{}:{}", self.config.ip, self.config.port);
        let listener =
            TcpListener::bind((self.config.ip, self.config.port))
                .await
                .map_err(|source| ServerError::Bind { address, source })?;

        self.serve(listener).await
    }

    /// Serves on an already-bound listener. Returns only once every
    /// spawned session has completed.
    ///
    /// # Errors
    /// Returns `ServerError` on a non-transient accept failure; transient
    /// ones are logged and retried.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Listening on {addr}");
        }

        let mut shutdown = self.signal.subscribe();
        let mut sessions = Vec::new();

        let result = loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Err(broadcast::error::RecvError::Lagged(_))) {
                        continue;
                    }
                    tracing::info!(
                        "Listener received shutdown signal, no longer accepting connections"
                    );
                    break Ok(());
                }

                connection = listener.accept() => match connection {
                    Ok((stream, peer)) => {
                        let proto = SmtpStream::new(stream, peer.ip().to_string());
                        let session = Session::create(proto, self.session_config.clone());
                        let signal = self.signal.subscribe();

                        sessions.push(tokio::spawn(async move {
                            if let Err(err) = session.run(signal).await {
                                tracing::debug!("Session ended abnormally: {err}");
                            }
                        }));
                    }
                    Err(err) if is_transient(&err) => {
                        tracing::warn!("Accept error: {err}");
                    }
                    Err(err) => break Err(ServerError::Accept(err)),
                }
            }
        };

        // Stop accepting before draining; sessions run on until the quit
        // phase reaches them.
        drop(listener);

        tracing::info!("Waiting for {} open session(s) to close ...", sessions.len());
        join_all(sessions).await;

        result
    }
}

/// A cloneable handle onto the server's shutdown channel.
#[derive(Clone)]
pub struct Shutdown {
    signal: broadcast::Sender<Signal>,
    grace: Duration,
}

impl Shutdown {
    /// Runs the two-phase shutdown: stop accepting, wait out the grace
    /// period, then force-quit the remaining sessions.
    pub async fn stop(&self) {
        tracing::info!("Received stop command, sending shutdown signal ...");
        let _ = self.signal.send(Signal::Shutdown);

        tracing::info!(
            "Waiting a maximum of {} second(s) for sessions to finish ...",
            self.grace.as_secs()
        );
        time::sleep(self.grace).await;

        tracing::info!("Sending force quit signal ...");
        let _ = self.signal.send(Signal::Quit);
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Builds a rustls server config from a PEM certificate chain and
/// private key. `rustls_pemfile::private_key` handles every key format
/// we accept.
fn load_keypair(cert_path: &Path, key_path: &Path) -> Result<RustlsServerConfig, TlsError> {
    let cert_load = |source| TlsError::CertificateLoad {
        path: cert_path.display().to_string(),
        source,
    };
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path).map_err(cert_load)?))
            .collect::<io::Result<_>>()
            .map_err(cert_load)?;

    let key_load = |reason: String| TlsError::KeyLoad {
        path: key_path.display().to_string(),
        reason,
    };
    let key = rustls_pemfile::private_key(&mut BufReader::new(
        File::open(key_path).map_err(|err| key_load(err.to_string()))?,
    ))
    .map_err(|err| key_load(err.to_string()))?
    .ok_or_else(|| key_load("no private key found in file".to_string()))?;

    Ok(RustlsServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?)
}
