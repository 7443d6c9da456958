use std::sync::Arc;

use anyhow::Context;
use ferrymail_common::logging;
use ferrymail_smtp::{Config, MailHandler, Server, SessionState};

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

/// Logs every delivered envelope. Stands in for a real delivery
/// pipeline, which is out of scope for this server.
struct LogHandler;

impl MailHandler for LogHandler {
    fn handle_mail(&self, state: &SessionState) {
        let sender = state
            .from
            .as_ref()
            .map_or_else(|| "<>".to_string(), ToString::to_string);

        tracing::info!(
            "Session {}: received {} byte(s) from {} for {} recipient(s)",
            state.session_id,
            state.data.len(),
            sender,
            state.to.len()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./ferrymail.config.toml".to_string());
    let config: Config = toml::from_str(
        &std::fs::read_to_string(&path).with_context(|| format!("Unable to read {path}"))?,
    )
    .with_context(|| format!("Unable to parse {path}"))?;

    let server = Server::new(config, Arc::new(LogHandler));
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.stop().await;
        }
    });

    server.listen_and_serve().await?;

    tracing::info!("All sessions drained, shutting down");
    Ok(())
}
