use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lottery_server::{config::Config, server::Server, store::CsvBetStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // connect tracing to stdout
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).context("invalid log level")?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::info!("starting with {:?}", config);

    let store = Arc::new(CsvBetStore::new(config.storage.clone()));
    let (server, shutdown) =
        Server::bind(&config.server_config(), store).context("failed to bind the listener")?;
    tracing::info!("server is listening on: {}", server.local_addr()?);

    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(signal) => tracing::info!("received {}", signal),
            Err(reason) => {
                tracing::error!("failed to listen for shutdown signals: {}", reason);
                return;
            }
        }

        shutdown.trigger();
    });

    server.run().await;

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = terminate.recv() => Ok("SIGTERM"),
        interrupted = tokio::signal::ctrl_c() => interrupted.map(|_| "SIGINT"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
