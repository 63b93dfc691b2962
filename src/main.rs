//! mc-tether - Minecraft bot session keeper with a Discord control message

use clap::Parser;
use mc_tether::status::{self, StatusState};
use mc_tether::{
    Config, ControlSurface, Controller, DiscordSurface, FileStateStore, ProcessSessionClient,
    Result, StateStore, Synchronizer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ACTION_BUFFER: usize = 32;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let log_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mc_tether={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Fatal error");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let target = config.target();
    tracing::info!(
        server = %target,
        username = %target.username,
        auth = %target.auth,
        "Starting mc-tether"
    );

    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(&config.secrets_file));
    let surface: Arc<dyn ControlSurface> = Arc::new(DiscordSurface::new(
        config.discord_token.clone(),
        config.channel_id.clone(),
    ));
    let client = Arc::new(ProcessSessionClient::new(config.session_command.clone()));
    let controller = Controller::spawn(client, target.clone());

    let (server_stop_tx, server_stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(status::serve(
        config.status_addr,
        StatusState::new(controller.subscribe(), target),
        async {
            let _ = server_stop_rx.await;
        },
    ));

    let (action_tx, action_rx) = mpsc::channel(ACTION_BUFFER);
    surface.start(action_tx).await?;

    let attached = tokio::select! {
        sync = Synchronizer::attach_with_retry(surface.clone(), store, controller.clone()) => Some(sync),
        _ = shutdown_signal() => None,
    };

    let sync_task = match attached {
        Some(sync) => {
            let task = tokio::spawn(sync.run(action_rx));
            if config.no_auto_connect {
                tracing::info!("Auto-connect disabled, waiting for the connect button");
            } else {
                controller.connect().await?;
            }
            shutdown_signal().await;
            Some(task)
        }
        None => None,
    };

    tracing::info!("Shutting down...");
    if let Err(e) = controller.shutdown().await {
        tracing::debug!(error = %e, "Controller already stopped");
    }
    if let Some(task) = sync_task {
        if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
            tracing::warn!("Timed out rendering the final state");
        }
    }
    if let Err(e) = surface.stop().await {
        tracing::warn!(error = %e, "Failed to stop control surface");
    }

    let _ = server_stop_tx.send(());
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Status server failed"),
        Err(e) => tracing::warn!(error = %e, "Status server task panicked"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
