use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use wordfall::Args;
use wordfall::prelude::*;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from(Args::parse());
    if let Err(e) = start(config).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}

async fn start(config: ServerConfig) -> Result<(), WordfallError> {
    match config.leaderboard_path.clone() {
        Some(path) => {
            tracing::info!(path = %path.display(), "persisting leaderboard to file");
            serve(config, Arc::new(FileLeaderboard::new(path))).await
        }
        None => {
            tracing::info!("leaderboard kept in memory");
            serve(config, Arc::new(MemoryLeaderboard::new())).await
        }
    }
}

async fn serve<S: LeaderboardSink>(config: ServerConfig, leaderboard: Arc<S>) -> Result<(), WordfallError> {
    let server = WordfallServer::builder()
        .config(config)
        .leaderboard(leaderboard)
        .build()
        .await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
