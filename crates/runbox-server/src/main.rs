//! HTTP frontend for the runbox execution engine.
//!
//! Binds the two execution endpoints and a health probe, connects to the
//! container daemon from the ambient environment, and serves until ctrl-c.

mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use tokio::net::TcpListener;

use runbox_core::{DockerClient, Engine, LangRunner, NotebookRunner};

use routes::AppState;

#[derive(Parser, Debug)]
#[clap(author, version, about = "runbox - code execution sandbox service")]
struct Cli {
    #[clap(long, default_value = "0.0.0.0:8080")]
    bind_addr: String,

    #[clap(long, short, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let docker = DockerClient::connect()
        .await
        .context("connecting to the container daemon")?;
    let engine = Arc::new(Engine::new(Arc::new(docker)));
    let state = Arc::new(AppState {
        lang: LangRunner::new(engine.clone()),
        notebook: NotebookRunner::new(engine),
    });

    let listener = TcpListener::bind(&cli.bind_addr)
        .await
        .with_context(|| format!("binding {}", cli.bind_addr))?;
    log::info!("listening on {}", cli.bind_addr);

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        log::warn!("failed to install ctrl-c handler");
    }
}
