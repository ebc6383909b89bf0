#![deny(clippy::all)]

mod api;
mod audio;
mod config;
mod console;
mod controller;
mod error;
mod events;
mod push;
mod transcript;

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::Config::load().context("Failed to load configuration")?;
    let ws_url = config.ws_url().context("Failed to derive push URL")?;
    info!(base_url = %config.backend.base_url, "Starting intervox client");

    let api = Arc::new(api::BackendClient::new(&config).context("Failed to create HTTP client")?);
    let player = audio::SpeechPlayer::spawn(config.speech.volume.clamp(0.0, 1.0));

    let (cmd_tx, cmd_rx) = mpsc::channel::<controller::Command>(64);
    let (event_tx, _) = broadcast::channel::<events::UiEvent>(256);
    let (reconnect_tx, reconnect_rx) = mpsc::channel::<()>(1);

    // Startup diagnostics; logged only, no effect on session state
    let status_api = api.clone();
    tokio::spawn(async move {
        status_api.check_service_status().await;
    });

    let push_task = push::spawn_push_task(
        ws_url,
        config.reconnect.clone(),
        cmd_tx.clone(),
        reconnect_rx,
    );

    let session = controller::SessionController::new(
        config.clone(),
        api,
        player,
        cmd_tx.clone(),
        event_tx.clone(),
        reconnect_tx,
    );
    let controller_task = tokio::spawn(session.run(cmd_rx));

    console::run(cmd_tx, event_tx.subscribe(), &config).await?;

    push_task.abort();
    let _ = controller_task.await;
    Ok(())
}
