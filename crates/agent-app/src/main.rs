// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Entry point: wires the config store, spooler, local HTTP API, and
// remote client together in that fixed order, then waits for a shutdown
// signal and tears them down in reverse.

mod cli;
mod data_dir;
mod shutdown;

use std::sync::Arc;

use agent_core::config::ConfigStore;
use agent_remote::RemoteClient;
use agent_spooler::Spooler;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::shutdown::{spawn_ctrl_c_handler, ShutdownController, ShutdownEvent};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = cli::Cli::parse();
    let config_dir = cli.config_dir.unwrap_or_else(data_dir::data_dir);
    let temp_dir = config_dir.join("temp");
    if let Err(e) = std::fs::create_dir_all(&temp_dir) {
        warn!(error = %e, "could not create temp directory");
    }

    // 1. Config Store
    let config = Arc::new(ConfigStore::open(config_dir.join("config.json")));
    let port = config.snapshot().api_port;

    // 2. Spooler
    let spooler = Spooler::new(Arc::clone(&config), temp_dir);
    let dispatch_handle = spooler.spawn_dispatch_loop();

    // 3. Local HTTP API
    let app = agent_server::router(Arc::clone(&spooler));
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|e| panic!("could not bind local API on port {port}: {e}"));
    info!(port, "local API listening");
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "local API server exited");
        }
    });

    // 4. Remote Client
    let remote = RemoteClient::new(Arc::clone(&spooler), Arc::clone(&config));
    let remote_handles = remote.spawn();

    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel();
    spawn_ctrl_c_handler(Arc::new(ShutdownController::new()), shutdown_tx);

    match shutdown_rx.recv().await {
        Some(ShutdownEvent::Immediate) | None => {
            warn!("forced shutdown, exiting immediately");
            return;
        }
        Some(ShutdownEvent::Graceful) => {
            info!("shutting down");
        }
    }

    // Tear down in the reverse of startup order.
    remote.send_offline_heartbeat().await;
    for handle in remote_handles {
        handle.abort();
    }
    server_handle.abort();
    spooler.shutdown().await;
    dispatch_handle.abort();
}
