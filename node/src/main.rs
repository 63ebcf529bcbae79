// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Gossip Node
//!
//! Entry point for the `nova-node` binary. Parses CLI arguments, loads the
//! TOML settings file, initializes logging and metrics, and runs a
//! [`nova_protocol::GossipNode`] until a shutdown signal is received.

mod api;
mod cli;
mod logging;
mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use nova_protocol::{GossipNode, Settings};

use cli::NovaNodeCli;
use logging::LogFormat;
use metrics::{AdminState, NodeMetrics};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NovaNodeCli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let log_filter = format!("nova_node={level},nova_protocol={level},tower_http=info");
    let _guard = logging::init_logging_with_file(&log_filter, LogFormat::Pretty, cli.log_file.as_deref());

    let settings = Settings::from_toml_file(&cli.config)
        .with_context(|| format!("failed to load settings from {}", cli.config.display()))?;

    tracing::info!(
        config = %cli.config.display(),
        admin_address = %cli.admin_address,
        "starting nova-node"
    );

    let node = GossipNode::new(settings);
    let node_metrics = Arc::new(NodeMetrics::new());

    let admin_state = AdminState {
        metrics: Arc::clone(&node_metrics),
        node: Arc::clone(&node),
    };
    let admin_router = api::create_router(admin_state);
    let admin_listener = tokio::net::TcpListener::bind(&cli.admin_address)
        .await
        .with_context(|| format!("failed to bind admin listener on {}", cli.admin_address))?;
    tracing::info!("admin HTTP surface listening on {}", cli.admin_address);

    let run_node = Arc::clone(&node);
    let node_task = tokio::spawn(async move {
        if let Err(e) = run_node.run().await {
            tracing::error!("node run loop exited with error: {}", e);
        }
    });

    tokio::select! {
        res = axum::serve(admin_listener, admin_router) => {
            if let Err(e) = res {
                tracing::error!("admin HTTP server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    node.request_shutdown();
    let _ = node_task.await;

    tracing::info!("nova-node stopped");
    Ok(())
}

/// Resolves when either Ctrl+C or, on Unix, SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
