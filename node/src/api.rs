//! # Admin HTTP API
//!
//! Builds the axum router exposing the node's operational surface: a
//! liveness probe, a status summary, and the Prometheus scrape endpoint.
//!
//! ## Endpoints
//!
//! | Method | Path       | Description            |
//! |--------|------------|-------------------------|
//! | GET    | `/health`  | Liveness probe           |
//! | GET    | `/status`  | Peer-set and mesh summary |
//! | GET    | `/metrics` | Prometheus scrape target |

use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::{metrics_handler, AdminState};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct StatusResponse {
    version: &'static str,
    unverified_peers: usize,
    pull_peers: usize,
    push_peers: usize,
    pending_validations: usize,
    seen_messages: usize,
}

async fn status_handler(
    axum::extract::State(state): axum::extract::State<AdminState>,
) -> impl IntoResponse {
    let (unverified, pull, push) = state.node.mesh.peer_counts().await;
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        unverified_peers: unverified,
        pull_peers: pull,
        push_peers: push,
        pending_validations: state.node.dissemination.pending_count().await,
        seen_messages: state.node.dissemination.seen_count().await,
    })
}

/// Builds the admin router with health, status, and metrics routes.
pub fn create_router(state: AdminState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_protocol::{GossipNode, Settings};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_settings() -> Settings {
        Settings::from_toml_str(
            r#"
            cache_size = 8
            degree = 2
            min_connections = 1
            max_connections = 4
            search_cooldown = 60
            challenge_cooldown = 60
            bootstrapper = "127.0.0.1:9"
            p2p_address = "127.0.0.1:0"
            api_address = "127.0.0.1:0"
            known_peers = []
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let node = GossipNode::new(test_settings());
        let state = AdminState {
            metrics: Arc::new(crate::metrics::NodeMetrics::new()),
            node,
        };
        let router = create_router(state);
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reports_empty_mesh() {
        let node = GossipNode::new(test_settings());
        let state = AdminState {
            metrics: Arc::new(crate::metrics::NodeMetrics::new()),
            node,
        };
        let router = create_router(state);
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/status")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
