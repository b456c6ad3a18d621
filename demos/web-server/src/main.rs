//! Demo coordinator server wiring both transports together.
//!
//! Run with: cargo run -p web-server-demo
//!
//! Push agents connect to ws://HOST:PORT/ws/agent; polling agents use the
//! /v2 endpoints; callers drive agents through /api.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use sync_relay_core::{CoordinatorConfig, PushDelivery, RequestCoordinator, SessionRegistry};
use sync_relay_transport::{
    WsConnections,
    api::{self, ApiState},
    polling::{self, PollState},
    websocket::{self, WsState},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let host = env_or("HOST", "127.0.0.1");
    let port: u16 = env_or("PORT", "6032").parse()?;
    let public_base_url = env_or("PUBLIC_BASE_URL", &format!("http://{host}:{port}"));
    let timeout_secs: u64 = env_or("CLIENT_TIMEOUT_SECS", "60").parse()?;

    let registry = Arc::new(SessionRegistry::new());
    let connections = Arc::new(WsConnections::new());
    let coordinator = Arc::new(RequestCoordinator::new(
        Arc::clone(&registry),
        Arc::clone(&connections) as Arc<dyn PushDelivery>,
        CoordinatorConfig {
            public_base_url,
            default_timeout: Duration::from_secs(timeout_secs),
            ..CoordinatorConfig::default()
        },
    ));

    // Build router
    let app = axum::Router::new()
        .route("/", axum::routing::get(|| async { "sync-relay is running" }))
        .merge(websocket::router(WsState {
            registry: Arc::clone(&registry),
            coordinator: Arc::clone(&coordinator),
            connections: Arc::clone(&connections),
        }))
        .merge(polling::router(PollState {
            registry: Arc::clone(&registry),
            coordinator: Arc::clone(&coordinator),
            push: connections,
        }))
        .merge(api::router(ApiState {
            registry,
            coordinator,
        }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!("sync-relay listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
