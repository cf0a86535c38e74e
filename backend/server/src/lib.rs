//! Documentation of the LifeLink blood donation coordination service.
//!
//!
//!
//! # General Infrastructure
//! - Donors, blood banks, NGOs, transport agencies, beneficiaries and admins share one REST API
//! - `/api/v1/*` carries the REST surface, `/ws` the real-time channel, `/healthz` liveness
//! - State sits in process memory, blood bank stock optionally in Redis
//! - Blood banks and NGOs keep organisation profiles; admins verify them
//!
//!
//!
//! # Request Matching
//!
//! **Goal**: one blood request, many candidate responders, exactly one assignment.
//!
//! - A new request is broadcast to everyone, urgent ones also to the donor room
//! - Donors and blood banks answer accept or reject, once each
//! - The first accept to reach the store's write lock assigns the request
//! - Every later accept is kept as `superseded` and answered with 409
//! - A blood bank reserves its units before trying, and gets them back if it loses
//! - Assigned requests get a vehicle; delivering completes the request
//!
//!
//!
//! # Notes
//!
//! ## Memory + Redis
//! Users and requests change rarely and are read often, so a single `RwLock` over plain maps
//! is enough and keeps every multi-field update atomic. Stock is the hot counter: with
//! `REDIS_URL` set, each change is a Lua script, so concurrent increments, clamped decrements
//! and reservations are serialized by Redis itself.
//!
//! ## Rate Limiting
//! Token bucket per client on `/api/v1`, 100 requests per 15 minutes by default. Clients are
//! keyed by peer address; `TRUST_PROXY=true` switches to the rightmost `x-forwarded-for` entry
//! for deployments behind a reverse proxy. Idle buckets are dropped once per window.
//!
//!
//!
//! # Setup
//!
//! Run with logs.
//! ```sh
//! JWT_SECRET=change-me RUST_LOG=info cargo run -p lifelink
//! ```
//!
//! With Redis backed inventory.
//! ```sh
//! REDIS_URL=redis://localhost:6379 JWT_SECRET=change-me cargo run -p lifelink
//! ```
//!
//! Race concurrent accepts against a running server.
//! ```sh
//! cargo run -p tester -- --request <id> --token <jwt> --token <jwt>
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::net::SocketAddr;

use tokio::{
    net::TcpListener,
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod inventory;
pub mod rate_limiter;
pub mod response;
pub mod routes;
pub mod socket;
pub mod state;
pub mod utils;

pub use routes::router;

use config::Config;
use state::AppState;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    if let (Some(email), Some(password)) = (&state.config.admin_email, &state.config.admin_password) {
        if let Err(e) = auth::ensure_admin(&state, email, password).await {
            error!("Failed to create administrator: {e}");
        }
    }

    info!("Starting server...");
    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
