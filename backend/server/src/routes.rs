//! REST surface under `/api/v1`, plus `/ws` and `/healthz`.
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{
        HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::from_fn_with_state,
    routing::get,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span, warn};

use crate::{config::Config, rate_limiter::limit_requests, socket::ws_handler, state::AppState};

mod admin;
mod auth;
mod blood_banks;
mod camps;
mod donors;
mod inventory;
mod ngos;
mod requests;
mod transport;
mod users;

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/donors", donors::router())
        .nest("/requests", requests::router())
        .nest("/inventory", inventory::router())
        .nest("/blood-banks", blood_banks::router())
        .nest("/ngos", ngos::router())
        .nest("/transport", transport::router())
        .nest("/camps", camps::router())
        .nest("/admin", admin::router())
        .layer(from_fn_with_state(state.clone(), limit_requests));

    Router::new()
        .nest("/api/v1", api)
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(cors(&state.config))
        .with_state(state)
}

/// Path only. `/ws` carries the session token in its query string.
fn request_span(request: &Request<Body>) -> Span {
    info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
    )
}

async fn healthz() -> &'static str {
    "ok"
}

fn cors(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    match config.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin).allow_credentials(true),
        Err(e) => {
            warn!("Invalid FRONTEND_URL {}: {e}", config.frontend_url);
            cors
        }
    }
}
