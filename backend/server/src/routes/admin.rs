use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    routing::{get, put},
};
use bank::{Role, User};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    database::Stats,
    error::AppError,
    response::Reply,
    state::AppState,
    utils::PathId,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/{id}/verify", put(verify_user))
        .route("/stats", get(stats))
}

async fn verify_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    PathId(id): PathId<Uuid>,
) -> Result<Reply<User>, AppError> {
    let admin = auth.require_role(&[Role::Admin])?;

    let user = state
        .database
        .update_user(id, |record| {
            record.user.verified = true;
            record.verification = None;
            Ok(())
        })
        .await?;

    info!("{} verified {}", admin.id, user.email);

    Ok(Reply::ok(user).message("User verified"))
}

async fn stats(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Reply<Stats>, AppError> {
    auth.require_role(&[Role::Admin])?;

    Ok(Reply::ok(state.database.stats().await?))
}
