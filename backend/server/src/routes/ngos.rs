use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    routing::{get, put},
};
use bank::{Ngo, Role, profile::NewNgo};
use tracing::info;
use uuid::Uuid;

use super::blood_banks::{ListQuery, Verification};
use crate::{
    auth::AuthUser,
    error::AppError,
    response::Reply,
    state::AppState,
    utils::{Params, PathId, Payload},
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_ngos))
        .route("/profile", put(save_profile))
        .route("/{id}", get(ngo))
        .route("/{id}/verify", put(verify))
}

async fn list_ngos(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Params(query): Params<ListQuery>,
) -> Result<Reply<Vec<Ngo>>, AppError> {
    Ok(Reply::list(state.database.ngos(query.verified).await))
}

async fn ngo(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    PathId(id): PathId<Uuid>,
) -> Result<Reply<Ngo>, AppError> {
    Ok(Reply::ok(state.database.ngo(id).await?))
}

async fn save_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(new): Payload<NewNgo>,
) -> Result<Reply<Ngo>, AppError> {
    let owner = auth.require_role(&[Role::Ngo])?;

    let profile = state.database.save_ngo(owner.id, new).await?;

    info!(
        "Saved NGO profile {} ({}) for {}",
        profile.organization_name, profile.registration_number, owner.id
    );

    Ok(Reply::ok(profile))
}

async fn verify(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    PathId(id): PathId<Uuid>,
    Payload(verification): Payload<Verification>,
) -> Result<Reply<Ngo>, AppError> {
    let admin = auth.require_role(&[Role::Admin])?;

    let profile = state.database.verify_ngo(id, verification.verified).await?;

    info!("{} set NGO {id} verified={}", admin.id, profile.verified);

    Ok(Reply::ok(profile))
}
