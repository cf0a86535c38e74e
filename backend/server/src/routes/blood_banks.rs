use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    routing::{get, put},
};
use bank::{BloodBank, Role, profile::NewBloodBank};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::AppError,
    response::Reply,
    state::AppState,
    utils::{Params, PathId, Payload, search_area},
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_blood_banks))
        .route("/nearby", get(nearby_blood_banks))
        .route("/profile", put(save_profile))
        .route("/{id}", get(blood_bank))
        .route("/{id}/verify", put(verify))
}

#[derive(Deserialize)]
pub(super) struct ListQuery {
    pub(super) verified: Option<bool>,
}

#[derive(Deserialize)]
struct NearbyQuery {
    lat: Option<f64>,
    lng: Option<f64>,
    radius: Option<f64>,
}

#[derive(Deserialize)]
pub(super) struct Verification {
    pub(super) verified: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NearbyBloodBank {
    #[serde(flatten)]
    blood_bank: BloodBank,
    /// Kilometres.
    distance: f64,
    distance_in_meters: f64,
}

async fn list_blood_banks(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Params(query): Params<ListQuery>,
) -> Result<Reply<Vec<BloodBank>>, AppError> {
    Ok(Reply::list(state.database.blood_banks(query.verified).await))
}

async fn nearby_blood_banks(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Params(query): Params<NearbyQuery>,
) -> Result<Reply<Vec<NearbyBloodBank>>, AppError> {
    let (origin, radius) = search_area(query.lat, query.lng, query.radius)?;

    let banks: Vec<NearbyBloodBank> = state
        .database
        .nearby_blood_banks(origin, radius, state.config.nearby_limit)
        .await
        .into_iter()
        .map(|(blood_bank, meters)| NearbyBloodBank {
            blood_bank,
            distance: meters / 1000.0,
            distance_in_meters: meters,
        })
        .collect();

    debug!("{} blood banks within {radius} km", banks.len());

    Ok(Reply::list(banks))
}

async fn blood_bank(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    PathId(id): PathId<Uuid>,
) -> Result<Reply<BloodBank>, AppError> {
    Ok(Reply::ok(state.database.blood_bank(id).await?))
}

async fn save_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(new): Payload<NewBloodBank>,
) -> Result<Reply<BloodBank>, AppError> {
    let owner = auth.require_role(&[Role::BloodBank])?;

    let profile = state.database.save_blood_bank(owner.id, new).await?;

    info!("Saved blood bank profile {} for {}", profile.name, owner.id);

    Ok(Reply::ok(profile))
}

async fn verify(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    PathId(id): PathId<Uuid>,
    Payload(verification): Payload<Verification>,
) -> Result<Reply<BloodBank>, AppError> {
    let admin = auth.require_role(&[Role::Admin])?;

    let profile = state
        .database
        .verify_blood_bank(id, verification.verified)
        .await?;

    info!("{} set blood bank {id} verified={}", admin.id, profile.verified);

    Ok(Reply::ok(profile))
}
