use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    routing::{get, put},
};
use bank::{Role, User};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::{self, AuthUser, Details},
    error::AppError,
    events::Event,
    response::Reply,
    state::AppState,
    utils::{Params, PathId, Payload, ensure_self_or_admin, parse_blood_group},
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users))
        .route("/donors", get(list_donors))
        .route("/profile", put(update_profile))
        .route("/{id}/availability", put(set_availability))
}

#[derive(Deserialize)]
struct UserQuery {
    role: Option<Role>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DonorQuery {
    blood_group: Option<String>,
    available: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Availability {
    pub is_available: bool,
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Params(query): Params<UserQuery>,
) -> Result<Reply<Vec<User>>, AppError> {
    auth.require_role(&[Role::Admin])?;

    Ok(Reply::list(state.database.users(query.role).await))
}

async fn list_donors(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Params(query): Params<DonorQuery>,
) -> Result<Reply<Vec<User>>, AppError> {
    auth.require_role(&[Role::BloodBank, Role::Ngo, Role::Admin])?;

    let group = query
        .blood_group
        .as_deref()
        .map(parse_blood_group)
        .transpose()?;

    let mut donors = state.database.users(Some(Role::Donor)).await;
    donors.retain(|donor| {
        group.is_none_or(|group| donor.blood_group == Some(group))
            && query
                .available
                .is_none_or(|available| donor.is_available == available)
    });

    Ok(Reply::list(donors))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Payload(details): Payload<Details>,
) -> Result<Reply<User>, AppError> {
    let user = auth::update_details(&state, user.id, details).await?;

    Ok(Reply::ok(user).message("Profile updated"))
}

/// Shared with `PUT /donors/availability`.
pub(super) async fn apply_availability(
    state: &AppState,
    donor_id: Uuid,
    is_available: bool,
) -> Result<User, AppError> {
    let donor = state
        .database
        .update_user(donor_id, |record| {
            if !record.user.is_donor() {
                return Err(AppError::validation("Only donors have an availability"));
            }

            record.user.is_available = is_available;
            Ok(())
        })
        .await?;

    state.events.to_all(Event::DonorAvailabilityUpdate {
        donor_id,
        is_available,
        timestamp: Utc::now(),
    });

    Ok(donor)
}

async fn set_availability(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    PathId(id): PathId<Uuid>,
    Payload(availability): Payload<Availability>,
) -> Result<Reply<User>, AppError> {
    ensure_self_or_admin(&user, id)?;

    let donor = apply_availability(&state, id, availability.is_available).await?;

    Ok(Reply::ok(donor))
}
