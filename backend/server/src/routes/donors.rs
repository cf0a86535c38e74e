use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    routing::{get, put},
};
use bank::{BloodRequest, Role, User};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::users::{Availability, apply_availability};
use crate::{
    auth::AuthUser,
    error::AppError,
    events::Event,
    response::Reply,
    state::AppState,
    utils::{LocationInput, Params, PathId, Payload, parse_blood_group, search_area},
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/nearby", get(nearby_donors))
        .route("/history", get(history))
        .route("/availability", put(update_availability))
        .route("/location", put(update_location))
        .route("/{id}", get(donor))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NearbyQuery {
    lat: Option<f64>,
    lng: Option<f64>,
    radius: Option<f64>,
    blood_group: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NearbyDonor {
    #[serde(flatten)]
    donor: User,
    /// Kilometres.
    distance: f64,
    distance_in_meters: f64,
}

async fn nearby_donors(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Params(query): Params<NearbyQuery>,
) -> Result<Reply<Vec<NearbyDonor>>, AppError> {
    auth.require_role(&[Role::BloodBank, Role::Ngo, Role::Admin])?;

    let (origin, radius) = search_area(query.lat, query.lng, query.radius)?;

    let group = query
        .blood_group
        .as_deref()
        .map(parse_blood_group)
        .transpose()?;

    let donors: Vec<NearbyDonor> = state
        .database
        .nearby_donors(origin, radius, group, state.config.nearby_limit)
        .await
        .into_iter()
        .map(|(donor, meters)| NearbyDonor {
            donor,
            distance: meters / 1000.0,
            distance_in_meters: meters,
        })
        .collect();

    debug!("{} donors within {radius} km", donors.len());

    Ok(Reply::list(donors))
}

async fn history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Reply<Vec<BloodRequest>>, AppError> {
    let donor = auth.require_role(&[Role::Donor])?;

    Ok(Reply::list(state.database.donor_history(donor.id).await))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(availability): Payload<Availability>,
) -> Result<Reply<User>, AppError> {
    let donor = auth.require_role(&[Role::Donor])?;

    let donor = apply_availability(&state, donor.id, availability.is_available).await?;

    Ok(Reply::ok(donor))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(input): Payload<LocationInput>,
) -> Result<Reply<User>, AppError> {
    let user = auth.require_role(&[Role::Donor, Role::Transport])?;
    let location = input.point()?;

    if user.role == Role::Transport && state.database.transport(user.id).await.is_ok() {
        let transport = state.database.move_transport(user.id, location).await?;
        state.events.transport_moved(transport.id, location, None);
    }

    let user = state
        .database
        .update_user(user.id, |record| {
            record.user.location = Some(location);
            Ok(())
        })
        .await?;

    state.events.to_all(Event::LocationUpdate {
        user_id: user.id,
        location,
        timestamp: Utc::now(),
    });

    Ok(Reply::ok(user))
}

async fn donor(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    PathId(id): PathId<Uuid>,
) -> Result<Reply<User>, AppError> {
    let user = state
        .database
        .user(id)
        .await
        .ok()
        .filter(User::is_donor)
        .ok_or_else(|| AppError::not_found("Donor"))?;

    Ok(Reply::ok(user))
}
