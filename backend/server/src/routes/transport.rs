use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    routing::{get, post, put},
};
use bank::{
    Delivery, DeliveryStatus, Role, Transport, TransportStatus,
    transport::NewTransport,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::AppError,
    events::{Event, Room},
    response::Reply,
    state::AppState,
    utils::{LocationInput, Params, PathId, Payload},
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(register).get(list_transports))
        .route("/location", put(update_location))
        .route("/assignments", post(assign).get(my_assignments))
        .route("/assignments/{id}", get(assignment))
        .route("/assignments/{id}/status", put(update_status))
}

#[derive(Deserialize)]
struct TransportQuery {
    status: Option<TransportStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransportLocation {
    #[serde(flatten)]
    location: LocationInput,
    request_id: Option<Uuid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Assignment {
    request_id: Uuid,
    transport_id: Uuid,
    estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct StatusChange {
    status: DeliveryStatus,
}

async fn register(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(new): Payload<NewTransport>,
) -> Result<Reply<Transport>, AppError> {
    let owner = auth.require_role(&[Role::Transport])?;

    let transport = Transport::register(owner.id, new, Utc::now())?;
    let transport = state.database.register_transport(transport).await?;

    info!("Registered vehicle {} for {}", transport.vehicle_no, owner.id);

    Ok(Reply::created(transport))
}

async fn list_transports(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Params(query): Params<TransportQuery>,
) -> Result<Reply<Vec<Transport>>, AppError> {
    auth.require_role(&[Role::Admin, Role::BloodBank])?;

    Ok(Reply::list(state.database.transports(query.status).await))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(input): Payload<TransportLocation>,
) -> Result<Reply<Transport>, AppError> {
    let owner = auth.require_role(&[Role::Transport])?;
    let location = input.location.point()?;

    let transport = state.database.move_transport(owner.id, location).await?;
    state
        .events
        .transport_moved(transport.id, location, input.request_id);

    Ok(Reply::ok(transport))
}

pub(super) fn delivery_changed(state: &AppState, delivery: &Delivery, requester: Option<Uuid>) {
    let rooms = [
        Room::Request(delivery.request_id),
        Room::User(delivery.transport_id),
        Room::Role(Role::Admin),
    ]
    .into_iter()
    .chain(requester.map(Room::User));

    state.events.to(
        rooms,
        Event::DeliveryStatusChanged {
            delivery: delivery.clone(),
            timestamp: Utc::now(),
        },
    );
}

async fn assign(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(assignment): Payload<Assignment>,
) -> Result<Reply<Delivery>, AppError> {
    let user = auth.require_role(&[Role::BloodBank, Role::Admin])?;

    let delivery = state
        .database
        .assign_delivery(
            assignment.request_id,
            assignment.transport_id,
            user.id,
            assignment.estimated_delivery,
        )
        .await?;

    info!(
        "Delivery {} for request {} dispatched to {}",
        delivery.id, delivery.request_id, delivery.transport_id
    );

    let requester = state
        .database
        .request(delivery.request_id)
        .await
        .ok()
        .map(|request| request.created_by);
    delivery_changed(&state, &delivery, requester);

    Ok(Reply::created(delivery))
}

async fn my_assignments(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Reply<Vec<Delivery>>, AppError> {
    let owner = auth.require_role(&[Role::Transport])?;

    Ok(Reply::list(state.database.deliveries_for(owner.id).await))
}

async fn assignment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    PathId(id): PathId<Uuid>,
) -> Result<Reply<Delivery>, AppError> {
    let delivery = state.database.delivery(id).await?;

    let allowed = matches!(user.role, Role::Admin | Role::BloodBank)
        || delivery.transport_id == user.id
        || delivery.assigned_by == user.id;
    if !allowed {
        return Err(AppError::forbidden());
    }

    Ok(Reply::ok(delivery))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    PathId(id): PathId<Uuid>,
    Payload(change): Payload<StatusChange>,
) -> Result<Reply<Delivery>, AppError> {
    let (delivery, request) = state
        .database
        .advance_delivery(id, &user, change.status)
        .await?;

    info!("Delivery {id} is now {}", delivery.status);
    delivery_changed(&state, &delivery, Some(request.created_by));

    if delivery.status == DeliveryStatus::Delivered {
        state.events.request_changed(&request, user.id);
    }

    Ok(Reply::ok(delivery))
}
