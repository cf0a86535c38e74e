use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    routing::{get, put},
};
use bank::{
    BloodRequest, Decision, RequestStatus, ResponderKind, ResponseOutcome, Role, User,
    request::NewRequest,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::transport;
use crate::{
    auth::AuthUser,
    database::Closure,
    error::AppError,
    events::{Event, Room},
    response::Reply,
    state::AppState,
    utils::{Params, PathId, Payload},
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/nearby", get(nearby_requests))
        .route("/{id}", get(request))
        .route("/{id}/respond", put(respond))
        .route("/{id}/accept", put(accept))
        .route("/{id}/complete", put(complete))
        .route("/{id}/cancel", put(cancel))
}

const RESPONDERS: [Role; 2] = [Role::Donor, Role::BloodBank];

#[derive(Deserialize)]
struct RequestQuery {
    status: Option<RequestStatus>,
}

#[derive(Deserialize)]
struct RespondInput {
    decision: Decision,
}

async fn list_requests(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Params(query): Params<RequestQuery>,
) -> Result<Reply<Vec<BloodRequest>>, AppError> {
    Ok(Reply::list(state.database.requests(query.status).await))
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(new): Payload<NewRequest>,
) -> Result<Reply<BloodRequest>, AppError> {
    let user = auth.require_role(&[Role::Beneficiary, Role::Donor, Role::Admin])?;

    let request = BloodRequest::open(Uuid::new_v4(), user.id, new, Utc::now())?;
    let request = state.database.insert_request(request).await;

    info!(
        "Request {} opened for {} units of {} ({:?})",
        request.id, request.units, request.blood_group, request.urgency
    );

    state.events.to_all(Event::RequestCreated {
        request: request.clone(),
    });
    if request.urgency.is_urgent() {
        state
            .events
            .to([Room::Role(Role::Donor)], Event::urgent(&request));
    }

    Ok(Reply::created(request))
}

/// Open requests, for donors only the ones their blood group can serve.
async fn nearby_requests(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Reply<Vec<BloodRequest>>, AppError> {
    let group = if user.is_donor() { user.blood_group } else { None };

    Ok(Reply::list(state.database.open_requests(group).await))
}

async fn request(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    PathId(id): PathId<Uuid>,
) -> Result<Reply<BloodRequest>, AppError> {
    Ok(Reply::ok(state.database.request(id).await?))
}

/// Lost races answer 409, the superseded response stays on record.
async fn answer(
    state: &AppState,
    responder: &User,
    id: Uuid,
    decision: Decision,
) -> Result<Reply<BloodRequest>, AppError> {
    let (request, outcome) = state.database.respond(id, responder, decision).await?;

    match outcome {
        ResponseOutcome::Assigned => {
            info!("Request {id} assigned to {}", responder.id);
            state.events.request_changed(&request, responder.id);

            if request.assignee_kind == Some(ResponderKind::BloodBank) {
                let inventory = state.database.inventory().snapshot(responder.id).await?;
                state.events.to_all(Event::BloodBankInventoryUpdate {
                    blood_bank_id: responder.id,
                    inventory,
                    timestamp: Utc::now(),
                });
            }

            Ok(Reply::ok(request).message("Request accepted"))
        }
        ResponseOutcome::Declined => Ok(Reply::ok(request).message("Response recorded")),
        ResponseOutcome::Superseded => {
            info!("{} lost the race for request {id}", responder.id);
            Err(bank::Error::AlreadyAssigned.into())
        }
    }
}

async fn respond(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    PathId(id): PathId<Uuid>,
    Payload(input): Payload<RespondInput>,
) -> Result<Reply<BloodRequest>, AppError> {
    let responder = auth.require_role(&RESPONDERS)?;

    answer(&state, responder, id, input.decision).await
}

async fn accept(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    PathId(id): PathId<Uuid>,
) -> Result<Reply<BloodRequest>, AppError> {
    let responder = auth.require_role(&RESPONDERS)?;

    answer(&state, responder, id, Decision::Accept).await
}

async fn close(
    state: &AppState,
    user: &User,
    id: Uuid,
    closure: Closure,
) -> Result<Reply<BloodRequest>, AppError> {
    let (request, cancelled) = state.database.close_request(id, user, closure).await?;

    info!("Request {id} is now {}", request.status);
    state.events.request_changed(&request, user.id);

    if let Some(delivery) = &cancelled {
        info!("Delivery {} called off with request {id}", delivery.id);
        transport::delivery_changed(state, delivery, Some(request.created_by));
    }

    if closure == Closure::Cancel && request.assignee_kind == Some(ResponderKind::BloodBank) {
        if let Some(bank_id) = request.assigned_to {
            let inventory = state.database.inventory().snapshot(bank_id).await?;
            state.events.to_all(Event::BloodBankInventoryUpdate {
                blood_bank_id: bank_id,
                inventory,
                timestamp: Utc::now(),
            });
        }
    }

    Ok(Reply::ok(request))
}

async fn complete(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    PathId(id): PathId<Uuid>,
) -> Result<Reply<BloodRequest>, AppError> {
    close(&state, &user, id, Closure::Complete).await
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    PathId(id): PathId<Uuid>,
) -> Result<Reply<BloodRequest>, AppError> {
    close(&state, &user, id, Closure::Cancel).await
}
