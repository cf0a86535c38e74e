//! # WebSocket
//!
//! `/ws?token=<jwt>` (or the usual header/cookie). A socket starts in its user and role rooms,
//! `join` adds a request room. Client messages are re-emitted from server state, never echoed.
//!
//! ```json
//! { "event": "join", "data": { "requestId": "..." } }
//! { "event": "updateTransportLocation", "data": { "location": { "lat": 12.9, "lng": 77.6 } } }
//! ```
use std::sync::Arc;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::HeaderMap,
    response::Response,
};
use bank::{GeoPoint, RequestStatus, Role, User};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::{authenticate, bearer_token},
    error::AppError,
    events::{Event, Room, Subscription},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SocketParams {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
enum ClientMessage {
    Join {
        user_id: Option<Uuid>,
        role: Option<Role>,
        request_id: Option<Uuid>,
    },
    UpdateTransportLocation {
        location: GeoPoint,
        request_id: Option<Uuid>,
    },
    DonorAvailability {
        is_available: bool,
    },
    RequestStatusUpdate {
        request_id: Uuid,
    },
    InventoryUpdate,
    UrgentRequest {
        request_id: Uuid,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SocketParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = params
        .token
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| AppError::Unauthorized("Not authorized to access this route".to_string()))?;
    let user = authenticate(&state, &token).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, user: User) {
    info!("Socket connected for {} ({})", user.id, user.role);

    let mut subscription = state.events.subscribe();
    subscription.join(Room::User(user.id));
    subscription.join(Room::Role(user.role));

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!("Socket error for {}: {e}", user.id);
                        break;
                    }
                };

                let outcome = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(message) => handle_message(&state, &user, &mut subscription, message).await,
                    Err(e) => Err(AppError::MalformedPayload(e.to_string())),
                };

                if let Err(e) = outcome {
                    let reply = json!({ "event": "error", "data": { "message": e.to_string() } });
                    if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                        break;
                    }
                }
            }
            dispatch = subscription.next() => {
                let Some(dispatch) = dispatch else {
                    break;
                };

                let text = match serde_json::to_string(&dispatch.event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize event: {e}");
                        continue;
                    }
                };

                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("Socket closed for {}", user.id);
}

async fn handle_message(
    state: &AppState,
    user: &User,
    subscription: &mut Subscription,
    message: ClientMessage,
) -> Result<(), AppError> {
    match message {
        ClientMessage::Join {
            user_id,
            role,
            request_id,
        } => {
            if user_id.is_some_and(|id| id != user.id) || role.is_some_and(|role| role != user.role) {
                warn!("{} tried to join rooms of another account", user.id);
                return Err(AppError::forbidden());
            }

            if let Some(request_id) = request_id {
                state.database.request(request_id).await?;
                subscription.join(Room::Request(request_id));
            }

            debug!("{} joined {:?}", user.id, subscription.rooms());
        }
        ClientMessage::UpdateTransportLocation {
            location,
            request_id,
        } => {
            if user.role != Role::Transport {
                return Err(AppError::forbidden());
            }
            location.validate()?;

            let transport = state.database.move_transport(user.id, location).await?;
            state
                .events
                .transport_moved(transport.id, location, request_id);
        }
        ClientMessage::DonorAvailability { is_available } => {
            if !user.is_donor() {
                return Err(AppError::forbidden());
            }

            state
                .database
                .update_user(user.id, |record| {
                    record.user.is_available = is_available;
                    Ok(())
                })
                .await?;

            state.events.to_all(Event::DonorAvailabilityUpdate {
                donor_id: user.id,
                is_available,
                timestamp: Utc::now(),
            });
        }
        ClientMessage::RequestStatusUpdate { request_id } => {
            let request = state.database.request(request_id).await?;
            if user.role != Role::Admin && !request.involves(user.id) {
                return Err(AppError::forbidden());
            }

            state.events.request_changed(&request, user.id);
        }
        ClientMessage::InventoryUpdate => {
            if user.role != Role::BloodBank {
                return Err(AppError::forbidden());
            }

            let inventory = state.database.inventory().snapshot(user.id).await?;
            state.events.to_all(Event::BloodBankInventoryUpdate {
                blood_bank_id: user.id,
                inventory,
                timestamp: Utc::now(),
            });
        }
        ClientMessage::UrgentRequest { request_id } => {
            let request = state.database.request(request_id).await?;
            if user.role != Role::Admin && request.created_by != user.id {
                return Err(AppError::forbidden());
            }
            if request.status != RequestStatus::Open {
                return Err(AppError::Conflict(format!("Request is {}", request.status)));
            }

            state
                .events
                .to([Room::Role(Role::Donor)], Event::urgent(&request));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_shapes() {
        let join: ClientMessage = serde_json::from_str(
            r#"{"event":"join","data":{"requestId":"67e55044-10b1-426f-9247-bb680e5fe0c8"}}"#,
        )
        .unwrap();
        assert!(matches!(join, ClientMessage::Join { request_id: Some(_), user_id: None, .. }));

        let inventory: ClientMessage = serde_json::from_str(r#"{"event":"inventoryUpdate"}"#).unwrap();
        assert!(matches!(inventory, ClientMessage::InventoryUpdate));

        let availability: ClientMessage =
            serde_json::from_str(r#"{"event":"donorAvailability","data":{"isAvailable":false}}"#).unwrap();
        assert!(matches!(availability, ClientMessage::DonorAvailability { is_available: false }));
    }
}
