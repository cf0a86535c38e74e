//! # Events
//!
//! Real-time notifications fanned out to WebSocket clients.
//!
//! - One tokio broadcast channel carries every dispatch, each socket filters by the rooms it joined
//! - Rooms: `user_<id>`, a role name, `request_<id>`; no rooms means everyone
//! - Fire and forget: with no subscribers the event is dropped, a lagging socket skips ahead
use std::{collections::HashSet, fmt, sync::Arc};

use bank::{BloodGroup, BloodRequest, Delivery, GeoPoint, Inventory, RequestStatus, Role};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Event {
    RequestCreated {
        request: BloodRequest,
    },
    UrgentRequestNotification {
        request: BloodRequest,
        blood_group: BloodGroup,
        location: Option<String>,
        timestamp: DateTime<Utc>,
    },
    RequestStatusChanged {
        request_id: Uuid,
        status: RequestStatus,
        updated_by: Uuid,
        assigned_to: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },
    DonorAvailabilityUpdate {
        donor_id: Uuid,
        is_available: bool,
        timestamp: DateTime<Utc>,
    },
    LocationUpdate {
        user_id: Uuid,
        location: GeoPoint,
        timestamp: DateTime<Utc>,
    },
    BloodBankInventoryUpdate {
        blood_bank_id: Uuid,
        inventory: Inventory,
        timestamp: DateTime<Utc>,
    },
    TransportLocationUpdate {
        transport_id: Uuid,
        location: GeoPoint,
        timestamp: DateTime<Utc>,
    },
    TransportTracking {
        transport_id: Uuid,
        request_id: Option<Uuid>,
        location: GeoPoint,
        timestamp: DateTime<Utc>,
    },
    DeliveryStatusChanged {
        delivery: Delivery,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn status_changed(request: &BloodRequest, updated_by: Uuid) -> Self {
        Event::RequestStatusChanged {
            request_id: request.id,
            status: request.status,
            updated_by,
            assigned_to: request.assigned_to,
            timestamp: Utc::now(),
        }
    }

    pub fn urgent(request: &BloodRequest) -> Self {
        Event::UrgentRequestNotification {
            request: request.clone(),
            blood_group: request.blood_group,
            location: request.location.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    User(Uuid),
    Role(Role),
    Request(Uuid),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(id) => write!(f, "user_{id}"),
            Room::Role(role) => f.write_str(role.as_str()),
            Room::Request(id) => write!(f, "request_{id}"),
        }
    }
}

#[derive(Debug)]
pub struct Dispatch {
    pub rooms: Vec<Room>,
    pub event: Event,
}

impl Dispatch {
    fn reaches(&self, joined: &HashSet<Room>) -> bool {
        self.rooms.is_empty() || self.rooms.iter().any(|room| joined.contains(room))
    }
}

pub struct EventHub {
    sender: broadcast::Sender<Arc<Dispatch>>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn to_all(&self, event: Event) {
        self.send(Dispatch {
            rooms: Vec::new(),
            event,
        });
    }

    pub fn to(&self, rooms: impl IntoIterator<Item = Room>, event: Event) {
        let rooms: Vec<Room> = rooms.into_iter().collect();
        if rooms.is_empty() {
            return;
        }

        self.send(Dispatch { rooms, event });
    }

    fn send(&self, dispatch: Dispatch) {
        if self.sender.send(Arc::new(dispatch)).is_err() {
            debug!("No sockets connected, event dropped");
        }
    }

    /// Request room plus the creator and assignee.
    pub fn request_changed(&self, request: &BloodRequest, updated_by: Uuid) {
        let rooms = [Room::Request(request.id), Room::User(request.created_by)]
            .into_iter()
            .chain(request.assigned_to.map(Room::User));

        self.to(rooms, Event::status_changed(request, updated_by));
    }

    pub fn transport_moved(&self, transport_id: Uuid, location: GeoPoint, request_id: Option<Uuid>) {
        let timestamp = Utc::now();

        if let Some(request_id) = request_id {
            self.to(
                [Room::Request(request_id)],
                Event::TransportLocationUpdate {
                    transport_id,
                    location,
                    timestamp,
                },
            );
        }

        self.to(
            [Room::Role(Role::BloodBank), Room::Role(Role::Admin)],
            Event::TransportTracking {
                transport_id,
                request_id,
                location,
                timestamp,
            },
        );
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            rooms: HashSet::new(),
        }
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<Arc<Dispatch>>,
    rooms: HashSet<Room>,
}

impl Subscription {
    pub fn join(&mut self, room: Room) {
        self.rooms.insert(room);
    }

    pub fn rooms(&self) -> &HashSet<Room> {
        &self.rooms
    }

    /// Next dispatch for a joined room, `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<Arc<Dispatch>> {
        loop {
            match self.receiver.recv().await {
                Ok(dispatch) if dispatch.reaches(&self.rooms) => return Some(dispatch),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Socket lagged behind, skipped {skipped} events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
