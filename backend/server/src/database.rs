//! # Database
//!
//! Users, organisation profiles, requests, vehicles, deliveries and camps live in process memory
//! behind one `RwLock`.
//! Stock lives in an [`InventoryStore`], Redis when `REDIS_URL` is set.
//!
//! ## Reconciliation
//!
//! Accepting a request is a conditional update under the write lock: the first accept on an
//! open request assigns it, every later accept is recorded as superseded.
//!
//! A blood bank accept touches two stores, so it runs as:
//! 1. Reserve the units from the bank's stock, failing early when short
//! 2. Take the write lock and respond
//! 3. Lost the race, release the units again
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use bank::{
    BloodBank, BloodGroup, BloodRequest, Camp, Decision, Delivery, DeliveryStatus, GeoPoint, Ngo,
    RequestStatus, ResponderKind, ResponseOutcome, Role, Transport, TransportStatus, User,
    geo::nearest,
    profile::{NewBloodBank, NewNgo},
};
use chrono::{DateTime, Utc};
use redis::{
    Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    error::AppError,
    inventory::{InventoryStore, MemoryInventory},
};

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, AppError> {
    let config = ConnectionManagerConfig::new().set_number_of_retries(1);

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

/// Single use token, only its hash is kept.
#[derive(Debug, Clone)]
pub struct TokenSlot {
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenSlot {
    fn redeemable(&self, hash: &str, now: DateTime<Utc>) -> bool {
        self.hash == hash && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub password_hash: String,
    pub verification: Option<TokenSlot>,
    pub reset: Option<TokenSlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    Complete,
    Cancel,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub users: usize,
    pub users_by_role: BTreeMap<Role, usize>,
    pub requests_by_status: BTreeMap<RequestStatus, usize>,
    pub active_deliveries: usize,
    pub camps: usize,
    pub blood_banks: usize,
    pub verified_blood_banks: usize,
    pub ngos: usize,
    pub total_inventory_units: u64,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    emails: HashMap<String, Uuid>,
    requests: HashMap<Uuid, BloodRequest>,
    transports: HashMap<Uuid, Transport>,
    vehicles: HashMap<String, Uuid>,
    deliveries: HashMap<Uuid, Delivery>,
    camps: HashMap<Uuid, Camp>,
    blood_banks: HashMap<Uuid, BloodBank>,
    ngos: HashMap<Uuid, Ngo>,
    registrations: HashMap<String, Uuid>,
}

impl Tables {
    fn ngo(&self, id: Uuid) -> Option<Ngo> {
        let mut ngo = self.ngos.get(&id)?.clone();
        let organised = self.camps.values().filter(|camp| camp.organizer == id).count();
        ngo.total_campaigns = u32::try_from(organised).unwrap_or(u32::MAX);

        Some(ngo)
    }
}

pub struct Database {
    tables: RwLock<Tables>,
    inventory: Arc<dyn InventoryStore>,
}

fn newest_first<T>(items: &mut [T], created_at: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
}

impl Database {
    pub fn new(inventory: Arc<dyn InventoryStore>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            inventory,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryInventory::default()))
    }

    pub fn inventory(&self) -> &dyn InventoryStore {
        self.inventory.as_ref()
    }

    pub async fn insert_user(&self, record: UserRecord) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;

        if tables.emails.contains_key(&record.user.email) {
            return Err(AppError::validation("User already exists with that email"));
        }

        let user = record.user.clone();
        tables.emails.insert(user.email.clone(), user.id);
        tables.users.insert(user.id, record);

        Ok(user)
    }

    pub async fn user(&self, id: Uuid) -> Result<User, AppError> {
        self.tables
            .read()
            .await
            .users
            .get(&id)
            .map(|record| record.user.clone())
            .ok_or_else(|| AppError::not_found("User"))
    }

    /// User and password hash for a login attempt.
    pub async fn credentials(&self, email: &str) -> Option<(User, String)> {
        let tables = self.tables.read().await;
        let id = tables.emails.get(email)?;

        tables
            .users
            .get(id)
            .map(|record| (record.user.clone(), record.password_hash.clone()))
    }

    pub async fn users(&self, role: Option<Role>) -> Vec<User> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|record| role.is_none_or(|role| record.user.role == role))
            .map(|record| record.user.clone())
            .collect();

        newest_first(&mut users, |user| user.created_at);
        users
    }

    pub async fn update_user<F>(&self, id: Uuid, apply: F) -> Result<User, AppError>
    where
        F: FnOnce(&mut UserRecord) -> Result<(), AppError>,
    {
        let mut tables = self.tables.write().await;
        let record = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("User"))?;

        let mut updated = record.clone();
        apply(&mut updated)?;
        *record = updated;

        Ok(record.user.clone())
    }

    pub async fn set_reset_token(&self, email: &str, slot: TokenSlot) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        let id = *tables
            .emails
            .get(email)
            .ok_or_else(|| AppError::NotFound("No user found with that email".to_string()))?;
        let record = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("User"))?;

        record.reset = Some(slot);

        Ok(record.user.clone())
    }

    /// Marks the owner of a live verification token verified and burns the token.
    pub async fn verify_email(&self, hash: &str, now: DateTime<Utc>) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .users
            .values_mut()
            .find(|record| {
                record
                    .verification
                    .as_ref()
                    .is_some_and(|slot| slot.redeemable(hash, now))
            })
            .ok_or_else(|| AppError::validation("Invalid or expired verification token"))?;

        record.verification = None;
        record.user.verified = true;

        Ok(record.user.clone())
    }

    pub async fn reset_password(
        &self,
        hash: &str,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .users
            .values_mut()
            .find(|record| {
                record
                    .reset
                    .as_ref()
                    .is_some_and(|slot| slot.redeemable(hash, now))
            })
            .ok_or_else(|| AppError::validation("Invalid or expired reset token"))?;

        record.reset = None;
        record.password_hash = password_hash;

        Ok(record.user.clone())
    }

    /// Available, verified donors within `radius_km`, closest first.
    pub async fn nearby_donors(
        &self,
        origin: GeoPoint,
        radius_km: f64,
        group: Option<BloodGroup>,
        limit: usize,
    ) -> Vec<(User, f64)> {
        let tables = self.tables.read().await;
        let donors = tables
            .users
            .values()
            .map(|record| &record.user)
            .filter(|user| user.is_donor() && user.is_available && user.verified)
            .filter(|user| group.is_none_or(|group| user.blood_group == Some(group)))
            .cloned();

        nearest(origin, radius_km, donors, |user| user.location, limit)
    }

    pub async fn insert_request(&self, request: BloodRequest) -> BloodRequest {
        self.tables
            .write()
            .await
            .requests
            .insert(request.id, request.clone());

        request
    }

    pub async fn request(&self, id: Uuid) -> Result<BloodRequest, AppError> {
        self.tables
            .read()
            .await
            .requests
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Request"))
    }

    pub async fn requests(&self, status: Option<RequestStatus>) -> Vec<BloodRequest> {
        let tables = self.tables.read().await;
        let mut requests: Vec<BloodRequest> = tables
            .requests
            .values()
            .filter(|request| status.is_none_or(|status| request.status == status))
            .cloned()
            .collect();

        newest_first(&mut requests, |request| request.created_at);
        requests
    }

    /// Open requests a donor of `group` could serve, most urgent first.
    pub async fn open_requests(&self, group: Option<BloodGroup>) -> Vec<BloodRequest> {
        let mut requests = self.requests(Some(RequestStatus::Open)).await;
        requests.retain(|request| group.is_none_or(|group| request.accepts_donor(group)));

        // stable, so equal urgency stays newest first
        requests.sort_by_key(|request| std::cmp::Reverse(request.urgency));
        requests
    }

    pub async fn donor_history(&self, donor: Uuid) -> Vec<BloodRequest> {
        let tables = self.tables.read().await;
        let mut requests: Vec<BloodRequest> = tables
            .requests
            .values()
            .filter(|request| request.status.is_terminal() && request.assigned_to == Some(donor))
            .cloned()
            .collect();

        newest_first(&mut requests, |request| request.created_at);
        requests
    }

    pub async fn respond(
        &self,
        id: Uuid,
        responder: &User,
        decision: Decision,
    ) -> Result<(BloodRequest, ResponseOutcome), AppError> {
        let kind = responder.role.responder_kind().ok_or_else(AppError::forbidden)?;
        let current = self.request(id).await?;
        current.check_respondable(responder.id)?;

        if kind == ResponderKind::Donor && decision == Decision::Accept {
            let group = responder.blood_group.ok_or_else(|| {
                AppError::validation("Set your blood group before accepting requests")
            })?;
            if !current.accepts_donor(group) {
                return Err(AppError::validation(format!(
                    "Blood group {group} cannot donate to {}",
                    current.blood_group
                )));
            }
            if !responder.is_available {
                return Err(AppError::validation(
                    "Mark yourself available before accepting requests",
                ));
            }
        }

        let reserved = kind == ResponderKind::BloodBank
            && decision == Decision::Accept
            && current.status == RequestStatus::Open;

        if reserved {
            self.inventory
                .reserve(responder.id, current.blood_group, current.units)
                .await?;
        }

        let result = {
            let mut tables = self.tables.write().await;
            match tables.requests.get_mut(&id) {
                Some(request) => request
                    .respond(responder.id, kind, decision, Utc::now())
                    .map(|outcome| (request.clone(), outcome))
                    .map_err(AppError::from),
                None => Err(AppError::not_found("Request")),
            }
        };

        let assigned = matches!(result, Ok((_, ResponseOutcome::Assigned)));
        if reserved && !assigned {
            info!(
                "Bank {} lost request {id}, releasing {} units of {}",
                responder.id, current.units, current.blood_group
            );

            if let Err(e) = self
                .inventory
                .release(responder.id, current.blood_group, current.units)
                .await
            {
                error!("Failed to release reservation for request {id}: {e}");
            }
        }

        result
    }

    /// Completes or cancels. Cancelling returns a bank's reserved units and calls off the live
    /// delivery, which is handed back so its watchers can be told. Completing is refused while a
    /// delivery is still on the road.
    pub async fn close_request(
        &self,
        id: Uuid,
        actor: &User,
        closure: Closure,
    ) -> Result<(BloodRequest, Option<Delivery>), AppError> {
        let now = Utc::now();

        let (request, cancelled) = {
            let mut guard = self.tables.write().await;
            let tables = &mut *guard;
            let request = tables
                .requests
                .get_mut(&id)
                .ok_or_else(|| AppError::not_found("Request"))?;

            let allowed = actor.role == Role::Admin
                || match closure {
                    Closure::Complete => request.involves(actor.id),
                    Closure::Cancel => request.created_by == actor.id,
                };
            if !allowed {
                return Err(AppError::Forbidden(
                    "Not authorized to update this request".to_string(),
                ));
            }

            let live = tables
                .deliveries
                .values_mut()
                .find(|delivery| delivery.request_id == id && !delivery.status.is_terminal());

            let mut cancelled = None;
            match closure {
                Closure::Complete => {
                    if live.is_some() {
                        return Err(AppError::Conflict(
                            "Request has a delivery in progress".to_string(),
                        ));
                    }
                    request.complete(now)?;
                }
                Closure::Cancel => {
                    request.cancel(now)?;

                    if let Some(delivery) = live {
                        delivery.advance(DeliveryStatus::Cancelled, now)?;

                        if let Some(transport) = tables.transports.get_mut(&delivery.transport_id) {
                            transport.status = TransportStatus::Available;
                            transport.current_delivery = None;
                        }
                        cancelled = Some(delivery.clone());
                    }
                }
            }

            (request.clone(), cancelled)
        };

        if closure == Closure::Cancel && request.assignee_kind == Some(ResponderKind::BloodBank) {
            if let Some(bank_id) = request.assigned_to {
                self.inventory
                    .release(bank_id, request.blood_group, request.units)
                    .await?;
            }
        }

        Ok((request, cancelled))
    }

    pub async fn register_transport(&self, transport: Transport) -> Result<Transport, AppError> {
        let mut tables = self.tables.write().await;

        if tables.transports.contains_key(&transport.id) {
            return Err(AppError::validation("Transport already registered"));
        }
        if tables.vehicles.contains_key(&transport.vehicle_no) {
            return Err(AppError::validation("Vehicle number already registered"));
        }

        tables
            .vehicles
            .insert(transport.vehicle_no.clone(), transport.id);
        tables.transports.insert(transport.id, transport.clone());

        Ok(transport)
    }

    pub async fn transport(&self, id: Uuid) -> Result<Transport, AppError> {
        self.tables
            .read()
            .await
            .transports
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Transport"))
    }

    pub async fn transports(&self, status: Option<TransportStatus>) -> Vec<Transport> {
        let tables = self.tables.read().await;
        let mut transports: Vec<Transport> = tables
            .transports
            .values()
            .filter(|transport| status.is_none_or(|status| transport.status == status))
            .cloned()
            .collect();

        newest_first(&mut transports, |transport| transport.created_at);
        transports
    }

    /// Moves the vehicle and its owner together.
    pub async fn move_transport(&self, id: Uuid, location: GeoPoint) -> Result<Transport, AppError> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let transport = tables
            .transports
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Transport"))?;

        transport.location = Some(location);
        if let Some(record) = tables.users.get_mut(&id) {
            record.user.location = Some(location);
        }

        Ok(transport.clone())
    }

    pub async fn assign_delivery(
        &self,
        request_id: Uuid,
        transport_id: Uuid,
        assigned_by: Uuid,
        estimated_delivery: Option<DateTime<Utc>>,
    ) -> Result<Delivery, AppError> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        let request = tables
            .requests
            .get(&request_id)
            .ok_or_else(|| AppError::not_found("Request"))?;
        if request.status != RequestStatus::Assigned {
            return Err(AppError::Conflict(
                "Only assigned requests can be dispatched".to_string(),
            ));
        }
        if tables
            .deliveries
            .values()
            .any(|delivery| delivery.request_id == request_id && !delivery.status.is_terminal())
        {
            return Err(AppError::Conflict(
                "Request already has an active delivery".to_string(),
            ));
        }

        let transport = tables
            .transports
            .get_mut(&transport_id)
            .ok_or_else(|| AppError::not_found("Transport"))?;
        if transport.status != TransportStatus::Available {
            return Err(AppError::Conflict("Transport is not available".to_string()));
        }

        let delivery = Delivery::assign(
            Uuid::new_v4(),
            request_id,
            transport_id,
            assigned_by,
            estimated_delivery,
            Utc::now(),
        );

        transport.status = TransportStatus::OnDuty;
        transport.current_delivery = Some(delivery.id);
        tables.deliveries.insert(delivery.id, delivery.clone());

        Ok(delivery)
    }

    pub async fn delivery(&self, id: Uuid) -> Result<Delivery, AppError> {
        self.tables
            .read()
            .await
            .deliveries
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Delivery"))
    }

    pub async fn deliveries_for(&self, transport_id: Uuid) -> Vec<Delivery> {
        let tables = self.tables.read().await;
        let mut deliveries: Vec<Delivery> = tables
            .deliveries
            .values()
            .filter(|delivery| delivery.transport_id == transport_id)
            .cloned()
            .collect();

        newest_first(&mut deliveries, |delivery| delivery.assigned_at);
        deliveries
    }

    /// One step forward. Delivered completes the request and frees the vehicle.
    pub async fn advance_delivery(
        &self,
        id: Uuid,
        actor: &User,
        status: DeliveryStatus,
    ) -> Result<(Delivery, BloodRequest), AppError> {
        let now = Utc::now();
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        let delivery = tables
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Delivery"))?;
        if actor.role != Role::Admin && delivery.transport_id != actor.id {
            return Err(AppError::Forbidden(
                "Not authorized to update this delivery".to_string(),
            ));
        }

        delivery.advance(status, now)?;
        let delivery = delivery.clone();

        if status.is_terminal() {
            if let Some(transport) = tables.transports.get_mut(&delivery.transport_id) {
                transport.status = TransportStatus::Available;
                transport.current_delivery = None;
                if status == DeliveryStatus::Delivered {
                    transport.completed_deliveries += 1;
                }
            }
        }

        let request = tables
            .requests
            .get_mut(&delivery.request_id)
            .ok_or_else(|| AppError::not_found("Request"))?;
        if status == DeliveryStatus::Delivered && request.status == RequestStatus::Assigned {
            request.complete(now)?;
        }

        Ok((delivery, request.clone()))
    }

    pub async fn insert_camp(&self, camp: Camp) -> Camp {
        self.tables
            .write()
            .await
            .camps
            .insert(camp.id, camp.clone());

        camp
    }

    /// Soonest first.
    pub async fn camps(&self) -> Vec<Camp> {
        let tables = self.tables.read().await;
        let mut camps: Vec<Camp> = tables.camps.values().cloned().collect();

        camps.sort_by_key(|camp| camp.date);
        camps
    }

    /// Creates or replaces the owner's profile. A capacity change goes to the stock store first,
    /// which refuses one below the units on hand.
    pub async fn save_blood_bank(&self, owner: Uuid, new: NewBloodBank) -> Result<BloodBank, AppError> {
        let mut tables = self.tables.write().await;
        let previous = tables.blood_banks.get(&owner);
        let profile = BloodBank::profile(owner, new, previous, Utc::now())?;

        if previous.is_none_or(|bank| bank.storage_capacity != profile.storage_capacity) {
            self.inventory
                .set_capacity(owner, profile.storage_capacity)
                .await?;
        }

        tables.blood_banks.insert(owner, profile.clone());

        Ok(profile)
    }

    pub async fn blood_bank(&self, id: Uuid) -> Result<BloodBank, AppError> {
        self.tables
            .read()
            .await
            .blood_banks
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Blood bank"))
    }

    /// By name.
    pub async fn blood_banks(&self, verified: Option<bool>) -> Vec<BloodBank> {
        let tables = self.tables.read().await;
        let mut banks: Vec<BloodBank> = tables
            .blood_banks
            .values()
            .filter(|bank| verified.is_none_or(|verified| bank.verified == verified))
            .cloned()
            .collect();

        banks.sort_by(|a, b| a.name.cmp(&b.name));
        banks
    }

    pub async fn nearby_blood_banks(
        &self,
        origin: GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Vec<(BloodBank, f64)> {
        let tables = self.tables.read().await;
        let banks = tables.blood_banks.values().cloned();

        nearest(origin, radius_km, banks, |bank| bank.location, limit)
    }

    pub async fn verify_blood_bank(&self, id: Uuid, verified: bool) -> Result<BloodBank, AppError> {
        let mut tables = self.tables.write().await;
        let bank = tables
            .blood_banks
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Blood bank"))?;

        bank.verified = verified;
        bank.updated_at = Utc::now();

        Ok(bank.clone())
    }

    /// Registration numbers are unique across NGOs.
    pub async fn save_ngo(&self, owner: Uuid, new: NewNgo) -> Result<Ngo, AppError> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let previous = tables.ngos.get(&owner);
        let profile = Ngo::profile(owner, new, previous, Utc::now())?;

        if let Some(&holder) = tables.registrations.get(&profile.registration_number) {
            if holder != owner {
                return Err(AppError::validation(
                    "Registration number already belongs to another NGO",
                ));
            }
        }

        if let Some(previous) = previous {
            if previous.registration_number != profile.registration_number {
                tables.registrations.remove(&previous.registration_number);
            }
        }

        tables
            .registrations
            .insert(profile.registration_number.clone(), owner);
        tables.ngos.insert(owner, profile);

        tables.ngo(owner).ok_or_else(|| AppError::not_found("NGO"))
    }

    pub async fn ngo(&self, id: Uuid) -> Result<Ngo, AppError> {
        self.tables
            .read()
            .await
            .ngo(id)
            .ok_or_else(|| AppError::not_found("NGO"))
    }

    /// By organisation name.
    pub async fn ngos(&self, verified: Option<bool>) -> Vec<Ngo> {
        let tables = self.tables.read().await;
        let mut ngos: Vec<Ngo> = tables
            .ngos
            .keys()
            .filter_map(|&id| tables.ngo(id))
            .filter(|ngo| verified.is_none_or(|verified| ngo.verified == verified))
            .collect();

        ngos.sort_by(|a, b| a.organization_name.cmp(&b.organization_name));
        ngos
    }

    pub async fn verify_ngo(&self, id: Uuid, verified: bool) -> Result<Ngo, AppError> {
        let mut tables = self.tables.write().await;
        let ngo = tables
            .ngos
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("NGO"))?;

        ngo.verified = verified;
        ngo.updated_at = Utc::now();

        tables.ngo(id).ok_or_else(|| AppError::not_found("NGO"))
    }

    pub async fn stats(&self) -> Result<Stats, AppError> {
        let total_inventory_units = self.inventory.total_units().await?;
        let tables = self.tables.read().await;

        let mut users_by_role = BTreeMap::new();
        for record in tables.users.values() {
            *users_by_role.entry(record.user.role).or_insert(0) += 1;
        }

        let mut requests_by_status = BTreeMap::new();
        for request in tables.requests.values() {
            *requests_by_status.entry(request.status).or_insert(0) += 1;
        }

        Ok(Stats {
            users: tables.users.len(),
            users_by_role,
            requests_by_status,
            active_deliveries: tables
                .deliveries
                .values()
                .filter(|delivery| !delivery.status.is_terminal())
                .count(),
            camps: tables.camps.len(),
            blood_banks: tables.blood_banks.len(),
            verified_blood_banks: tables.blood_banks.values().filter(|bank| bank.verified).count(),
            ngos: tables.ngos.len(),
            total_inventory_units,
        })
    }
}
