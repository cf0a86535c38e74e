use std::sync::Arc;

use axum::{Router, extract::State, routing::get};
use bank::{BloodGroup, Inventory, Role, User};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::AppError,
    events::Event,
    response::Reply,
    state::AppState,
    utils::{Params, Payload},
};

const LOW_STOCK_THRESHOLD: u32 = 5;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(inventory).put(update_inventory))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BankQuery {
    bank_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Increase,
    Decrease,
}

fn default_units() -> u32 {
    1
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InventoryChange {
    blood_group: BloodGroup,
    action: Action,
    #[serde(default = "default_units")]
    units: u32,
}

/// Blood banks see their own stock, admins pick one with `?bankId=`.
fn target_bank(user: &User, bank_id: Option<Uuid>) -> Result<Uuid, AppError> {
    match user.role {
        Role::BloodBank => Ok(user.id),
        _ => bank_id.ok_or_else(|| AppError::validation("Please provide a bankId")),
    }
}

async fn inventory(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Params(query): Params<BankQuery>,
) -> Result<Reply<Inventory>, AppError> {
    let user = auth.require_role(&[Role::BloodBank, Role::Admin])?;
    let bank_id = target_bank(user, query.bank_id)?;

    Ok(Reply::ok(state.database.inventory().snapshot(bank_id).await?))
}

async fn update_inventory(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Params(query): Params<BankQuery>,
    Payload(change): Payload<InventoryChange>,
) -> Result<Reply<Inventory>, AppError> {
    let user = auth.require_role(&[Role::BloodBank, Role::Admin])?;
    let bank_id = target_bank(user, query.bank_id)?;

    if change.units == 0 {
        return Err(AppError::validation("Units must be at least 1"));
    }

    let store = state.database.inventory();
    let inventory = match change.action {
        Action::Increase => store.increment(bank_id, change.blood_group, change.units).await?,
        Action::Decrease => store.decrement(bank_id, change.blood_group, change.units).await?,
    };

    info!(
        "Bank {bank_id} {:?} {} units of {}, now {}",
        change.action,
        change.units,
        change.blood_group,
        inventory.units(change.blood_group)
    );
    if inventory.low_stock(LOW_STOCK_THRESHOLD).contains(&change.blood_group) {
        warn!("Bank {bank_id} is low on {}", change.blood_group);
    }

    state.events.to_all(Event::BloodBankInventoryUpdate {
        blood_bank_id: bank_id,
        inventory: inventory.clone(),
        timestamp: Utc::now(),
    });

    Ok(Reply::ok(inventory).message("Inventory updated"))
}
