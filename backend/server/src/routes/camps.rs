use std::sync::Arc;

use axum::{Router, extract::State, routing::get};
use bank::{Camp, Role, models::NewCamp};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthUser, error::AppError, response::Reply, state::AppState, utils::Payload,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_camps).post(create_camp))
}

async fn list_camps(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
) -> Result<Reply<Vec<Camp>>, AppError> {
    Ok(Reply::list(state.database.camps().await))
}

async fn create_camp(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Payload(new): Payload<NewCamp>,
) -> Result<Reply<Camp>, AppError> {
    let organizer = auth.require_role(&[Role::Ngo, Role::Admin])?;

    let camp = Camp::plan(Uuid::new_v4(), organizer.id, new, Utc::now())?;
    let camp = state.database.insert_camp(camp).await;

    info!("Camp {} planned for {}", camp.title, camp.date);

    Ok(Reply::created(camp))
}
