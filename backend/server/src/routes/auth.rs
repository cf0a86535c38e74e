use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    routing::{get, post, put},
};
use bank::User;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    auth::{self, AuthUser, Details, Registration},
    error::AppError,
    response::Reply,
    state::AppState,
    utils::{PathId, Payload},
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/me", get(me))
        .route("/verifyemail/{token}", get(verify_email))
        .route("/forgotpassword", post(forgot_password))
        .route("/resetpassword/{token}", put(reset_password))
        .route("/updatedetails", put(update_details))
}

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct Forgot {
    email: String,
}

#[derive(Deserialize)]
struct NewPassword {
    password: String,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Payload(registration): Payload<Registration>,
) -> Result<Reply<User>, AppError> {
    let (user, _) = auth::register(&state, registration).await?;

    Ok(Reply::created(user)
        .message("Registration successful, check your email to verify your account"))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Payload(credentials): Payload<Credentials>,
) -> Result<Reply<User>, AppError> {
    let (user, token) = auth::login(&state, &credentials.email, &credentials.password).await?;

    Ok(Reply::ok(user).session(token, state.keys.ttl()))
}

async fn logout() -> Reply<Value> {
    Reply::ok(json!({})).end_session()
}

async fn me(AuthUser(user): AuthUser) -> Reply<User> {
    Reply::ok(user)
}

async fn verify_email(
    State(state): State<Arc<AppState>>,
    PathId(token): PathId<String>,
) -> Result<Reply<User>, AppError> {
    let (user, token) = auth::verify_email(&state, &token).await?;

    Ok(Reply::ok(user)
        .session(token, state.keys.ttl())
        .message("Email verified"))
}

async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Payload(forgot): Payload<Forgot>,
) -> Result<Reply<Value>, AppError> {
    auth::forgot_password(&state, &forgot.email).await?;

    Ok(Reply::ok(json!({})).message("Password reset link sent"))
}

async fn reset_password(
    State(state): State<Arc<AppState>>,
    PathId(token): PathId<String>,
    Payload(new_password): Payload<NewPassword>,
) -> Result<Reply<User>, AppError> {
    let (user, token) = auth::reset_password(&state, &token, &new_password.password).await?;

    Ok(Reply::ok(user).session(token, state.keys.ttl()))
}

async fn update_details(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Payload(details): Payload<Details>,
) -> Result<Reply<User>, AppError> {
    let user = auth::update_details(&state, user.id, details).await?;

    Ok(Reply::ok(user))
}
