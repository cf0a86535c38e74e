//! # Auth
//!
//! - Passwords: bcrypt, cost 10
//! - Sessions: HS256 JWT, read from `Authorization: Bearer` or the `token` cookie
//! - Verification and reset tokens are random, only their SHA-256 is kept
//! - Mail is out of scope, links are logged instead
use std::{sync::Arc, time::Duration};

use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap,
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
};
use bank::{
    BloodGroup, GeoPoint, Role, User,
    utils::{is_valid_email, normalize_email, sanitize_name},
};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::{
    database::{TokenSlot, UserRecord},
    error::AppError,
    state::AppState,
};

pub const TOKEN_COOKIE: &str = "token";
pub const MIN_PASSWORD_LEN: usize = 6;

const VERIFICATION_TTL_HOURS: i64 = 24;
const RESET_TTL_MINUTES: i64 = 10;

const BCRYPT_COST: u32 = 10;

/// bcrypt is CPU bound, so it runs off the async workers.
pub async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_string();

    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| AppError::InternalError(Box::new(e)))?
        .map_err(|e| AppError::InternalError(Box::new(e)))
}

pub async fn verify_password(password: &str, stored: &str) -> bool {
    let password = password.to_string();
    let stored = stored.to_string();

    tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored).unwrap_or(false))
        .await
        .unwrap_or(false)
}

pub fn hash_token(raw: &str) -> String {
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// Raw token for the link, slot for the store.
fn issue_slot(ttl: TimeDelta) -> (String, TokenSlot) {
    let raw = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let slot = TokenSlot {
        hash: hash_token(&raw),
        expires_at: Utc::now() + ttl,
    };

    (raw, slot)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Keys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user.id,
            role: user.role,
            iat: now,
            exp: now.saturating_add(ttl),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::InternalError(Box::new(e)))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| not_authorized())
    }
}

fn not_authorized() -> AppError {
    AppError::Unauthorized("Not authorized to access this route".to_string())
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".to_string())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|&(name, value)| name == TOKEN_COOKIE && !value.is_empty() && value != "none")
        .map(|(_, value)| value.to_string())
}

/// Resolves a session token to its current user.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims = state.keys.decode(token)?;

    state
        .database
        .user(claims.sub)
        .await
        .map_err(|_| not_authorized())
}

/// The signed in user, 401 without a valid session.
pub struct AuthUser(pub User);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(not_authorized)?;

        authenticate(state, &token).await.map(AuthUser)
    }
}

impl AuthUser {
    pub fn require_role(&self, roles: &[Role]) -> Result<&User, AppError> {
        if self.0.has_role(roles) {
            Ok(&self.0)
        } else {
            Err(AppError::Forbidden(format!(
                "User role {} is not authorized to access this route",
                self.0.role
            )))
        }
    }
}

fn check_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub blood_group: Option<BloodGroup>,
    pub medical_history: Option<String>,
    pub location: Option<GeoPoint>,
}

/// Creates an unverified account, returning it with the raw verification token.
pub async fn register(state: &AppState, registration: Registration) -> Result<(User, String), AppError> {
    let name = sanitize_name(&registration.name);
    let email = normalize_email(&registration.email);

    if name.is_empty() {
        return Err(AppError::validation("Please add a name"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::validation("Please add a valid email"));
    }
    check_password(&registration.password)?;

    let role = registration.role.unwrap_or(Role::Donor);
    if role == Role::Admin {
        return Err(AppError::Forbidden(
            "Admin accounts cannot be self-registered".to_string(),
        ));
    }

    let blood_group = match role {
        Role::Donor => Some(
            registration
                .blood_group
                .ok_or_else(|| AppError::validation("Donors must provide a blood group"))?,
        ),
        _ => None,
    };

    if let Some(location) = &registration.location {
        location.validate()?;
    }

    let (raw, slot) = issue_slot(TimeDelta::hours(VERIFICATION_TTL_HOURS));
    let user = User {
        id: Uuid::new_v4(),
        name,
        email,
        phone: registration.phone,
        role,
        blood_group,
        is_available: role == Role::Donor,
        location: registration.location,
        medical_history: registration.medical_history,
        verified: false,
        created_at: Utc::now(),
    };

    let user = state
        .database
        .insert_user(UserRecord {
            user,
            password_hash: hash_password(&registration.password).await?,
            verification: Some(slot),
            reset: None,
        })
        .await?;

    info!(
        "Verification link for {}: {}/verify-email/{raw}",
        user.email, state.config.frontend_url
    );

    Ok((user, raw))
}

/// Creates the configured administrator on first start.
pub async fn ensure_admin(state: &AppState, email: &str, password: &str) -> Result<(), AppError> {
    let email = normalize_email(email);
    if let Some((user, _)) = state.database.credentials(&email).await {
        if user.role != Role::Admin {
            return Err(AppError::Conflict(format!(
                "ADMIN_EMAIL {email} belongs to a {} account",
                user.role
            )));
        }
        return Ok(());
    }

    if !is_valid_email(&email) {
        return Err(AppError::validation("ADMIN_EMAIL is not a valid email"));
    }
    check_password(password)?;

    state
        .database
        .insert_user(UserRecord {
            user: User {
                id: Uuid::new_v4(),
                name: "Administrator".to_string(),
                email: email.clone(),
                phone: None,
                role: Role::Admin,
                blood_group: None,
                is_available: false,
                location: None,
                medical_history: None,
                verified: true,
                created_at: Utc::now(),
            },
            password_hash: hash_password(password).await?,
            verification: None,
            reset: None,
        })
        .await?;

    info!("Created administrator {email}");

    Ok(())
}

pub async fn login(state: &AppState, email: &str, password: &str) -> Result<(User, String), AppError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::validation("Please provide an email and password"));
    }

    let (user, password_hash) = state
        .database
        .credentials(&normalize_email(email))
        .await
        .ok_or_else(invalid_credentials)?;

    if !verify_password(password, &password_hash).await {
        return Err(invalid_credentials());
    }
    if !user.verified && user.role != Role::Admin {
        return Err(AppError::Unauthorized(
            "Please verify your email first".to_string(),
        ));
    }

    let token = state.keys.issue(&user)?;

    Ok((user, token))
}

pub async fn verify_email(state: &AppState, raw: &str) -> Result<(User, String), AppError> {
    let user = state
        .database
        .verify_email(&hash_token(raw), Utc::now())
        .await?;
    let token = state.keys.issue(&user)?;

    info!("Verified {}", user.email);

    Ok((user, token))
}

/// Issues a reset token, returning the raw value.
pub async fn forgot_password(state: &AppState, email: &str) -> Result<String, AppError> {
    let (raw, slot) = issue_slot(TimeDelta::minutes(RESET_TTL_MINUTES));
    let user = state
        .database
        .set_reset_token(&normalize_email(email), slot)
        .await?;

    info!(
        "Password reset link for {}: {}/reset-password/{raw}",
        user.email, state.config.frontend_url
    );

    Ok(raw)
}

pub async fn reset_password(state: &AppState, raw: &str, password: &str) -> Result<(User, String), AppError> {
    check_password(password)?;

    let user = state
        .database
        .reset_password(&hash_token(raw), hash_password(password).await?, Utc::now())
        .await?;
    let token = state.keys.issue(&user)?;

    Ok((user, token))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Details {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub medical_history: Option<String>,
    pub location: Option<GeoPoint>,
    pub blood_group: Option<BloodGroup>,
    pub is_available: Option<bool>,
}

/// Blood group and availability only apply to donors and are ignored otherwise.
pub async fn update_details(state: &AppState, id: Uuid, details: Details) -> Result<User, AppError> {
    if let Some(location) = &details.location {
        location.validate()?;
    }

    state
        .database
        .update_user(id, |record| {
            let user = &mut record.user;

            if let Some(name) = details.name {
                let name = sanitize_name(&name);
                if name.is_empty() {
                    return Err(AppError::validation("Name cannot be empty"));
                }
                user.name = name;
            }
            if let Some(phone) = details.phone {
                user.phone = Some(phone.trim().to_string());
            }
            if let Some(medical_history) = details.medical_history {
                user.medical_history = Some(medical_history);
            }
            if let Some(location) = details.location {
                user.location = Some(location);
            }
            if user.is_donor() {
                if let Some(blood_group) = details.blood_group {
                    user.blood_group = Some(blood_group);
                }
                if let Some(is_available) = details.is_available {
                    user.is_available = is_available;
                }
            }

            Ok(())
        })
        .await
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;
    use crate::config::Config;

    fn registration(email: &str, role: Option<Role>) -> Registration {
        Registration {
            name: "Asha  Rao".to_string(),
            email: email.to_string(),
            password: "secret123".to_string(),
            phone: None,
            role,
            blood_group: Some(BloodGroup::OPositive),
            medical_history: None,
            location: None,
        }
    }

    #[tokio::test]
    async fn test_password_hash_roundtrip() {
        let stored = hash_password("hunter22").await.unwrap();

        assert!(stored.starts_with("$2b$10$"));
        assert!(verify_password("hunter22", &stored).await);
        assert!(!verify_password("hunter23", &stored).await);
        assert_ne!(stored, hash_password("hunter22").await.unwrap());
        assert!(!verify_password("hunter22", "no-separator").await);
    }

    #[test]
    fn test_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; token=abc.def.ghi"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));

        headers.insert(COOKIE, HeaderValue::from_static("token=none"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_expired_jwt_rejected() {
        let keys = Keys::new("secret", Duration::from_secs(3600));
        let claims = Claims {
            sub: Uuid::new_v4(),
            role: Role::Donor,
            iat: 0,
            exp: 1,
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();

        assert!(keys.decode(&token).is_err());
        assert!(Keys::new("other", Duration::from_secs(60)).decode("garbage").is_err());
    }

    #[tokio::test]
    async fn test_register_verify_login() {
        let state = AppState::in_memory(Config::default());

        let (user, raw) = register(&state, registration("Asha@Example.com ", None))
            .await
            .unwrap();
        assert_eq!(user.email, "asha@example.com");
        assert_eq!(user.name, "Asha Rao");

        let err = login(&state, "asha@example.com", "secret123").await.unwrap_err();
        assert_eq!(err.to_string(), "Please verify your email first");

        verify_email(&state, &raw).await.unwrap();
        let (_, token) = login(&state, "ASHA@example.com", "secret123").await.unwrap();
        assert_eq!(state.keys.decode(&token).unwrap().sub, user.id);

        assert!(verify_email(&state, &raw).await.is_err());
        assert!(login(&state, "asha@example.com", "wrong-pass").await.is_err());
    }

    #[tokio::test]
    async fn test_register_rules() {
        let state = AppState::in_memory(Config::default());

        let err = register(&state, registration("root@example.com", Some(Role::Admin)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let (ngo, _) = register(&state, registration("ngo@example.com", Some(Role::Ngo)))
            .await
            .unwrap();
        assert_eq!(ngo.blood_group, None);

        let mut donor = registration("donor@example.com", None);
        donor.blood_group = None;
        assert!(register(&state, donor).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_bootstrap_and_reset() {
        let state = AppState::in_memory(Config::default());
        ensure_admin(&state, "admin@example.com", "adminpass").await.unwrap();
        ensure_admin(&state, "admin@example.com", "adminpass").await.unwrap();

        login(&state, "admin@example.com", "adminpass").await.unwrap();

        let raw = forgot_password(&state, "admin@example.com").await.unwrap();
        reset_password(&state, &raw, "newpass1").await.unwrap();

        assert!(login(&state, "admin@example.com", "adminpass").await.is_err());
        login(&state, "admin@example.com", "newpass1").await.unwrap();
    }

    #[tokio::test]
    async fn test_admin_email_taken_by_donor() {
        let state = AppState::in_memory(Config::default());
        register(&state, registration("admin@example.com", None))
            .await
            .unwrap();

        let err = ensure_admin(&state, "admin@example.com", "adminpass")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let (user, _) = state.database.credentials("admin@example.com").await.unwrap();
        assert_eq!(user.role, Role::Donor);
    }

    #[tokio::test]
    async fn test_unverified_admin_logs_in() {
        let state = AppState::in_memory(Config::default());
        let (raw, slot) = issue_slot(TimeDelta::hours(VERIFICATION_TTL_HOURS));
        assert!(!raw.is_empty());

        state
            .database
            .insert_user(UserRecord {
                user: User {
                    id: Uuid::new_v4(),
                    name: "Ops".to_string(),
                    email: "ops@example.com".to_string(),
                    phone: None,
                    role: Role::Admin,
                    blood_group: None,
                    is_available: false,
                    location: None,
                    medical_history: None,
                    verified: false,
                    created_at: Utc::now(),
                },
                password_hash: hash_password("opspass").await.unwrap(),
                verification: Some(slot),
                reset: None,
            })
            .await
            .unwrap();

        let (user, _) = login(&state, "ops@example.com", "opspass").await.unwrap();
        assert!(!user.verified);
    }
}
