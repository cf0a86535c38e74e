use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub frontend_url: String,
    pub redis_url: Option<String>,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    /// Key rate limits on `x-forwarded-for` instead of the peer address.
    pub trust_proxy: bool,
    pub event_capacity: usize,
    pub nearby_limit: usize,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1111,
            jwt_secret: "insecure-development-secret".to_string(),
            jwt_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            frontend_url: "http://localhost:3000".to_string(),
            redis_url: None,
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(15 * 60),
            trust_proxy: false,
            event_capacity: 256,
            nearby_limit: 50,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let jwt_ttl_hours: u64 = try_load("JWT_EXPIRE_HOURS", "720")?;
        let rate_limit_window_secs: u64 = try_load("RATE_LIMIT_WINDOW_SECS", "900")?;
        let admin_email = var("ADMIN_EMAIL").ok();

        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            jwt_secret: read_secret("JWT_SECRET")?,
            jwt_ttl: Duration::from_secs(jwt_ttl_hours * 60 * 60),
            frontend_url: try_load("FRONTEND_URL", "http://localhost:3000")?,
            redis_url: var("REDIS_URL").ok(),
            rate_limit_max: try_load("RATE_LIMIT_MAX", "100")?,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            trust_proxy: try_load("TRUST_PROXY", "false")?,
            event_capacity: try_load("EVENT_CAPACITY", "256")?,
            nearby_limit: try_load("NEARBY_LIMIT", "50")?,
            admin_password: admin_email
                .as_ref()
                .and_then(|_| read_secret("ADMIN_PASSWORD").ok()),
            admin_email,
        })
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("Environment variable {key} not found");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| anyhow!("Invalid {key} value: {e}"))
}

/// Docker secret first, then the environment.
fn read_secret(secret_name: &str) -> Result<String> {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(secret) => Ok(secret.trim().to_string()),
        Err(e) => {
            warn!("Failed to read {secret_name} from file: {e}");

            env::var(secret_name)
                .map(|secret| secret.trim().to_string())
                .with_context(|| format!("{secret_name} missing from /run/secrets and environment"))
        }
    }
}
