use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

struct Buckets {
    clients: HashMap<String, Bucket>,
    last_sweep: Instant,
}

/// Token bucket per client, `capacity` requests refilled over `window`.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    window: Duration,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        let window = window.max(Duration::from_secs(1));

        Self {
            capacity,
            refill_per_sec: capacity / window.as_secs_f64(),
            window,
            buckets: Mutex::new(Buckets {
                clients: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut lock = self.buckets.lock().await;

        // Idle for a whole window means full again.
        if now.duration_since(lock.last_sweep) >= self.window {
            let before = lock.clients.len();
            lock.clients
                .retain(|_, bucket| now.duration_since(bucket.last_refill) < self.window);
            lock.last_sweep = now;
            debug!("Swept {} idle rate limit buckets", before - lock.clients.len());
        }

        let bucket = lock.clients.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Clients currently holding a bucket.
    pub async fn tracked(&self) -> usize {
        self.buckets.lock().await.clients.len()
    }
}

/// Rightmost `x-forwarded-for` entry, the one the fronting proxy appended.
fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;

    raw.rsplit(',').next()?.trim().parse().ok()
}

/// The peer address, or the forwarded client when a proxy is trusted to set it.
fn client_key(request: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(ip) = forwarded_for(request.headers()) {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(peer)| peer.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn limit_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = client_key(&request, state.config.trust_proxy);

    if !state.rate_limiter.allow(&key).await {
        warn!("Rate limit hit for {key}");
        return Err(AppError::TooManyRequests);
    }

    Ok(next.run(request).await)
}
