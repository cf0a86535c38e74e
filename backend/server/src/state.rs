use std::sync::Arc;

use tracing::info;

use super::{
    auth::Keys,
    config::Config,
    database::{Database, init_redis},
    events::EventHub,
    inventory::{InventoryStore, MemoryInventory, RedisInventory},
    rate_limiter::RateLimiter,
};

pub struct AppState {
    pub config: Config,
    pub database: Database,
    pub keys: Keys,
    pub events: EventHub,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let inventory: Arc<dyn InventoryStore> = match &config.redis_url {
            Some(redis_url) => {
                info!("Keeping inventory in Redis");
                Arc::new(RedisInventory::new(init_redis(redis_url).await?))
            }
            None => {
                info!("REDIS_URL not set, keeping inventory in memory");
                Arc::new(MemoryInventory::default())
            }
        };

        Ok(Self::with_inventory(config, inventory))
    }

    pub fn in_memory(config: Config) -> Arc<Self> {
        Self::with_inventory(config, Arc::new(MemoryInventory::default()))
    }

    fn with_inventory(config: Config, inventory: Arc<dyn InventoryStore>) -> Arc<Self> {
        Arc::new(Self {
            database: Database::new(inventory),
            keys: Keys::new(&config.jwt_secret, config.jwt_ttl),
            events: EventHub::new(config.event_capacity),
            rate_limiter: RateLimiter::new(config.rate_limit_max, config.rate_limit_window),
            config,
        })
    }
}
