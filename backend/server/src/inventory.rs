//! # Inventory Stores
//!
//! Blood bank stock behind one trait, two backends.
//!
//! ## Memory
//! - One `RwLock` over every bank's [`Inventory`], mutated through the `bank` rules
//!
//! ## Redis
//! - One hash per bank: `inventory:<bank id>`, a field per blood group plus `total`, `updated`
//!   and `capacity` (the default applies until a bank sets its own)
//! - Every mutation is a Lua script, so Redis queues it and runs it atomically
//! - `inventory:banks` keeps the set of bank hashes for totals
//! - Increment on a missing field assumes 0, so banks need no setup
use std::collections::HashMap;

use async_trait::async_trait;
use bank::{BloodGroup, Inventory, inventory::DEFAULT_STORAGE_CAPACITY};
use chrono::{DateTime, Utc};
use redis::{Script, aio::ConnectionManager};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;

#[async_trait]
pub trait InventoryStore: Send + Sync + 'static {
    /// Current stock, created empty on first access.
    async fn snapshot(&self, bank: Uuid) -> Result<Inventory, AppError>;

    async fn increment(&self, bank: Uuid, group: BloodGroup, units: u32) -> Result<Inventory, AppError>;

    /// Clamped at zero.
    async fn decrement(&self, bank: Uuid, group: BloodGroup, units: u32) -> Result<Inventory, AppError>;

    /// All-or-nothing removal, fails with [`bank::Error::Insufficient`].
    async fn reserve(&self, bank: Uuid, group: BloodGroup, units: u32) -> Result<Inventory, AppError>;

    async fn release(&self, bank: Uuid, group: BloodGroup, units: u32) -> Result<Inventory, AppError>;

    /// Refused below the units already in stock.
    async fn set_capacity(&self, bank: Uuid, capacity: u32) -> Result<Inventory, AppError>;

    async fn total_units(&self) -> Result<u64, AppError>;
}

#[derive(Default)]
pub struct MemoryInventory {
    banks: RwLock<HashMap<Uuid, Inventory>>,
}

impl MemoryInventory {
    async fn update<F, T>(&self, bank: Uuid, apply: F) -> Result<Inventory, AppError>
    where
        F: FnOnce(&mut Inventory, DateTime<Utc>) -> Result<T, bank::Error>,
    {
        let now = Utc::now();
        let mut banks = self.banks.write().await;
        let inventory = banks
            .entry(bank)
            .or_insert_with(|| Inventory::empty(bank, now));

        apply(inventory, now)?;

        Ok(inventory.clone())
    }
}

#[async_trait]
impl InventoryStore for MemoryInventory {
    async fn snapshot(&self, bank: Uuid) -> Result<Inventory, AppError> {
        self.update(bank, |_, _| Ok(())).await
    }

    async fn increment(&self, bank: Uuid, group: BloodGroup, units: u32) -> Result<Inventory, AppError> {
        self.update(bank, |inventory, now| inventory.increment(group, units, now))
            .await
    }

    async fn decrement(&self, bank: Uuid, group: BloodGroup, units: u32) -> Result<Inventory, AppError> {
        self.update(bank, |inventory, now| Ok(inventory.decrement(group, units, now)))
            .await
    }

    async fn reserve(&self, bank: Uuid, group: BloodGroup, units: u32) -> Result<Inventory, AppError> {
        self.update(bank, |inventory, now| inventory.reserve(group, units, now))
            .await
    }

    async fn release(&self, bank: Uuid, group: BloodGroup, units: u32) -> Result<Inventory, AppError> {
        self.update(bank, |inventory, now| Ok(inventory.release(group, units, now)))
            .await
    }

    async fn set_capacity(&self, bank: Uuid, capacity: u32) -> Result<Inventory, AppError> {
        self.update(bank, |inventory, now| inventory.set_capacity(capacity, now))
            .await
    }

    async fn total_units(&self) -> Result<u64, AppError> {
        Ok(self.banks.read().await.values().map(Inventory::total).sum())
    }
}

const BANKS_KEY: &str = "inventory:banks";
const TOTAL_FIELD: &str = "total";
const UPDATED_FIELD: &str = "updated";
const CAPACITY_FIELD: &str = "capacity";

// KEYS: bank hash, bank set. ARGV: group, units, default capacity, now millis
// Negative result means full: capacity = -result
const INCREMENT_SCRIPT: &str = r"
local total = tonumber(redis.call('HGET', KEYS[1], 'total') or '0')
local capacity = tonumber(redis.call('HGET', KEYS[1], 'capacity') or ARGV[3])
local units = tonumber(ARGV[2])
if total + units > capacity then
    return -capacity
end
redis.call('SADD', KEYS[2], KEYS[1])
redis.call('HINCRBY', KEYS[1], 'total', units)
redis.call('HSET', KEYS[1], 'updated', ARGV[4])
return redis.call('HINCRBY', KEYS[1], ARGV[1], units)
";

// KEYS: bank hash, bank set. ARGV: group, units, now millis
const DECREMENT_SCRIPT: &str = r"
local current = tonumber(redis.call('HGET', KEYS[1], ARGV[1]) or '0')
local removed = math.min(current, tonumber(ARGV[2]))
if removed > 0 then
    redis.call('HINCRBY', KEYS[1], ARGV[1], -removed)
    redis.call('HINCRBY', KEYS[1], 'total', -removed)
end
redis.call('SADD', KEYS[2], KEYS[1])
redis.call('HSET', KEYS[1], 'updated', ARGV[3])
return removed
";

// Negative result means short: available = -(result + 1)
const RESERVE_SCRIPT: &str = r"
local current = tonumber(redis.call('HGET', KEYS[1], ARGV[1]) or '0')
local units = tonumber(ARGV[2])
if current < units then
    return -(current + 1)
end
redis.call('SADD', KEYS[2], KEYS[1])
redis.call('HINCRBY', KEYS[1], ARGV[1], -units)
redis.call('HINCRBY', KEYS[1], 'total', -units)
redis.call('HSET', KEYS[1], 'updated', ARGV[3])
return current - units
";

// ARGV: capacity, now millis. Negative result means too small: total = -(result + 1)
const CAPACITY_SCRIPT: &str = r"
local total = tonumber(redis.call('HGET', KEYS[1], 'total') or '0')
local capacity = tonumber(ARGV[1])
if capacity < total then
    return -(total + 1)
end
redis.call('SADD', KEYS[2], KEYS[1])
redis.call('HSET', KEYS[1], 'capacity', capacity, 'updated', ARGV[2])
return capacity
";

const RELEASE_SCRIPT: &str = r"
redis.call('SADD', KEYS[2], KEYS[1])
redis.call('HINCRBY', KEYS[1], 'total', tonumber(ARGV[2]))
redis.call('HSET', KEYS[1], 'updated', ARGV[3])
return redis.call('HINCRBY', KEYS[1], ARGV[1], tonumber(ARGV[2]))
";

pub struct RedisInventory {
    connection: ConnectionManager,
    capacity: u32,
}

fn bank_key(bank: Uuid) -> String {
    format!("inventory:{bank}")
}

impl RedisInventory {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            capacity: DEFAULT_STORAGE_CAPACITY,
        }
    }

    async fn run(&self, source: &str, bank: Uuid, args: &[String]) -> Result<i64, AppError> {
        let mut connection = self.connection.clone();
        let script = Script::new(source);
        let mut invocation = script.key(bank_key(bank));
        invocation.key(BANKS_KEY);

        for arg in args {
            invocation.arg(arg);
        }

        Ok(invocation.invoke_async(&mut connection).await?)
    }
}

fn now_millis() -> String {
    Utc::now().timestamp_millis().to_string()
}

#[async_trait]
impl InventoryStore for RedisInventory {
    async fn snapshot(&self, bank: Uuid) -> Result<Inventory, AppError> {
        let mut connection = self.connection.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(bank_key(bank))
            .query_async(&mut connection)
            .await?;

        let updated = fields
            .get(UPDATED_FIELD)
            .and_then(|millis| millis.parse().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        let mut inventory = Inventory::empty(bank, updated);
        inventory.storage_capacity = fields
            .get(CAPACITY_FIELD)
            .and_then(|capacity| capacity.parse().ok())
            .unwrap_or(self.capacity);

        for group in BloodGroup::ALL {
            let units = fields
                .get(group.as_str())
                .and_then(|units| units.parse().ok())
                .unwrap_or(0);
            inventory.blood_groups.insert(group, units);
        }

        Ok(inventory)
    }

    async fn increment(&self, bank: Uuid, group: BloodGroup, units: u32) -> Result<Inventory, AppError> {
        let args = [
            group.to_string(),
            units.to_string(),
            self.capacity.to_string(),
            now_millis(),
        ];

        let count = self.run(INCREMENT_SCRIPT, bank, &args).await?;
        if count < 0 {
            return Err(bank::Error::CapacityExceeded {
                capacity: u32::try_from(-count).unwrap_or(self.capacity),
            }
            .into());
        }

        self.snapshot(bank).await
    }

    async fn decrement(&self, bank: Uuid, group: BloodGroup, units: u32) -> Result<Inventory, AppError> {
        let args = [group.to_string(), units.to_string(), now_millis()];
        self.run(DECREMENT_SCRIPT, bank, &args).await?;

        self.snapshot(bank).await
    }

    async fn reserve(&self, bank: Uuid, group: BloodGroup, units: u32) -> Result<Inventory, AppError> {
        let args = [group.to_string(), units.to_string(), now_millis()];
        let remaining = self.run(RESERVE_SCRIPT, bank, &args).await?;

        if remaining < 0 {
            return Err(bank::Error::Insufficient {
                group,
                available: u32::try_from(-(remaining + 1)).unwrap_or(0),
                requested: units,
            }
            .into());
        }

        self.snapshot(bank).await
    }

    async fn release(&self, bank: Uuid, group: BloodGroup, units: u32) -> Result<Inventory, AppError> {
        let args = [group.to_string(), units.to_string(), now_millis()];
        self.run(RELEASE_SCRIPT, bank, &args).await?;

        self.snapshot(bank).await
    }

    async fn set_capacity(&self, bank: Uuid, capacity: u32) -> Result<Inventory, AppError> {
        if capacity == 0 {
            return Err(bank::Error::invalid("Storage capacity must be at least 1").into());
        }

        let args = [capacity.to_string(), now_millis()];
        let result = self.run(CAPACITY_SCRIPT, bank, &args).await?;
        if result < 0 {
            return Err(bank::Error::invalid(format!(
                "Storage capacity {capacity} is below the {} units in stock",
                -(result + 1)
            ))
            .into());
        }

        self.snapshot(bank).await
    }

    async fn total_units(&self) -> Result<u64, AppError> {
        let mut connection = self.connection.clone();
        let banks: Vec<String> = redis::cmd("SMEMBERS")
            .arg(BANKS_KEY)
            .query_async(&mut connection)
            .await?;

        let mut total = 0u64;
        for key in banks {
            let units: Option<i64> = redis::cmd("HGET")
                .arg(&key)
                .arg(TOTAL_FIELD)
                .query_async(&mut connection)
                .await?;
            total += u64::try_from(units.unwrap_or(0)).unwrap_or(0);
        }

        Ok(total)
    }
}
