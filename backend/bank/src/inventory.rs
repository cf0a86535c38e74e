//! # Inventory
//!
//! Per blood bank unit counts for each blood group.
//!
//! - Counts never go negative: plain decrements clamp at zero
//! - Reservations are all-or-nothing and fail when stock is short
//! - Total stock is bounded by the bank's storage capacity
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{blood::BloodGroup, error::Error};

pub const DEFAULT_STORAGE_CAPACITY: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub blood_bank_id: Uuid,
    pub blood_groups: BTreeMap<BloodGroup, u32>,
    pub storage_capacity: u32,
    pub last_updated: DateTime<Utc>,
}

impl Inventory {
    pub fn empty(blood_bank_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            blood_bank_id,
            blood_groups: BloodGroup::ALL.into_iter().map(|group| (group, 0)).collect(),
            storage_capacity: DEFAULT_STORAGE_CAPACITY,
            last_updated: now,
        }
    }

    pub fn units(&self, group: BloodGroup) -> u32 {
        self.blood_groups.get(&group).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.blood_groups.values().map(|&units| u64::from(units)).sum()
    }

    fn set(&mut self, group: BloodGroup, units: u32, now: DateTime<Utc>) {
        self.blood_groups.insert(group, units);
        self.last_updated = now;
    }

    /// Never below the units already held.
    pub fn set_capacity(&mut self, capacity: u32, now: DateTime<Utc>) -> Result<(), Error> {
        if capacity == 0 {
            return Err(Error::invalid("Storage capacity must be at least 1"));
        }
        if u64::from(capacity) < self.total() {
            return Err(Error::invalid(format!(
                "Storage capacity {capacity} is below the {} units in stock",
                self.total()
            )));
        }

        self.storage_capacity = capacity;
        self.last_updated = now;

        Ok(())
    }

    /// Adds stock, returning the new count for `group`.
    pub fn increment(&mut self, group: BloodGroup, units: u32, now: DateTime<Utc>) -> Result<u32, Error> {
        if self.total() + u64::from(units) > u64::from(self.storage_capacity) {
            return Err(Error::CapacityExceeded {
                capacity: self.storage_capacity,
            });
        }

        let count = self.units(group) + units;
        self.set(group, count, now);

        Ok(count)
    }

    /// Removes up to `units`, returning how many were actually removed.
    pub fn decrement(&mut self, group: BloodGroup, units: u32, now: DateTime<Utc>) -> u32 {
        let current = self.units(group);
        let removed = current.min(units);

        self.set(group, current - removed, now);

        removed
    }

    /// Removes exactly `units` or nothing, returning the remaining count.
    pub fn reserve(&mut self, group: BloodGroup, units: u32, now: DateTime<Utc>) -> Result<u32, Error> {
        let current = self.units(group);

        if current < units {
            return Err(Error::Insufficient {
                group,
                available: current,
                requested: units,
            });
        }

        self.set(group, current - units, now);

        Ok(current - units)
    }

    /// Puts back reserved units. Storage capacity is not checked.
    pub fn release(&mut self, group: BloodGroup, units: u32, now: DateTime<Utc>) -> u32 {
        let count = self.units(group).saturating_add(units);
        self.set(group, count, now);

        count
    }

    pub fn low_stock(&self, threshold: u32) -> Vec<BloodGroup> {
        self.blood_groups
            .iter()
            .filter(|&(_, &units)| units <= threshold)
            .map(|(&group, _)| group)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BloodGroup::*;

    fn inventory() -> Inventory {
        Inventory::empty(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_empty_has_every_group() {
        let inventory = inventory();
        assert_eq!(inventory.blood_groups.len(), 8);
        assert_eq!(inventory.total(), 0);
    }

    #[test]
    fn test_decrement_clamps_at_zero() {
        let mut inventory = inventory();
        inventory.increment(ONegative, 2, Utc::now()).unwrap();

        assert_eq!(inventory.decrement(ONegative, 5, Utc::now()), 2);
        assert_eq!(inventory.units(ONegative), 0);
        assert_eq!(inventory.decrement(ONegative, 1, Utc::now()), 0);
        assert_eq!(inventory.units(ONegative), 0);
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let mut inventory = inventory();
        inventory.increment(APositive, 3, Utc::now()).unwrap();

        let err = inventory.reserve(APositive, 4, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            Error::Insufficient {
                group: APositive,
                available: 3,
                requested: 4
            }
        );
        assert_eq!(inventory.units(APositive), 3);

        assert_eq!(inventory.reserve(APositive, 3, Utc::now()), Ok(0));
        assert_eq!(inventory.release(APositive, 3, Utc::now()), 3);
    }

    #[test]
    fn test_capacity_bound() {
        let mut inventory = inventory();
        inventory.storage_capacity = 10;

        inventory.increment(BPositive, 6, Utc::now()).unwrap();
        assert!(inventory.increment(BNegative, 5, Utc::now()).is_err());
        assert_eq!(inventory.increment(BNegative, 4, Utc::now()), Ok(4));
        assert_eq!(inventory.total(), 10);
    }

    #[test]
    fn test_capacity_not_below_stock() {
        let mut inventory = inventory();
        inventory.increment(OPositive, 40, Utc::now()).unwrap();

        assert!(inventory.set_capacity(39, Utc::now()).is_err());
        assert!(inventory.set_capacity(0, Utc::now()).is_err());
        inventory.set_capacity(40, Utc::now()).unwrap();

        assert_eq!(inventory.storage_capacity, 40);
        assert!(inventory.increment(OPositive, 1, Utc::now()).is_err());
    }

    #[test]
    fn test_low_stock() {
        let mut inventory = inventory();
        for group in BloodGroup::ALL {
            inventory.increment(group, 10, Utc::now()).unwrap();
        }
        inventory.decrement(AbNegative, 9, Utc::now());

        assert_eq!(inventory.low_stock(2), vec![AbNegative]);
    }

    #[test]
    fn test_serializes_group_keys() {
        let json = serde_json::to_value(inventory()).unwrap();
        assert_eq!(json["bloodGroups"]["AB-"], 0);
        assert_eq!(json["storageCapacity"], 1000);
    }
}
