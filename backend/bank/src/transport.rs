//! # Transport
//!
//! Vehicles registered by transport agencies and the deliveries they run.
//!
//! A delivery moves strictly one step at a time:
//! `assigned -> picked -> in-transit -> delivered`.
//! Any step short of `delivered` may be `cancelled`.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::Error, geo::GeoPoint, profile::normalize_code, utils::sanitize_name};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VehicleType {
    #[default]
    Car,
    Bike,
    Van,
    RefrigeratedVan,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportStatus {
    #[default]
    Available,
    OnDuty,
    OffDuty,
    Maintenance,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransport {
    pub agency_name: String,
    pub vehicle_no: String,
    #[serde(default)]
    pub vehicle_type: VehicleType,
    pub driver_name: String,
    pub driver_phone: String,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transport {
    /// Same id as the owning transport user.
    pub id: Uuid,
    pub agency_name: String,
    pub vehicle_no: String,
    pub vehicle_type: VehicleType,
    pub driver_name: String,
    pub driver_phone: String,
    pub location: Option<GeoPoint>,
    pub status: TransportStatus,
    pub current_delivery: Option<Uuid>,
    pub completed_deliveries: u32,
    pub created_at: DateTime<Utc>,
}

impl Transport {
    pub fn register(owner: Uuid, new: NewTransport, now: DateTime<Utc>) -> Result<Self, Error> {
        let agency_name = sanitize_name(&new.agency_name);
        let driver_name = sanitize_name(&new.driver_name);
        let vehicle_no = normalize_code(&new.vehicle_no);

        if agency_name.is_empty() || driver_name.is_empty() || vehicle_no.is_empty() {
            return Err(Error::invalid(
                "Agency name, vehicle number and driver name are required",
            ));
        }
        if new.driver_phone.trim().is_empty() {
            return Err(Error::invalid("Driver phone is required"));
        }
        if let Some(location) = &new.location {
            location.validate()?;
        }

        Ok(Self {
            id: owner,
            agency_name,
            vehicle_no,
            vehicle_type: new.vehicle_type,
            driver_name,
            driver_phone: new.driver_phone.trim().to_string(),
            location: new.location,
            status: TransportStatus::Available,
            current_delivery: None,
            completed_deliveries: 0,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    Assigned,
    Picked,
    InTransit,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }

    pub fn next(self) -> Option<DeliveryStatus> {
        match self {
            DeliveryStatus::Assigned => Some(DeliveryStatus::Picked),
            DeliveryStatus::Picked => Some(DeliveryStatus::InTransit),
            DeliveryStatus::InTransit => Some(DeliveryStatus::Delivered),
            DeliveryStatus::Delivered | DeliveryStatus::Cancelled => None,
        }
    }

    pub fn can_advance_to(self, to: DeliveryStatus) -> bool {
        match to {
            DeliveryStatus::Cancelled => !self.is_terminal(),
            _ => self.next() == Some(to),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::Picked => "picked",
            DeliveryStatus::InTransit => "in-transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: Uuid,
    pub request_id: Uuid,
    pub transport_id: Uuid,
    pub assigned_by: Uuid,
    pub status: DeliveryStatus,
    pub assigned_at: DateTime<Utc>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn assign(
        id: Uuid,
        request_id: Uuid,
        transport_id: Uuid,
        assigned_by: Uuid,
        estimated_delivery: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            request_id,
            transport_id,
            assigned_by,
            status: DeliveryStatus::Assigned,
            assigned_at: now,
            estimated_delivery,
            updated_at: now,
        }
    }

    pub fn advance(&mut self, to: DeliveryStatus, now: DateTime<Utc>) -> Result<(), Error> {
        if !self.status.can_advance_to(to) {
            return Err(Error::transition(self.status, to));
        }

        self.status = to;
        self.updated_at = now;

        Ok(())
    }
}
