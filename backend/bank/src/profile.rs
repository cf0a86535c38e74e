//! # Profiles
//!
//! Organisation details behind blood bank and NGO accounts, keyed by the owning user's id.
//!
//! - A profile is created on the first save and replaced on later ones
//! - Verification and rating are set by admins, never by the owner
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Error,
    geo::GeoPoint,
    inventory::DEFAULT_STORAGE_CAPACITY,
    utils::{is_valid_email, normalize_email, sanitize_name},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zip_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactInfo {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub emergency_contact: Option<String>,
    pub website: Option<String>,
}

impl ContactInfo {
    fn normalized(mut self) -> Result<Self, Error> {
        if let Some(email) = self.email.take() {
            let email = normalize_email(&email);
            if !email.is_empty() {
                if !is_valid_email(&email) {
                    return Err(Error::invalid(format!("Invalid contact email: {email}")));
                }
                self.email = Some(email);
            }
        }

        Ok(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatingHours {
    pub open: Option<String>,
    pub close: Option<String>,
    pub days: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBloodBank {
    pub name: String,
    #[serde(default)]
    pub address: Address,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub contact_info: ContactInfo,
    pub storage_capacity: Option<u32>,
    #[serde(default)]
    pub operating_hours: OperatingHours,
    #[serde(default)]
    pub services: Vec<String>,
    pub license_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodBank {
    /// Same id as the owning blood bank user.
    pub id: Uuid,
    pub name: String,
    pub address: Address,
    pub location: Option<GeoPoint>,
    pub contact_info: ContactInfo,
    pub storage_capacity: u32,
    pub operating_hours: OperatingHours,
    pub services: Vec<String>,
    pub license_number: Option<String>,
    pub verified: bool,
    /// 0 to 5.
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BloodBank {
    /// Validates a submitted profile. `previous` keeps admin-owned fields across edits.
    pub fn profile(
        owner: Uuid,
        new: NewBloodBank,
        previous: Option<&BloodBank>,
        now: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let name = sanitize_name(&new.name);
        if name.is_empty() {
            return Err(Error::invalid("Please provide blood bank name"));
        }
        if let Some(location) = &new.location {
            location.validate()?;
        }

        let storage_capacity = new
            .storage_capacity
            .or(previous.map(|bank| bank.storage_capacity))
            .unwrap_or(DEFAULT_STORAGE_CAPACITY);
        if storage_capacity == 0 {
            return Err(Error::invalid("Storage capacity must be at least 1"));
        }

        let services = new
            .services
            .iter()
            .map(|service| sanitize_name(service))
            .filter(|service| !service.is_empty())
            .collect();

        Ok(Self {
            id: owner,
            name,
            address: new.address,
            location: new.location,
            contact_info: new.contact_info.normalized()?,
            storage_capacity,
            operating_hours: new.operating_hours,
            services,
            license_number: new.license_number.map(|license| normalize_code(&license)),
            verified: previous.is_some_and(|bank| bank.verified),
            rating: previous.map_or(0.0, |bank| bank.rating),
            created_at: previous.map_or(now, |bank| bank.created_at),
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNgo {
    pub organization_name: String,
    pub registration_number: String,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub contact_info: ContactInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ngo {
    /// Same id as the owning NGO user.
    pub id: Uuid,
    pub organization_name: String,
    /// Unique across NGOs, uppercase without spaces.
    pub registration_number: String,
    pub address: Address,
    pub contact_info: ContactInfo,
    pub verified: bool,
    /// Camps organised so far, filled in when read.
    pub total_campaigns: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ngo {
    pub fn profile(owner: Uuid, new: NewNgo, previous: Option<&Ngo>, now: DateTime<Utc>) -> Result<Self, Error> {
        let organization_name = sanitize_name(&new.organization_name);
        let registration_number = normalize_code(&new.registration_number);
        if organization_name.is_empty() || registration_number.is_empty() {
            return Err(Error::invalid(
                "Organization name and registration number are required",
            ));
        }

        Ok(Self {
            id: owner,
            organization_name,
            registration_number,
            address: new.address,
            contact_info: new.contact_info.normalized()?,
            verified: previous.is_some_and(|ngo| ngo.verified),
            total_campaigns: 0,
            created_at: previous.map_or(now, |ngo| ngo.created_at),
            updated_at: now,
        })
    }
}

/// Registration and licence numbers compare without case or spacing.
pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_bank() -> NewBloodBank {
        serde_json::from_value(serde_json::json!({
            "name": "  City   Blood Bank ",
            "address": { "city": "Pune", "zipCode": "411001" },
            "location": { "lat": 18.52, "lng": 73.85 },
            "contactInfo": { "email": "Desk@CityBank.org", "emergencyContact": "108" },
            "services": ["plasma", "  "],
            "licenseNumber": "mh 12 bb 001"
        }))
        .unwrap()
    }

    #[test]
    fn test_bank_profile_defaults() {
        let owner = Uuid::new_v4();
        let bank = BloodBank::profile(owner, new_bank(), None, Utc::now()).unwrap();

        assert_eq!(bank.id, owner);
        assert_eq!(bank.name, "City Blood Bank");
        assert_eq!(bank.storage_capacity, DEFAULT_STORAGE_CAPACITY);
        assert_eq!(bank.contact_info.email.as_deref(), Some("desk@citybank.org"));
        assert_eq!(bank.services, vec!["plasma".to_string()]);
        assert_eq!(bank.license_number.as_deref(), Some("MH12BB001"));
        assert!(!bank.verified);
        assert_eq!(bank.address.zip_code.as_deref(), Some("411001"));
    }

    #[test]
    fn test_bank_edit_keeps_verification() {
        let owner = Uuid::new_v4();
        let mut first = BloodBank::profile(owner, new_bank(), None, Utc::now()).unwrap();
        first.verified = true;
        first.rating = 4.5;
        first.storage_capacity = 300;

        let mut edit = new_bank();
        edit.name = "City Blood Centre".to_string();
        let second = BloodBank::profile(owner, edit, Some(&first), Utc::now()).unwrap();

        assert!(second.verified);
        assert_eq!(second.rating, 4.5);
        assert_eq!(second.storage_capacity, 300);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.name, "City Blood Centre");
    }

    #[test]
    fn test_bank_profile_rejects_bad_input() {
        let mut unnamed = new_bank();
        unnamed.name = "   ".to_string();
        assert!(BloodBank::profile(Uuid::new_v4(), unnamed, None, Utc::now()).is_err());

        let mut empty = new_bank();
        empty.storage_capacity = Some(0);
        assert!(BloodBank::profile(Uuid::new_v4(), empty, None, Utc::now()).is_err());

        let mut mail = new_bank();
        mail.contact_info.email = Some("desk@nowhere".to_string());
        assert!(BloodBank::profile(Uuid::new_v4(), mail, None, Utc::now()).is_err());
    }

    #[test]
    fn test_ngo_registration_normalized() {
        let new = NewNgo {
            organization_name: "Red  Drop Foundation".to_string(),
            registration_number: " ngo/ 2024 / 17 ".to_string(),
            address: Address::default(),
            contact_info: ContactInfo::default(),
        };
        let ngo = Ngo::profile(Uuid::new_v4(), new.clone(), None, Utc::now()).unwrap();

        assert_eq!(ngo.organization_name, "Red Drop Foundation");
        assert_eq!(ngo.registration_number, "NGO/2024/17");

        let blank = NewNgo {
            registration_number: "  ".to_string(),
            ..new
        };
        assert!(Ngo::profile(Uuid::new_v4(), blank, None, Utc::now()).is_err());
    }
}
