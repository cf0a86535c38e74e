use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{blood::BloodGroup, error::Error, geo::GeoPoint, request::ResponderKind, utils::sanitize_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Donor,
    BloodBank,
    Ngo,
    Admin,
    Beneficiary,
    Transport,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Donor,
        Role::BloodBank,
        Role::Ngo,
        Role::Admin,
        Role::Beneficiary,
        Role::Transport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Donor => "donor",
            Role::BloodBank => "blood-bank",
            Role::Ngo => "ngo",
            Role::Admin => "admin",
            Role::Beneficiary => "beneficiary",
            Role::Transport => "transport",
        }
    }

    /// Roles that can answer a blood request.
    pub fn responder_kind(self) -> Option<ResponderKind> {
        match self {
            Role::Donor => Some(ResponderKind::Donor),
            Role::BloodBank => Some(ResponderKind::BloodBank),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s.trim())
            .ok_or_else(|| Error::invalid(format!("Unknown role: {s}")))
    }
}

/// Public view of an account. Credentials live with the server's store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub blood_group: Option<BloodGroup>,
    pub is_available: bool,
    pub location: Option<GeoPoint>,
    pub medical_history: Option<String>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_donor(&self) -> bool {
        self.role == Role::Donor
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampStatus {
    #[default]
    Planned,
    Ongoing,
    Completed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCamp {
    pub title: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub location: Option<String>,
    pub expected_donors: Option<u32>,
}

/// A donation drive organised by an NGO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camp {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub location: Option<String>,
    pub organizer: Uuid,
    pub expected_donors: Option<u32>,
    pub status: CampStatus,
    pub created_at: DateTime<Utc>,
}

impl Camp {
    pub fn plan(id: Uuid, organizer: Uuid, new: NewCamp, now: DateTime<Utc>) -> Result<Self, Error> {
        let title = sanitize_name(&new.title);
        if title.is_empty() {
            return Err(Error::invalid("Camp title is required"));
        }

        Ok(Self {
            id,
            title,
            description: new.description,
            date: new.date,
            location: new.location,
            organizer,
            expected_donors: new.expected_donors,
            status: CampStatus::Planned,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_spelling() {
        assert_eq!(serde_json::to_string(&Role::BloodBank).unwrap(), "\"blood-bank\"");
        assert_eq!("blood-bank".parse::<Role>().unwrap(), Role::BloodBank);
        assert!("doctor".parse::<Role>().is_err());
    }

    #[test]
    fn test_responder_kinds() {
        assert_eq!(Role::Donor.responder_kind(), Some(ResponderKind::Donor));
        assert_eq!(Role::BloodBank.responder_kind(), Some(ResponderKind::BloodBank));
        assert_eq!(Role::Ngo.responder_kind(), None);
    }

    #[test]
    fn test_camp_requires_title() {
        let new = NewCamp {
            title: "   ".to_string(),
            description: None,
            date: Utc::now(),
            location: None,
            expected_donors: Some(40),
        };

        assert!(Camp::plan(Uuid::new_v4(), Uuid::new_v4(), new, Utc::now()).is_err());
    }
}
