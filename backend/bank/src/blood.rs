//! # Blood Groups
//!
//! The eight ABO/Rh groups and red-cell compatibility between them.
//!
//! ## Compatibility
//!
//! - O- gives to everyone, AB+ receives from everyone
//! - ABO: O gives to all, A gives to A/AB, B gives to B/AB, AB gives to AB only
//! - Rh: negative gives to both, positive only to positive
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abo {
    A,
    B,
    O,
    Ab,
}

impl BloodGroup {
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::APositive,
        BloodGroup::ANegative,
        BloodGroup::BPositive,
        BloodGroup::BNegative,
        BloodGroup::OPositive,
        BloodGroup::ONegative,
        BloodGroup::AbPositive,
        BloodGroup::AbNegative,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BloodGroup::APositive => "A+",
            BloodGroup::ANegative => "A-",
            BloodGroup::BPositive => "B+",
            BloodGroup::BNegative => "B-",
            BloodGroup::OPositive => "O+",
            BloodGroup::ONegative => "O-",
            BloodGroup::AbPositive => "AB+",
            BloodGroup::AbNegative => "AB-",
        }
    }

    fn abo(self) -> Abo {
        match self {
            BloodGroup::APositive | BloodGroup::ANegative => Abo::A,
            BloodGroup::BPositive | BloodGroup::BNegative => Abo::B,
            BloodGroup::OPositive | BloodGroup::ONegative => Abo::O,
            BloodGroup::AbPositive | BloodGroup::AbNegative => Abo::Ab,
        }
    }

    pub fn is_rh_positive(self) -> bool {
        matches!(
            self,
            BloodGroup::APositive
                | BloodGroup::BPositive
                | BloodGroup::OPositive
                | BloodGroup::AbPositive
        )
    }

    /// Whether red cells of `self` can be transfused into `recipient`.
    pub fn can_donate_to(self, recipient: BloodGroup) -> bool {
        let abo = match (self.abo(), recipient.abo()) {
            (Abo::O, _) => true,
            (Abo::A, Abo::A | Abo::Ab) => true,
            (Abo::B, Abo::B | Abo::Ab) => true,
            (Abo::Ab, Abo::Ab) => true,
            _ => false,
        };

        abo && (!self.is_rh_positive() || recipient.is_rh_positive())
    }

    /// Groups whose red cells `self` can receive, in [`BloodGroup::ALL`] order.
    pub fn compatible_donors(self) -> Vec<BloodGroup> {
        BloodGroup::ALL
            .into_iter()
            .filter(|donor| donor.can_donate_to(self))
            .collect()
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();

        BloodGroup::ALL
            .into_iter()
            .find(|group| group.as_str() == normalized)
            .ok_or_else(|| Error::Invalid(format!("Unknown blood group: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::BloodGroup::{self, *};

    #[test]
    fn test_universal_donor_and_recipient() {
        for group in BloodGroup::ALL {
            assert!(ONegative.can_donate_to(group), "O- should give to {group}");
            assert!(group.can_donate_to(AbPositive), "{group} should give to AB+");
        }
    }

    #[test]
    fn test_rh_direction() {
        assert!(ANegative.can_donate_to(APositive));
        assert!(!APositive.can_donate_to(ANegative));
        assert!(!OPositive.can_donate_to(ONegative));
    }

    #[test]
    fn test_abo_mismatch() {
        assert!(!APositive.can_donate_to(BPositive));
        assert!(!AbNegative.can_donate_to(ANegative));
        assert!(BNegative.can_donate_to(AbNegative));
    }

    #[test]
    fn test_compatible_donors() {
        assert_eq!(ONegative.compatible_donors(), vec![ONegative]);
        assert_eq!(
            ANegative.compatible_donors(),
            vec![ANegative, ONegative]
        );
        assert_eq!(AbPositive.compatible_donors().len(), 8);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("ab-".parse::<BloodGroup>().unwrap(), AbNegative);
        assert_eq!(" O+ ".parse::<BloodGroup>().unwrap(), OPositive);
        assert!("C+".parse::<BloodGroup>().is_err());
        assert_eq!(BPositive.to_string(), "B+");
    }

    #[test]
    fn test_serde_spelling() {
        assert_eq!(serde_json::to_string(&AbPositive).unwrap(), "\"AB+\"");
        let group: BloodGroup = serde_json::from_str("\"O-\"").unwrap();
        assert_eq!(group, ONegative);
    }
}
