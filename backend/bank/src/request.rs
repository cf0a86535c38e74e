//! # Requests
//!
//! A blood request is broadcast to every compatible donor and blood bank.
//! Each responder may accept or reject independently and in any order.
//!
//! ## Reconciliation
//!
//! - Only an `open` request can be assigned, and only once
//! - The first acceptance moves it to `assigned` and records the assignee
//! - Later acceptances are kept as `superseded` responses, the assignee never changes
//! - Rejections are kept as `declined` and never touch the status
//! - One response per responder per request
//! - `completed` and `cancelled` are terminal and refuse further responses
//!
//! Callers must hold exclusive access to the request while calling
//! [`BloodRequest::respond`]; the guard is the `status == open` check itself.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{blood::BloodGroup, error::Error, utils::sanitize_name};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Urgency {
    /// High and critical requests are pushed to donors immediately.
    pub fn is_urgent(self) -> bool {
        matches!(self, Urgency::High | Urgency::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Open,
    Assigned,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestStatus::Open => "open",
            RequestStatus::Assigned => "assigned",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponderKind {
    Donor,
    BloodBank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    #[serde(alias = "accepted")]
    Accept,
    #[serde(alias = "rejected")]
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseOutcome {
    Assigned,
    Declined,
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub responder: Uuid,
    pub decision: Decision,
    pub outcome: ResponseOutcome,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub patient_name: String,
    pub blood_group: BloodGroup,
    pub units: i64,
    #[serde(default)]
    pub urgency: Urgency,
    pub hospital: Option<String>,
    pub location: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
}

impl NewRequest {
    pub fn validate(&self) -> Result<u32, Error> {
        if sanitize_name(&self.patient_name).is_empty() {
            return Err(Error::invalid("Patient name is required"));
        }
        if self.units < 1 {
            return Err(Error::invalid("Units must be at least 1"));
        }

        u32::try_from(self.units).map_err(|_| Error::invalid("Units out of range"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodRequest {
    pub id: Uuid,
    pub patient_name: String,
    pub blood_group: BloodGroup,
    pub units: u32,
    pub urgency: Urgency,
    pub hospital: Option<String>,
    pub location: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
    pub status: RequestStatus,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub assignee_kind: Option<ResponderKind>,
    pub donor_responses: Vec<Response>,
    pub blood_bank_responses: Vec<Response>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl BloodRequest {
    pub fn open(id: Uuid, created_by: Uuid, new: NewRequest, now: DateTime<Utc>) -> Result<Self, Error> {
        let units = new.validate()?;

        Ok(Self {
            id,
            patient_name: sanitize_name(&new.patient_name),
            blood_group: new.blood_group,
            units,
            urgency: new.urgency,
            hospital: new.hospital,
            location: new.location,
            contact_phone: new.contact_phone,
            notes: new.notes,
            status: RequestStatus::Open,
            created_by,
            assigned_to: None,
            assignee_kind: None,
            donor_responses: Vec::new(),
            blood_bank_responses: Vec::new(),
            created_at: now,
            assigned_at: None,
            closed_at: None,
        })
    }

    pub fn responses(&self, kind: ResponderKind) -> &[Response] {
        match kind {
            ResponderKind::Donor => &self.donor_responses,
            ResponderKind::BloodBank => &self.blood_bank_responses,
        }
    }

    pub fn has_responded(&self, responder: Uuid) -> bool {
        self.donor_responses
            .iter()
            .chain(&self.blood_bank_responses)
            .any(|response| response.responder == responder)
    }

    /// Checks that would refuse a response, without recording anything.
    pub fn check_respondable(&self, responder: Uuid) -> Result<(), Error> {
        if self.status.is_terminal() {
            return Err(Error::Closed(self.status));
        }
        if self.has_responded(responder) {
            return Err(Error::AlreadyResponded);
        }

        Ok(())
    }

    pub fn respond(
        &mut self,
        responder: Uuid,
        kind: ResponderKind,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<ResponseOutcome, Error> {
        self.check_respondable(responder)?;

        let outcome = match (decision, self.status) {
            (Decision::Reject, _) => ResponseOutcome::Declined,
            (Decision::Accept, RequestStatus::Open) => {
                self.status = RequestStatus::Assigned;
                self.assigned_to = Some(responder);
                self.assignee_kind = Some(kind);
                self.assigned_at = Some(now);

                ResponseOutcome::Assigned
            }
            (Decision::Accept, _) => ResponseOutcome::Superseded,
        };

        let response = Response {
            responder,
            decision,
            outcome,
            responded_at: now,
        };

        match kind {
            ResponderKind::Donor => self.donor_responses.push(response),
            ResponderKind::BloodBank => self.blood_bank_responses.push(response),
        }

        Ok(outcome)
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        if self.status != RequestStatus::Assigned {
            return Err(Error::transition(self.status, RequestStatus::Completed));
        }

        self.status = RequestStatus::Completed;
        self.closed_at = Some(now);

        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        if self.status.is_terminal() {
            return Err(Error::transition(self.status, RequestStatus::Cancelled));
        }

        self.status = RequestStatus::Cancelled;
        self.closed_at = Some(now);

        Ok(())
    }

    /// Whether a donor of `group` could fulfil this request.
    pub fn accepts_donor(&self, group: BloodGroup) -> bool {
        group.can_donate_to(self.blood_group)
    }

    pub fn involves(&self, user: Uuid) -> bool {
        self.created_by == user || self.assigned_to == Some(user)
    }
}
