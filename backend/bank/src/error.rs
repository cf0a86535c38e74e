use thiserror::Error;

use crate::{blood::BloodGroup, request::RequestStatus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    Invalid(String),

    #[error("Request is already assigned")]
    AlreadyAssigned,

    #[error("You have already responded to this request")]
    AlreadyResponded,

    #[error("Request is {0} and no longer accepts responses")]
    Closed(RequestStatus),

    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Not enough {group} in inventory: {available} available, {requested} requested")]
    Insufficient {
        group: BloodGroup,
        available: u32,
        requested: u32,
    },

    #[error("Storage capacity of {capacity} units exceeded")]
    CapacityExceeded { capacity: u32 },
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid(message.into())
    }

    pub fn transition(from: impl ToString, to: impl ToString) -> Self {
        Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// State conflicts rather than bad input.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::AlreadyAssigned
                | Error::AlreadyResponded
                | Error::Closed(_)
                | Error::InvalidTransition { .. }
        )
    }
}
