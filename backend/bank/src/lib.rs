//! # Bank
//!
//! Domain rules of the blood donation platform, free of any I/O.
//!
//! - [`blood`]: groups and red-cell compatibility
//! - [`request`]: requests and the accept/reject reconciliation
//! - [`inventory`]: per bank stock arithmetic
//! - [`transport`]: vehicles and delivery progression
//! - [`geo`]: distances for nearby searches
//! - [`profile`]: blood bank and NGO organisation details
pub mod blood;
pub mod error;
pub mod geo;
pub mod inventory;
pub mod models;
pub mod profile;
pub mod request;
pub mod transport;
pub mod utils;

pub use blood::BloodGroup;
pub use error::Error;
pub use geo::GeoPoint;
pub use inventory::Inventory;
pub use models::{Camp, Role, User};
pub use profile::{BloodBank, Ngo};
pub use request::{BloodRequest, Decision, RequestStatus, ResponderKind, ResponseOutcome, Urgency};
pub use transport::{Delivery, DeliveryStatus, Transport, TransportStatus};
