//! Shared types for the pilgrimage tracking platform
//!
//! Common types used across the gate server and its clients:
//! domain models, visit records, wire structures and utility helpers.

pub mod models;
pub mod util;
pub mod visit;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use models::{Zone, ZoneCreate, VisitorProfile, UserType};
pub use visit::{ItineraryLeg, ScanAction, VisitHistory, VisitRecord, ZoneDensity};
