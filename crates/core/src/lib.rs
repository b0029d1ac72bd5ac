//! `tradecast-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod geo;
pub mod id;

pub use error::{DispatchError, DispatchResult};
pub use geo::{haversine_miles, GeoPoint, DISPATCH_RADIUS_MILES, EARTH_RADIUS_MILES};
pub use id::{ColdLeadId, JobId, OrgId, OutreachId, RecipientId, StagingId, TechnicianId};
