use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradecast_core::{GeoPoint, OrgId, TechnicianId};

use crate::job::Trade;

/// A registered, opted-in contractor (warm candidate).
///
/// Owned by the external registry; this core reads technicians and only ever
/// touches the dispatch bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technician {
    pub id: TechnicianId,
    /// `None` places the technician in the shared public pool.
    pub org_id: Option<OrgId>,
    pub name: String,
    pub email: String,
    pub trade: Trade,
    pub point: Option<GeoPoint>,
    pub city: String,
    pub state: String,
    /// Average review rating in [0, 5], when any reviews exist.
    pub rating: Option<f64>,
    pub available: bool,
    pub opted_out: bool,
    pub dispatch_count: u32,
    pub last_dispatched_at: Option<DateTime<Utc>>,
}

impl Technician {
    pub fn new(name: impl Into<String>, email: impl Into<String>, trade: Trade) -> Self {
        Self {
            id: TechnicianId::new(),
            org_id: None,
            name: name.into(),
            email: email.into(),
            trade,
            point: None,
            city: String::new(),
            state: String::new(),
            rating: None,
            available: true,
            opted_out: false,
            dispatch_count: 0,
            last_dispatched_at: None,
        }
    }

    pub fn with_org(mut self, org_id: OrgId) -> Self {
        self.org_id = Some(org_id);
        self
    }

    pub fn with_point(mut self, point: GeoPoint) -> Self {
        self.point = Some(point);
        self
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Whether the technician can receive a dispatch for the given trade.
    ///
    /// Availability and opt-out are hard gates; distance is checked separately
    /// by the geofilter.
    pub fn accepts(&self, trade: &Trade) -> bool {
        self.available && !self.opted_out && self.trade.matches(trade)
    }

    pub fn mark_dispatched(&mut self, at: DateTime<Utc>) {
        self.dispatch_count += 1;
        self.last_dispatched_at = Some(at);
    }
}
