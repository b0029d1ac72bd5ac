use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradecast_core::{ColdLeadId, GeoPoint};

use crate::job::Trade;
use crate::staging::StagingRecord;

/// A promoted, dispatchable lead with a verified email.
///
/// Emails are globally unique across the cold pool; the datastore rejects a
/// second insert for the same address and promotion treats that as dedup,
/// not failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdLead {
    pub id: ColdLeadId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub business_name: String,
    pub phone: Option<String>,
    pub trade: Trade,
    pub city: Option<String>,
    pub state: String,
    pub point: Option<GeoPoint>,
    /// Human-readable provenance summary ("HVAC contractors in Tampa, FL").
    pub supersearch_query: String,
    pub dispatch_count: u32,
    pub last_dispatched_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ColdLead {
    /// Deterministically synthesize a lead from a verified staging record.
    ///
    /// Caller guarantees `record.promotable(..)` held; the email is taken
    /// as-is from the verification stage.
    pub fn promoted_from(record: &StagingRecord, email: String) -> Self {
        Self {
            id: ColdLeadId::new(),
            email,
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            business_name: record.business_name.clone(),
            phone: record.phone.clone(),
            trade: record.trade.clone(),
            city: record.city.clone(),
            state: record.state.clone(),
            point: record.point,
            supersearch_query: supersearch_query(&record.trade, record.city.as_deref(), &record.state),
            dispatch_count: 0,
            last_dispatched_at: None,
            unsubscribed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the lead may receive another dispatch.
    pub fn dispatchable(&self) -> bool {
        self.unsubscribed_at.is_none()
    }

    pub fn mark_dispatched(&mut self, at: DateTime<Utc>) {
        self.dispatch_count += 1;
        self.last_dispatched_at = Some(at);
    }
}

/// Audit summary of where a promoted lead came from.
pub fn supersearch_query(trade: &Trade, city: Option<&str>, state: &str) -> String {
    match city {
        Some(city) => format!("{trade} contractors in {city}, {state}"),
        None => format!("{trade} contractors in {state}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_synthesizes_audit_query() {
        let record = StagingRecord::new("Bay Area Cooling LLC", Trade::new("HVAC"), "FL")
            .with_city("Tampa");
        let lead = ColdLead::promoted_from(&record, "info@bayareacooling.com".into());

        assert_eq!(lead.supersearch_query, "HVAC contractors in Tampa, FL");
        assert_eq!(lead.state, "FL");
        assert_eq!(lead.dispatch_count, 0);
        assert!(lead.dispatchable());
    }

    #[test]
    fn unsubscribed_lead_is_not_dispatchable() {
        let record = StagingRecord::new("Bay Area Cooling LLC", Trade::new("HVAC"), "FL");
        let mut lead = ColdLead::promoted_from(&record, "info@bayareacooling.com".into());
        lead.unsubscribed_at = Some(Utc::now());
        assert!(!lead.dispatchable());
    }
}
