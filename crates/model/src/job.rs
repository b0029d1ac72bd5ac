use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradecast_core::{GeoPoint, JobId, OrgId};

/// A contractor trade (HVAC, Plumbing, Electrical, ...).
///
/// Trades compare case-insensitively; the generic "General" trade matches any
/// job at a reduced score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trade(String);

impl Trade {
    pub const GENERAL: &'static str = "General";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_general(&self) -> bool {
        self.0.eq_ignore_ascii_case(Self::GENERAL)
    }

    /// Exact (case-insensitive) trade equality.
    pub fn matches(&self, other: &Trade) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How quickly the job needs a contractor on site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Emergency,
    Urgent,
    Flexible,
}

/// Job lifecycle status.
///
/// Only `Matching -> Dispatched` is performed by this core; assignment and
/// completion transitions belong to flows outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Matching,
    Dispatched,
    Assigned,
    Completed,
    Pending,
}

/// A unit of work needing a contractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Owning organization; its private technician pool is searched first.
    pub org_id: Option<OrgId>,
    pub trade: Trade,
    pub urgency: Urgency,
    /// Geocoded job site. Missing coordinates disqualify distance ranking.
    pub point: Option<GeoPoint>,
    pub city: String,
    pub state: String,
    /// Requested service window start, when the customer picked one.
    pub scheduled_for: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(trade: Trade, urgency: Urgency, city: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            org_id: None,
            trade,
            urgency,
            point: None,
            city: city.into(),
            state: state.into(),
            scheduled_for: None,
            status: JobStatus::Matching,
            created_at: Utc::now(),
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

    pub fn with_schedule(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    /// Human-readable location for error messages ("Tampa, FL").
    pub fn location_label(&self) -> String {
        format!("{}, {}", self.city, self.state)
    }

    pub fn mark_dispatched(&mut self) {
        self.status = JobStatus::Dispatched;
    }
}
