use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradecast_core::{GeoPoint, StagingId};

use crate::job::Trade;

/// License statuses that disqualify a staging record outright.
const DISQUALIFIED_LICENSE: [&str; 3] = ["expired", "inactive", "revoked"];

/// A raw, unverified lead harvested from public license/registry data.
///
/// Created by an external harvester; this core only advances it through the
/// sourcing stages, strictly in order:
///
/// unselected -> `ai_selected` -> `email_verified` (true or terminally false)
/// -> `moved_to_cold`
///
/// Each stage is checkpointed in place so a crash mid-pipeline loses no
/// completed work. Stages never reverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
    pub id: StagingId,
    pub business_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub trade: Trade,
    /// Raw license status string from the registry ("active", "expired", ...).
    pub license_status: Option<String>,
    pub city: Option<String>,
    pub state: String,
    pub phone: Option<String>,
    pub point: Option<GeoPoint>,

    // Stage 1: AI selection.
    pub ai_selected: bool,
    pub ai_selected_at: Option<DateTime<Utc>>,
    pub ai_score: Option<u8>,

    // Stage 2: email discovery & verification.
    pub email: Option<String>,
    pub email_confidence: Option<u8>,
    /// `None` = never attempted; `Some(false)` = attempted and terminally failed.
    pub email_verified: Option<bool>,
    pub email_checked_at: Option<DateTime<Utc>>,

    // Stage 3: promotion.
    pub moved_to_cold: bool,

    pub created_at: DateTime<Utc>,
}

impl StagingRecord {
    pub fn new(business_name: impl Into<String>, trade: Trade, state: impl Into<String>) -> Self {
        Self {
            id: StagingId::new(),
            business_name: business_name.into(),
            first_name: None,
            last_name: None,
            trade,
            license_status: None,
            city: None,
            state: state.into(),
            phone: None,
            point: None,
            ai_selected: false,
            ai_selected_at: None,
            ai_score: None,
            email: None,
            email_confidence: None,
            email_verified: None,
            email_checked_at: None,
            moved_to_cold: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_contact(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    pub fn with_license_status(mut self, status: impl Into<String>) -> Self {
        self.license_status = Some(status.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_point(mut self, point: GeoPoint) -> Self {
        self.point = Some(point);
        self
    }

    /// Whether the license string marks the record as active.
    pub fn license_active(&self) -> bool {
        self.license_status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("active"))
    }

    /// Whether the license string disqualifies the record from selection.
    pub fn license_disqualified(&self) -> bool {
        self.license_status
            .as_deref()
            .is_some_and(|s| DISQUALIFIED_LICENSE.iter().any(|d| s.eq_ignore_ascii_case(d)))
    }

    /// Stage 1 checkpoint: the record won AI (or heuristic) selection.
    pub fn mark_selected(&mut self, score: u8, at: DateTime<Utc>) {
        self.ai_selected = true;
        self.ai_selected_at = Some(at);
        self.ai_score = Some(score);
    }

    /// Stage 2 checkpoint: one discovery attempt, success or failure.
    ///
    /// A failed attempt may still carry a low-confidence email; recording it
    /// keeps the pipeline resumable without ever re-verifying this record.
    pub fn record_verification(
        &mut self,
        email: Option<String>,
        confidence: Option<u8>,
        verified: bool,
        at: DateTime<Utc>,
    ) {
        self.email = email;
        self.email_confidence = confidence;
        self.email_verified = Some(verified);
        self.email_checked_at = Some(at);
    }

    /// Stage 3 checkpoint: promoted (or deduplicated away) into the cold pool.
    pub fn mark_moved(&mut self) {
        self.moved_to_cold = true;
    }

    /// Whether the record is eligible for promotion into the cold pool.
    pub fn promotable(&self, min_confidence: u8) -> bool {
        self.ai_selected
            && self.email_verified == Some(true)
            && !self.moved_to_cold
            && self.email.is_some()
            && self.email_confidence.unwrap_or(0) >= min_confidence
    }

    /// Best-effort contact name: person name when harvested, else the
    /// business name as a last name.
    pub fn contact_name(&self) -> (Option<&str>, Option<&str>) {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => (Some(f), Some(l)),
            (Some(f), None) => (Some(f), None),
            _ => (None, Some(self.business_name.as_str())),
        }
    }
}
