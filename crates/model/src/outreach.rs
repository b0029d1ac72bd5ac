use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradecast_core::{ColdLeadId, JobId, OutreachId, RecipientId, TechnicianId};

/// Which pool a recipient came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Warm,
    ColdSupersearch,
}

/// How the recipient was contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMethod {
    Email,
}

/// Outreach lifecycle: `Pending` while recipients are being created and sent,
/// `Active` once send counts are finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutreachStatus {
    Pending,
    Active,
}

/// Counters produced by one lead-sourcing pipeline run, persisted on the
/// outreach for auditability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Staging records selected in stage 1.
    pub selected: u32,
    /// Records whose email discovery met the confidence floor in stage 2.
    pub verified: u32,
    /// Records promoted (or dedup-marked) into the cold pool in stage 3.
    pub moved: u32,
    /// Paid verification calls consumed by this run.
    pub credits_used: u32,
    /// Set when the pipeline had nothing to do; distinct from a hard error.
    pub skipped_reason: Option<String>,
}

/// The single dispatch record for one job's one-time send event.
///
/// Its existence (unique per job id) is the idempotency guard: a second
/// dispatch request for the same job is rejected, not re-executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outreach {
    pub id: OutreachId,
    pub job_id: JobId,
    pub total_recipients: u32,
    pub warm_sent: u32,
    pub cold_sent: u32,
    pub warm_opened: u32,
    pub cold_opened: u32,
    pub warm_replied: u32,
    pub cold_replied: u32,
    pub pipeline_stats: Option<PipelineStats>,
    pub status: OutreachStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Outreach {
    pub fn new(job_id: JobId, total_recipients: u32) -> Self {
        let now = Utc::now();
        Self {
            id: OutreachId::new(),
            job_id,
            total_recipients,
            warm_sent: 0,
            cold_sent: 0,
            warm_opened: 0,
            cold_opened: 0,
            warm_replied: 0,
            cold_replied: 0,
            pipeline_stats: None,
            status: OutreachStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_pipeline_stats(mut self, stats: PipelineStats) -> Self {
        self.pipeline_stats = Some(stats);
        self
    }

    /// Finalize confirmed send counts and activate the outreach.
    pub fn record_send_results(&mut self, warm_sent: u32, cold_sent: u32) {
        self.warm_sent = warm_sent;
        self.cold_sent = cold_sent;
        self.status = OutreachStatus::Active;
        self.updated_at = Utc::now();
    }
}

/// Exactly one addressable target; the enum makes "exactly one of
/// technician_id / cold_lead_id" unrepresentable to violate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientTarget {
    Technician(TechnicianId),
    ColdLead(ColdLeadId),
}

impl RecipientTarget {
    pub fn lead_source(&self) -> LeadSource {
        match self {
            Self::Technician(_) => LeadSource::Warm,
            Self::ColdLead(_) => LeadSource::ColdSupersearch,
        }
    }
}

/// One addressable candidate within one outreach, used to correlate inbound
/// replies/clicks back to a specific target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub outreach_id: OutreachId,
    pub target: RecipientTarget,
    pub lead_source: LeadSource,
    pub dispatch_method: DispatchMethod,
    pub email: String,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl Recipient {
    pub fn new(outreach_id: OutreachId, target: RecipientTarget, email: impl Into<String>) -> Self {
        Self {
            id: RecipientId::new(),
            outreach_id,
            lead_source: target.lead_source(),
            target,
            dispatch_method: DispatchMethod::Email,
            email: email.into(),
            email_sent: false,
            created_at: Utc::now(),
        }
    }
}
