//! Abstract datastore for the dispatch core.
//!
//! CRUD plus the filtered queries the pipeline relies on, keyed by id. No
//! transactions are assumed across calls; the one multi-call race that
//! matters (outreach creation) is closed by giving `insert_outreach`
//! insert-or-conflict semantics keyed on job id.

mod in_memory;

pub use in_memory::InMemoryDatastore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use tradecast_core::{ColdLeadId, JobId, OrgId, RecipientId, StagingId, TechnicianId};
use tradecast_model::{ColdLead, Job, JobStatus, Outreach, Recipient, StagingRecord, Technician, Trade};

/// Datastore operation error.
///
/// Infrastructure failures only; business rules live in the dispatch core.
#[derive(Debug, Error)]
pub enum DatastoreError {
    /// A write targeted a row that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness guarantee rejected the write (duplicate outreach job id,
    /// duplicate cold-lead email).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing store failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl DatastoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Storage operations used by the dispatch and sourcing pipelines.
///
/// Implementations must uphold two uniqueness guarantees:
/// - at most one `Outreach` per job id (`insert_outreach` conflicts);
/// - at most one `ColdLead` per email, compared case-insensitively
///   (`insert_cold_lead` conflicts).
#[async_trait]
pub trait Datastore: Send + Sync {
    // Jobs -----------------------------------------------------------------

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, DatastoreError>;

    async fn update_job_status(&self, id: JobId, status: JobStatus) -> Result<(), DatastoreError>;

    // Technicians (warm pool) ---------------------------------------------

    /// Available, opted-in technicians matching the trade, drawn from the
    /// organization's own pool plus the shared public pool.
    async fn available_technicians(
        &self,
        org_id: Option<OrgId>,
        trade: &Trade,
    ) -> Result<Vec<Technician>, DatastoreError>;

    async fn mark_technician_dispatched(
        &self,
        id: TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<(), DatastoreError>;

    // Staging records (cold pool, stages 1–3) ------------------------------

    /// Most-recent unselected records for a state, newest first.
    async fn unselected_staging(
        &self,
        state: &str,
        limit: usize,
    ) -> Result<Vec<StagingRecord>, DatastoreError>;

    /// Stage-1 checkpoint: mark each `(record, score)` pair selected, in one
    /// batch.
    async fn mark_staging_selected(
        &self,
        selections: &[(StagingId, u8)],
        at: DateTime<Utc>,
    ) -> Result<(), DatastoreError>;

    /// Selected records that have never been through email verification.
    async fn selected_unverified_staging(
        &self,
        state: &str,
        limit: usize,
    ) -> Result<Vec<StagingRecord>, DatastoreError>;

    /// Stage-2 checkpoint: persist one verification attempt, success or not.
    async fn record_staging_verification(
        &self,
        id: StagingId,
        email: Option<String>,
        confidence: Option<u8>,
        verified: bool,
        at: DateTime<Utc>,
    ) -> Result<(), DatastoreError>;

    /// Records ready for stage 3: selected, verified, not yet moved.
    async fn promotable_staging(&self, state: &str) -> Result<Vec<StagingRecord>, DatastoreError>;

    /// Stage-3 checkpoint: the record reached the cold pool (or was
    /// deduplicated away).
    async fn mark_staging_moved(&self, id: StagingId) -> Result<(), DatastoreError>;

    // Cold leads -----------------------------------------------------------

    async fn find_cold_lead_by_email(
        &self,
        email: &str,
    ) -> Result<Option<ColdLead>, DatastoreError>;

    /// Insert a promoted lead; conflicts when the email already exists.
    async fn insert_cold_lead(&self, lead: ColdLead) -> Result<ColdLeadId, DatastoreError>;

    /// Count of dispatchable (never-dispatched, subscribed) leads matching
    /// state + trade. Same trade contract as [`Self::dispatchable_cold_leads`].
    async fn count_undispatched_cold(
        &self,
        state: &str,
        trade: &Trade,
    ) -> Result<u64, DatastoreError>;

    /// Dispatchable (never-dispatched, subscribed) leads matching state +
    /// trade. A generic "General" lead matches any trade, mirroring the
    /// staging pre-filter that admitted it.
    async fn dispatchable_cold_leads(
        &self,
        state: &str,
        trade: &Trade,
    ) -> Result<Vec<ColdLead>, DatastoreError>;

    async fn mark_cold_lead_dispatched(
        &self,
        id: ColdLeadId,
        at: DateTime<Utc>,
    ) -> Result<(), DatastoreError>;

    // Outreach & recipients ------------------------------------------------

    async fn outreach_for_job(&self, job_id: JobId) -> Result<Option<Outreach>, DatastoreError>;

    /// Insert-or-conflict keyed on job id: a second outreach for the same
    /// job is rejected with [`DatastoreError::Conflict`].
    async fn insert_outreach(&self, outreach: Outreach) -> Result<(), DatastoreError>;

    /// Replace the stored outreach (send counts, status, pipeline stats).
    async fn update_outreach(&self, outreach: Outreach) -> Result<(), DatastoreError>;

    /// Batch-insert one channel's recipients.
    async fn insert_recipients(&self, recipients: Vec<Recipient>) -> Result<(), DatastoreError>;

    /// Flag recipients whose send was confirmed. Best-effort bookkeeping;
    /// callers log and swallow failures here.
    async fn mark_recipients_sent(&self, ids: &[RecipientId]) -> Result<(), DatastoreError>;
}
