//! Dispatch error model.

use thiserror::Error;

use crate::id::{JobId, OutreachId};

/// Result type used across the dispatch core.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Typed failure surfaced to a dispatch caller.
///
/// Keep this focused on business-rule failures (duplicate dispatch, empty
/// candidate pools, budget exhaustion). Remote-call classification lives with
/// the remote capabilities; storage failures are flattened to a message here
/// so the core stays infrastructure-free.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The job already has an outreach; a dispatch happens at most once.
    #[error("job already dispatched (outreach {outreach_id})")]
    AlreadyDispatched { outreach_id: OutreachId },

    /// The job id does not resolve to a known job.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Neither channel produced a single candidate.
    #[error("no contractors found in {location}")]
    NoCandidates { location: String },

    /// The paid verification budget is spent; cold sourcing cannot run.
    #[error("email verification credits exhausted")]
    CreditsExhausted,

    /// The email-verification provider was unreachable even after retries.
    #[error("verification service unavailable: {0}")]
    VerificationUnavailable(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A storage operation failed while doing work the dispatch cannot
    /// proceed without (creating the outreach or its recipients).
    #[error("datastore error: {0}")]
    Datastore(String),
}

impl DispatchError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn datastore(msg: impl Into<String>) -> Self {
        Self::Datastore(msg.into())
    }

    /// Whether the failure is a business rule rather than an infrastructure
    /// fault. Business failures are terminal and must not be retried.
    pub fn is_business_rule(&self) -> bool {
        !matches!(self, Self::Datastore(_) | Self::VerificationUnavailable(_))
    }
}
