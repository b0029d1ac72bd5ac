//! Remote capability contracts and the transient/permanent error taxonomy.
//!
//! Concrete wire formats belong to the collaborators behind these traits
//! (an AI ranking API, an email-discovery API, a transactional mailer); the
//! pipeline only depends on the contracts here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tradecast_core::{GeoPoint, JobId, RecipientId, StagingId};
use tradecast_model::{LeadSource, Trade, Urgency};

/// Failure of a remote call, classified for retry purposes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network/transport failure: the request may never have reached the
    /// upstream. Always retriable.
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream answered with a non-success status.
    #[error("upstream returned {code}: {message}")]
    Status { code: u16, message: String },
}

impl RemoteError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Retry discipline: transport failures, 5xx, and 429 are transient;
    /// any other 4xx is a permanent rejection of the request.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { code, .. } => *code >= 500 || *code == 429,
        }
    }
}

/// A staging candidate reduced to the compact summary sent to the ranking
/// capability. Bounded context: callers truncate the candidate list before
/// building these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankCandidate {
    pub id: StagingId,
    pub business_name: String,
    pub trade: Trade,
    pub city: Option<String>,
    pub state: String,
    pub license_status: Option<String>,
    /// Distance from the job site, when both sides have coordinates.
    pub miles_from_job: Option<f64>,
}

/// What the ranking capability should optimize for, in priority order:
/// proximity, then trade match, then license-active, then classification
/// specificity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankCriteria {
    pub trade: Trade,
    pub city: String,
    pub state: String,
    pub point: Option<GeoPoint>,
}

/// One selection returned by the ranking capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankSelection {
    pub id: StagingId,
    /// 0–100; out-of-range values are treated as a malformed response.
    pub score: u8,
    pub reason: String,
}

/// AI-assisted candidate ranking.
///
/// Implementations must be safely callable with a bounded candidate count;
/// callers never see a failure here surface to the dispatch — the adapter
/// falls back to its deterministic heuristic.
#[async_trait]
pub trait CandidateRanker: Send + Sync {
    async fn rank(
        &self,
        candidates: &[RankCandidate],
        criteria: &RankCriteria,
        limit: usize,
    ) -> Result<Vec<RankSelection>, RemoteError>;
}

/// Inputs to one email-discovery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailQuery {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: String,
    /// Company-derived domain the discovery runs against.
    pub domain: String,
}

/// Discovery result: an address (when one was found) and the provider's
/// confidence in it, 0–100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMatch {
    pub email: Option<String>,
    pub confidence: u8,
}

/// Remaining paid-verification budget on the provider account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub verifications_available: u32,
}

/// Per-candidate email discovery against a metered budget.
#[async_trait]
pub trait EmailFinder: Send + Sync {
    async fn find(&self, query: &EmailQuery) -> Result<EmailMatch, RemoteError>;

    async fn account_status(&self) -> Result<AccountStatus, RemoteError>;
}

/// Template context for one outbound dispatch email.
///
/// `recipient_id` doubles as the response-tracking token the mailer embeds;
/// reply/click correlation happens outside this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub recipient_id: RecipientId,
    pub job_id: JobId,
    pub trade: Trade,
    pub city: String,
    pub state: String,
    pub urgency: Urgency,
    pub lead_source: LeadSource,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Literal email transport. Invoked independently per recipient; one failed
/// send never aborts the others.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_server_errors_are_transient() {
        assert!(RemoteError::transport("connection reset").is_transient());
        assert!(RemoteError::status(500, "internal").is_transient());
        assert!(RemoteError::status(503, "unavailable").is_transient());
        assert!(RemoteError::status(429, "rate limited").is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!RemoteError::status(400, "bad request").is_transient());
        assert!(!RemoteError::status(401, "unauthorized").is_transient());
        assert!(!RemoteError::status(404, "not found").is_transient());
    }
}
