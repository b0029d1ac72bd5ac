//! `tradecast-infra` — storage and remote-capability infrastructure.
//!
//! Holds the [`Datastore`] abstraction (with an in-memory implementation for
//! tests/dev), the transient/permanent remote error taxonomy, the capability
//! traits the pipeline calls out to (`CandidateRanker`, `EmailFinder`,
//! `Mailer`), and the shared retrying [`BackoffExecutor`] that wraps every
//! remote call site.

pub mod datastore;
pub mod remote;
pub mod retry;

pub use datastore::{Datastore, DatastoreError, InMemoryDatastore};
pub use remote::{
    AccountStatus, CandidateRanker, EmailFinder, EmailMatch, EmailQuery, Mailer, OutboundEmail,
    RankCandidate, RankCriteria, RankSelection, RemoteError,
};
pub use retry::{BackoffConfig, BackoffExecutor};
