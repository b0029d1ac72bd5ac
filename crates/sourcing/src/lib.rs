//! `tradecast-sourcing` — the cold-lead sourcing pipeline.
//!
//! Three stages, each independently checkpointed in the staging records:
//!
//! 1. AI-assisted selection with a deterministic heuristic fallback
//!    ([`ranker`]);
//! 2. email discovery & verification against a paid budget ([`verifier`]);
//! 3. promotion of verified records into the dispatchable cold pool
//!    ([`pipeline`]).

pub mod pipeline;
pub mod ranker;
pub mod verifier;

pub use pipeline::{SourcingConfig, SourcingError, SourcingOutcome, SourcingPipeline};
pub use ranker::RankerAdapter;
pub use verifier::{EmailVerifier, VerificationRun};
