//! `tradecast-dispatch` — warm-candidate matching and the dispatch
//! orchestrator.
//!
//! The orchestrator is the top-level state machine per job: idempotency
//! check, warm/cold candidate assembly, recipient bookkeeping, concurrent
//! best-effort sends, stats aggregation, and the job-status transition.

pub mod matching;
pub mod orchestrator;

pub use matching::{rank_warm, CompositeScorer, WarmMatch, WarmScorer};
pub use orchestrator::{DispatchConfig, DispatchOutcome, Dispatcher, SendFailure};
