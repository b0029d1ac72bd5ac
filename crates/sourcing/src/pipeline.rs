//! Stage orchestration: select, verify, promote.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use tradecast_core::ColdLeadId;
use tradecast_infra::{
    BackoffExecutor, CandidateRanker, Datastore, DatastoreError, EmailFinder, RemoteError,
};
use tradecast_model::{ColdLead, Job, PipelineStats};

use crate::ranker::RankerAdapter;
use crate::verifier::EmailVerifier;

/// Stage-1 fetch bound: at most this many unselected records per run.
const MAX_STAGING_FETCH: usize = 100;

/// Sourcing pipeline configuration.
#[derive(Debug, Clone)]
pub struct SourcingConfig {
    /// Stage-1 selection cap.
    pub select_limit: usize,
    /// Stage-2 verification cap (further capped by remaining credits).
    pub verify_limit: usize,
    /// Minimum discovery confidence for verification and promotion.
    pub min_confidence: u8,
    /// Skip the whole run when dispatchable cold leads already exist for the
    /// job's state + trade, avoiding redundant paid API usage.
    pub skip_if_cold_exists: bool,
}

impl Default for SourcingConfig {
    fn default() -> Self {
        Self {
            select_limit: 20,
            verify_limit: 10,
            min_confidence: 70,
            skip_if_cold_exists: true,
        }
    }
}

impl SourcingConfig {
    pub fn with_select_limit(mut self, limit: usize) -> Self {
        self.select_limit = limit;
        self
    }

    pub fn with_verify_limit(mut self, limit: usize) -> Self {
        self.verify_limit = limit;
        self
    }

    pub fn with_min_confidence(mut self, confidence: u8) -> Self {
        self.min_confidence = confidence;
        self
    }

    pub fn with_skip_if_cold_exists(mut self, skip: bool) -> Self {
        self.skip_if_cold_exists = skip;
        self
    }
}

/// Hard failure of a pipeline run.
///
/// An empty run is not an error — it comes back as a `skipped_reason` in the
/// outcome. AI-ranking failures never appear here at all; the ranker adapter
/// absorbs them. Verification faults do appear: a dead provider is not the
/// same as having nothing to verify.
#[derive(Debug, Error)]
pub enum SourcingError {
    /// The paid verification budget is fully spent.
    #[error("email verification credits exhausted")]
    CreditsExhausted,

    /// The verification provider could not be reached, even after retries.
    /// Distinct from "nothing to verify": this is an infrastructure fault.
    #[error("verification service unavailable: {0}")]
    VerificationUnavailable(RemoteError),

    #[error(transparent)]
    Datastore(#[from] DatastoreError),
}

/// What one pipeline run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcingOutcome {
    pub stats: PipelineStats,
    /// Leads newly inserted by this run (dedup-marked records excluded).
    pub new_lead_ids: Vec<ColdLeadId>,
}

impl SourcingOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            stats: PipelineStats {
                skipped_reason: Some(reason.into()),
                ..PipelineStats::default()
            },
            new_lead_ids: Vec::new(),
        }
    }
}

/// The three-stage cold-lead sourcing pipeline.
///
/// Invoked only on a warm-candidate shortfall. Stages are fixed in order and
/// each is checkpointed in the staging records, so a crash mid-run loses no
/// completed work and a re-run picks up where the last one stopped.
pub struct SourcingPipeline {
    store: Arc<dyn Datastore>,
    ranker: Option<Arc<dyn CandidateRanker>>,
    finder: Option<Arc<dyn EmailFinder>>,
    executor: BackoffExecutor,
    config: SourcingConfig,
}

impl SourcingPipeline {
    pub fn new(store: Arc<dyn Datastore>, config: SourcingConfig) -> Self {
        Self {
            store,
            ranker: None,
            finder: None,
            executor: BackoffExecutor::default(),
            config,
        }
    }

    pub fn with_backoff(mut self, executor: BackoffExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_candidate_ranker(mut self, ranker: Arc<dyn CandidateRanker>) -> Self {
        self.ranker = Some(ranker);
        self
    }

    pub fn with_email_finder(mut self, finder: Arc<dyn EmailFinder>) -> Self {
        self.finder = Some(finder);
        self
    }

    /// Run all three stages for a job.
    pub async fn run(&self, job: &Job) -> Result<SourcingOutcome, SourcingError> {
        if self.config.skip_if_cold_exists {
            let existing = self
                .store
                .count_undispatched_cold(&job.state, &job.trade)
                .await?;
            if existing > 0 {
                info!(job = %job.id, existing, "cold leads already available, skipping sourcing");
                return Ok(SourcingOutcome::skipped(format!(
                    "{existing} dispatchable cold leads already exist for {} / {}",
                    job.state, job.trade
                )));
            }
        }

        let mut stats = PipelineStats::default();

        // Stage 1: selection.
        let candidates = self
            .store
            .unselected_staging(&job.state, MAX_STAGING_FETCH)
            .await?;
        if !candidates.is_empty() {
            let adapter = RankerAdapter::new(self.ranker.clone(), self.executor.clone());
            let selections = adapter
                .select(job, &candidates, self.config.select_limit)
                .await;
            if !selections.is_empty() {
                let batch: Vec<_> = selections.iter().map(|s| (s.id, s.score)).collect();
                self.store
                    .mark_staging_selected(&batch, Utc::now())
                    .await?;
                stats.selected = selections.len() as u32;
            }
        }

        // Stage 2: verification, bounded by the paid budget.
        match &self.finder {
            None => {
                stats.skipped_reason = Some("email verification not configured".into());
            }
            Some(finder) => {
                let verifier = EmailVerifier::new(
                    finder.clone(),
                    self.executor.clone(),
                    self.config.min_confidence,
                );
                match verifier.available_credits().await {
                    Err(err) => {
                        warn!(error = %err, "could not check verification credits");
                        return Err(SourcingError::VerificationUnavailable(err));
                    }
                    Ok(0) => return Err(SourcingError::CreditsExhausted),
                    Ok(credits) => {
                        let cap = self.config.verify_limit.min(credits as usize);
                        let records = self
                            .store
                            .selected_unverified_staging(&job.state, cap)
                            .await?;
                        if !records.is_empty() {
                            let run = verifier.verify_batch(self.store.as_ref(), &records).await?;
                            stats.verified = run.verified;
                            stats.credits_used = run.credits_used;
                        }
                    }
                }
            }
        }

        // Stage 3: promotion with email dedup.
        let mut new_lead_ids = Vec::new();
        let promotable = self.store.promotable_staging(&job.state).await?;
        for record in promotable {
            if !record.promotable(self.config.min_confidence) {
                continue;
            }
            // promotable() guarantees the email is present.
            let Some(email) = record.email.clone() else {
                continue;
            };

            let duplicate = self.store.find_cold_lead_by_email(&email).await?.is_some();
            if duplicate {
                self.store.mark_staging_moved(record.id).await?;
                stats.moved += 1;
                continue;
            }

            let lead = ColdLead::promoted_from(&record, email);
            match self.store.insert_cold_lead(lead).await {
                Ok(id) => {
                    new_lead_ids.push(id);
                    self.store.mark_staging_moved(record.id).await?;
                    stats.moved += 1;
                }
                // Lost a race with a concurrent promotion; same as dedup.
                Err(DatastoreError::Conflict(_)) => {
                    self.store.mark_staging_moved(record.id).await?;
                    stats.moved += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        if stats.selected == 0 && stats.verified == 0 && stats.moved == 0 {
            stats.skipped_reason.get_or_insert_with(|| {
                format!(
                    "no staging candidates available for {} / {}",
                    job.state, job.trade
                )
            });
        }

        info!(
            job = %job.id,
            selected = stats.selected,
            verified = stats.verified,
            moved = stats.moved,
            credits_used = stats.credits_used,
            "sourcing pipeline finished"
        );

        Ok(SourcingOutcome {
            stats,
            new_lead_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tradecast_core::GeoPoint;
    use tradecast_infra::{
        AccountStatus, EmailMatch, EmailQuery, InMemoryDatastore, RemoteError,
    };
    use tradecast_model::{StagingRecord, Trade, Urgency};

    use super::*;

    fn job() -> Job {
        Job::new(Trade::new("HVAC"), Urgency::Urgent, "Tampa", "FL")
            .with_point(GeoPoint::new(27.9506, -82.4572))
    }

    fn staging(name: &str) -> StagingRecord {
        StagingRecord::new(name, Trade::new("HVAC"), "FL")
            .with_city("Tampa")
            .with_license_status("active")
            .with_phone("813-555-0100")
    }

    struct CountingFinder {
        credits: u32,
        confidence: u8,
        find_calls: AtomicU32,
    }

    impl CountingFinder {
        fn new(credits: u32, confidence: u8) -> Self {
            Self {
                credits,
                confidence,
                find_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl EmailFinder for CountingFinder {
        async fn find(&self, query: &EmailQuery) -> Result<EmailMatch, RemoteError> {
            self.find_calls.fetch_add(1, Ordering::SeqCst);
            Ok(EmailMatch {
                email: Some(format!("info@{}", query.domain)),
                confidence: self.confidence,
            })
        }

        async fn account_status(&self) -> Result<AccountStatus, RemoteError> {
            Ok(AccountStatus {
                verifications_available: self.credits,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_run_selects_verifies_and_promotes() {
        let store = Arc::new(InMemoryDatastore::new());
        store.seed_staging(staging("Bay Area Cooling LLC"));

        let finder = Arc::new(CountingFinder::new(100, 90));
        let pipeline = SourcingPipeline::new(store.clone(), SourcingConfig::default())
            .with_email_finder(finder.clone());

        let outcome = pipeline.run(&job()).await.unwrap();

        assert_eq!(outcome.stats.selected, 1);
        assert_eq!(outcome.stats.verified, 1);
        assert_eq!(outcome.stats.moved, 1);
        assert_eq!(outcome.stats.credits_used, 1);
        assert_eq!(outcome.new_lead_ids.len(), 1);
        assert!(outcome.stats.skipped_reason.is_none());

        let lead = store.cold_lead(outcome.new_lead_ids[0]).unwrap();
        assert_eq!(lead.email, "info@bayareacooling.com");
        assert_eq!(lead.supersearch_query, "HVAC contractors in Tampa, FL");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_credits_aborts_with_typed_error_and_no_find_calls() {
        let store = Arc::new(InMemoryDatastore::new());
        store.seed_staging(staging("Bay Area Cooling LLC"));

        let finder = Arc::new(CountingFinder::new(0, 90));
        let pipeline = SourcingPipeline::new(store, SourcingConfig::default())
            .with_email_finder(finder.clone());

        let err = pipeline.run(&job()).await.unwrap_err();

        assert!(matches!(err, SourcingError::CreditsExhausted));
        assert_eq!(finder.find_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_verification_service_is_a_hard_error() {
        struct DownFinder {
            status_calls: AtomicU32,
            find_calls: AtomicU32,
        }

        #[async_trait]
        impl EmailFinder for DownFinder {
            async fn find(&self, _query: &EmailQuery) -> Result<EmailMatch, RemoteError> {
                self.find_calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::status(503, "maintenance"))
            }

            async fn account_status(&self) -> Result<AccountStatus, RemoteError> {
                self.status_calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::status(503, "maintenance"))
            }
        }

        let store = Arc::new(InMemoryDatastore::new());
        store.seed_staging(staging("Bay Area Cooling LLC"));

        let finder = Arc::new(DownFinder {
            status_calls: AtomicU32::new(0),
            find_calls: AtomicU32::new(0),
        });
        let pipeline = SourcingPipeline::new(store, SourcingConfig::default())
            .with_email_finder(finder.clone());

        let err = pipeline.run(&job()).await.unwrap_err();

        assert!(matches!(err, SourcingError::VerificationUnavailable(_)));
        // The credit check was retried before surfacing, and no paid
        // discovery call was ever attempted.
        assert_eq!(finder.status_calls.load(Ordering::SeqCst), 4);
        assert_eq!(finder.find_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn verification_work_is_capped_by_remaining_credits() {
        let store = Arc::new(InMemoryDatastore::new());
        for i in 0..5 {
            store.seed_staging(staging(&format!("Company {i}")));
        }

        let finder = Arc::new(CountingFinder::new(2, 90));
        let pipeline = SourcingPipeline::new(store, SourcingConfig::default())
            .with_email_finder(finder.clone());

        let outcome = pipeline.run(&job()).await.unwrap();

        assert_eq!(outcome.stats.selected, 5);
        assert_eq!(finder.find_calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.stats.credits_used, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_email_promotes_without_second_insert() {
        let store = Arc::new(InMemoryDatastore::new());
        // Two staged businesses that derive the same discovery domain.
        store.seed_staging(staging("Bay Area Cooling LLC"));
        store.seed_staging(staging("Bay Area Cooling"));

        let finder = Arc::new(CountingFinder::new(100, 90));
        let pipeline = SourcingPipeline::new(store.clone(), SourcingConfig::default())
            .with_email_finder(finder);

        let outcome = pipeline.run(&job()).await.unwrap();

        // Both records moved, but only one lead exists.
        assert_eq!(outcome.stats.moved, 2);
        assert_eq!(outcome.new_lead_ids.len(), 1);
        assert!(store
            .find_cold_lead_by_email("info@bayareacooling.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn existing_cold_pool_skips_the_run() {
        let store = Arc::new(InMemoryDatastore::new());
        store.seed_staging(staging("Should Not Be Touched"));
        let promoted = tradecast_model::ColdLead::promoted_from(
            &staging("Existing Co"),
            "existing@example.com".into(),
        );
        store.seed_cold_lead(promoted);

        let finder = Arc::new(CountingFinder::new(100, 90));
        let pipeline = SourcingPipeline::new(store.clone(), SourcingConfig::default())
            .with_email_finder(finder.clone());

        let outcome = pipeline.run(&job()).await.unwrap();

        assert!(outcome.stats.skipped_reason.is_some());
        assert_eq!(outcome.stats.selected, 0);
        assert_eq!(finder.find_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pipeline_is_a_skip_not_an_error() {
        let store = Arc::new(InMemoryDatastore::new());
        let finder = Arc::new(CountingFinder::new(100, 90));
        let pipeline = SourcingPipeline::new(store, SourcingConfig::default())
            .with_email_finder(finder);

        let outcome = pipeline.run(&job()).await.unwrap();

        assert_eq!(outcome.stats, PipelineStats {
            skipped_reason: Some("no staging candidates available for FL / HVAC".into()),
            ..PipelineStats::default()
        });
    }

    #[tokio::test(start_paused = true)]
    async fn low_confidence_records_are_not_promoted() {
        let store = Arc::new(InMemoryDatastore::new());
        let record = staging("Weak Signal Co");
        let id = record.id;
        store.seed_staging(record);

        let finder = Arc::new(CountingFinder::new(100, 40));
        let pipeline = SourcingPipeline::new(store.clone(), SourcingConfig::default())
            .with_email_finder(finder);

        let outcome = pipeline.run(&job()).await.unwrap();

        assert_eq!(outcome.stats.selected, 1);
        assert_eq!(outcome.stats.verified, 0);
        assert_eq!(outcome.stats.moved, 0);
        assert!(outcome.new_lead_ids.is_empty());

        // Checkpointed as terminally failed; a re-run will not re-verify it.
        let record = store.staging_record(id).unwrap();
        assert_eq!(record.email_verified, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_finder_still_promotes_previously_verified_records() {
        let store = Arc::new(InMemoryDatastore::new());
        let mut record = staging("Verified Earlier LLC");
        record.mark_selected(85, Utc::now());
        record.record_verification(Some("info@verifiedearlier.com".into()), Some(88), true, Utc::now());
        store.seed_staging(record);

        let pipeline = SourcingPipeline::new(store.clone(), SourcingConfig::default());
        let outcome = pipeline.run(&job()).await.unwrap();

        assert_eq!(outcome.stats.moved, 1);
        assert_eq!(outcome.new_lead_ids.len(), 1);
        assert_eq!(
            outcome.stats.skipped_reason.as_deref(),
            Some("email verification not configured")
        );
    }
}
