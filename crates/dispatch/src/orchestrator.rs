//! The top-level dispatch state machine.
//!
//! Per job: idempotency check, warm/cold candidate assembly, outreach and
//! recipient bookkeeping, concurrent best-effort sends, stats aggregation,
//! and the `Matching -> Dispatched` status transition.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};

use tradecast_core::{DispatchError, DispatchResult, JobId, OutreachId, RecipientId};
use tradecast_infra::{
    BackoffConfig, BackoffExecutor, CandidateRanker, Datastore, DatastoreError, EmailFinder,
    Mailer, OutboundEmail,
};
use tradecast_model::{
    ColdLead, Job, JobStatus, Outreach, PipelineStats, Recipient, RecipientTarget,
};
use tradecast_sourcing::{SourcingConfig, SourcingError, SourcingPipeline};

use crate::matching::{rank_warm, CompositeScorer, WarmScorer};

/// Orchestrator configuration: retry discipline for remote capabilities and
/// the sourcing pipeline's limits.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    pub backoff: BackoffConfig,
    pub sourcing: SourcingConfig,
}

impl DispatchConfig {
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_sourcing(mut self, sourcing: SourcingConfig) -> Self {
        self.sourcing = sourcing;
        self
    }
}

/// One recipient whose send failed; retained for diagnostics, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    pub recipient_id: RecipientId,
    pub email: String,
    pub error: String,
}

/// What a completed dispatch produced.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub outreach_id: OutreachId,
    /// Candidates assembled per channel.
    pub warm_count: u32,
    pub cold_count: u32,
    /// Confirmed successful sends per channel.
    pub warm_sent: u32,
    pub cold_sent: u32,
    /// Present when the cold-sourcing pipeline ran.
    pub pipeline: Option<PipelineStats>,
    pub send_failures: Vec<SendFailure>,
}

/// Dispatches a job to warm and cold candidates, at most once per job.
///
/// All capabilities are injected at construction; a missing ranker or email
/// finder is a legitimate configuration, not an error.
pub struct Dispatcher {
    store: Arc<dyn Datastore>,
    mailer: Arc<dyn Mailer>,
    scorer: Arc<dyn WarmScorer>,
    ranker: Option<Arc<dyn CandidateRanker>>,
    finder: Option<Arc<dyn EmailFinder>>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Datastore>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            mailer,
            scorer: Arc::new(CompositeScorer),
            ranker: None,
            finder: None,
            config: DispatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_warm_scorer(mut self, scorer: Arc<dyn WarmScorer>) -> Self {
        self.scorer = scorer;
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

    fn sourcing_pipeline(&self) -> SourcingPipeline {
        let mut pipeline = SourcingPipeline::new(self.store.clone(), self.config.sourcing.clone())
            .with_backoff(BackoffExecutor::new(self.config.backoff.clone()));
        if let Some(ranker) = &self.ranker {
            pipeline = pipeline.with_candidate_ranker(ranker.clone());
        }
        if let Some(finder) = &self.finder {
            pipeline = pipeline.with_email_finder(finder.clone());
        }
        pipeline
    }

    /// Dispatch a job: at most one outreach per job, best-effort sends, and
    /// send counts that reflect only confirmed successes.
    pub async fn dispatch(&self, job_id: JobId) -> DispatchResult<DispatchOutcome> {
        let job = self
            .store
            .get_job(job_id)
            .await
            .map_err(store_err)?
            .ok_or(DispatchError::JobNotFound(job_id))?;

        // Idempotency guard: the outreach's existence rejects re-dispatch.
        // The insert below backstops this check-then-act window with a
        // uniqueness conflict.
        if let Some(existing) = self.store.outreach_for_job(job_id).await.map_err(store_err)? {
            info!(job = %job_id, outreach = %existing.id, "job already dispatched");
            return Err(DispatchError::AlreadyDispatched {
                outreach_id: existing.id,
            });
        }

        // Warm candidates are strictly preferred; cold sourcing only engages
        // on a warm shortfall.
        let technicians = self
            .store
            .available_technicians(job.org_id, &job.trade)
            .await
            .map_err(store_err)?;
        let warm = rank_warm(&job, technicians, self.scorer.as_ref());

        let mut pipeline_stats = None;
        let cold: Vec<ColdLead> = if warm.is_empty() {
            let outcome = self.sourcing_pipeline().run(&job).await.map_err(|err| match err {
                SourcingError::CreditsExhausted => DispatchError::CreditsExhausted,
                SourcingError::VerificationUnavailable(e) => {
                    DispatchError::VerificationUnavailable(e.to_string())
                }
                SourcingError::Datastore(e) => DispatchError::datastore(e.to_string()),
            })?;
            pipeline_stats = Some(outcome.stats);
            self.store
                .dispatchable_cold_leads(&job.state, &job.trade)
                .await
                .map_err(store_err)?
        } else {
            Vec::new()
        };

        let warm_count = warm.len() as u32;
        let cold_count = cold.len() as u32;
        if warm_count + cold_count == 0 {
            return Err(DispatchError::NoCandidates {
                location: job.location_label(),
            });
        }

        let mut outreach = Outreach::new(job.id, warm_count + cold_count);
        if let Some(stats) = pipeline_stats.clone() {
            outreach = outreach.with_pipeline_stats(stats);
        }
        match self.store.insert_outreach(outreach.clone()).await {
            Ok(()) => {}
            // Lost the check-then-act race to a concurrent dispatch.
            Err(DatastoreError::Conflict(_)) => {
                let existing = self.store.outreach_for_job(job.id).await.map_err(store_err)?;
                return Err(match existing {
                    Some(o) => DispatchError::AlreadyDispatched { outreach_id: o.id },
                    None => DispatchError::datastore("outreach conflict without an existing row"),
                });
            }
            Err(err) => return Err(store_err(err)),
        }

        // Two independent batches: a failed insert drops that channel from
        // the send, it does not block the other one.
        let warm_recipients: Vec<Recipient> = warm
            .iter()
            .map(|m| {
                Recipient::new(
                    outreach.id,
                    RecipientTarget::Technician(m.technician.id),
                    m.technician.email.clone(),
                )
            })
            .collect();
        let cold_recipients: Vec<Recipient> = cold
            .iter()
            .map(|lead| {
                Recipient::new(
                    outreach.id,
                    RecipientTarget::ColdLead(lead.id),
                    lead.email.clone(),
                )
            })
            .collect();

        let warm_recipients = self.insert_recipient_batch(warm_recipients, "warm").await;
        let cold_recipients = self.insert_recipient_batch(cold_recipients, "cold").await;
        if warm_recipients.is_empty() && cold_recipients.is_empty() {
            return Err(DispatchError::datastore(
                "failed to create recipients for either channel",
            ));
        }
        // The stored total reflects recipients actually created; a dropped
        // batch shrinks it below the assembled candidate count.
        outreach.total_recipients = (warm_recipients.len() + cold_recipients.len()) as u32;

        // Both channels send concurrently; within a channel each recipient
        // settles independently.
        let ((warm_sent_ids, warm_failures), (cold_sent_ids, cold_failures)) = tokio::join!(
            self.send_channel(&job, &warm_recipients),
            self.send_channel(&job, &cold_recipients),
        );

        let warm_sent = warm_sent_ids.len() as u32;
        let cold_sent = cold_sent_ids.len() as u32;
        let mut send_failures = warm_failures;
        send_failures.extend(cold_failures);

        // Completion bookkeeping is part of the dispatch outcome.
        outreach.record_send_results(warm_sent, cold_sent);
        self.store
            .update_outreach(outreach.clone())
            .await
            .map_err(store_err)?;
        self.store
            .update_job_status(job.id, JobStatus::Dispatched)
            .await
            .map_err(store_err)?;

        // Per-candidate dispatch counters are best-effort; a failure here
        // must not block the primary outcome.
        let sent_ids: Vec<RecipientId> = warm_sent_ids
            .iter()
            .chain(cold_sent_ids.iter())
            .copied()
            .collect();
        self.record_dispatch_bookkeeping(&sent_ids, &warm_recipients, &cold_recipients)
            .await;

        info!(
            job = %job.id,
            outreach = %outreach.id,
            warm_count,
            cold_count,
            warm_sent,
            cold_sent,
            failures = send_failures.len(),
            "dispatch complete"
        );

        Ok(DispatchOutcome {
            outreach_id: outreach.id,
            warm_count,
            cold_count,
            warm_sent,
            cold_sent,
            pipeline: pipeline_stats,
            send_failures,
        })
    }

    async fn insert_recipient_batch(
        &self,
        recipients: Vec<Recipient>,
        channel: &str,
    ) -> Vec<Recipient> {
        if recipients.is_empty() {
            return recipients;
        }
        match self.store.insert_recipients(recipients.clone()).await {
            Ok(()) => recipients,
            Err(err) => {
                warn!(channel, error = %err, "recipient batch insert failed, dropping channel");
                Vec::new()
            }
        }
    }

    /// Send to every recipient in a channel, settling all outcomes; one
    /// failure never aborts the rest.
    async fn send_channel(
        &self,
        job: &Job,
        recipients: &[Recipient],
    ) -> (Vec<RecipientId>, Vec<SendFailure>) {
        let sends = recipients.iter().map(|recipient| {
            let email = OutboundEmail {
                to: recipient.email.clone(),
                recipient_id: recipient.id,
                job_id: job.id,
                trade: job.trade.clone(),
                city: job.city.clone(),
                state: job.state.clone(),
                urgency: job.urgency,
                lead_source: recipient.lead_source,
                scheduled_for: job.scheduled_for,
            };
            async move {
                match self.mailer.send(&email).await {
                    Ok(()) => Ok(recipient.id),
                    Err(err) => Err(SendFailure {
                        recipient_id: recipient.id,
                        email: recipient.email.clone(),
                        error: err.to_string(),
                    }),
                }
            }
        });

        let mut sent = Vec::new();
        let mut failures = Vec::new();
        for result in join_all(sends).await {
            match result {
                Ok(id) => sent.push(id),
                Err(failure) => {
                    warn!(
                        recipient = %failure.recipient_id,
                        email = %failure.email,
                        error = %failure.error,
                        "send failed"
                    );
                    failures.push(failure);
                }
            }
        }
        (sent, failures)
    }

    async fn record_dispatch_bookkeeping(
        &self,
        sent_ids: &[RecipientId],
        warm_recipients: &[Recipient],
        cold_recipients: &[Recipient],
    ) {
        let now = Utc::now();

        if let Err(err) = self.store.mark_recipients_sent(sent_ids).await {
            warn!(error = %err, "failed to flag sent recipients");
        }

        for recipient in warm_recipients.iter().chain(cold_recipients.iter()) {
            if !sent_ids.contains(&recipient.id) {
                continue;
            }
            let result = match recipient.target {
                RecipientTarget::Technician(id) => {
                    self.store.mark_technician_dispatched(id, now).await
                }
                RecipientTarget::ColdLead(id) => {
                    self.store.mark_cold_lead_dispatched(id, now).await
                }
            };
            if let Err(err) = result {
                warn!(recipient = %recipient.id, error = %err, "dispatch counter update failed");
            }
        }
    }
}

fn store_err(err: DatastoreError) -> DispatchError {
    DispatchError::datastore(err.to_string())
}
