//! Stage 2: per-candidate email discovery & verification against a budget.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use tradecast_infra::{
    AccountStatus, BackoffExecutor, Datastore, DatastoreError, EmailFinder, EmailQuery,
    RemoteError,
};
use tradecast_model::StagingRecord;

/// Pause between discovery calls, independent of the backoff executor's own
/// retry delays. Keeps the run under the provider's per-second quota.
const INTER_CALL_PAUSE: Duration = Duration::from_millis(500);

/// Company-name suffixes stripped before deriving a discovery domain.
const COMPANY_SUFFIXES: [&str; 6] = ["llc", "inc", "corp", "co", "ltd", "company"];

/// Counters for one verification batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationRun {
    /// Records attempted (success or failure).
    pub attempted: u32,
    /// Records whose discovered email met the confidence floor.
    pub verified: u32,
    /// Paid discovery calls that reached the provider.
    pub credits_used: u32,
}

/// Discovers and verifies emails for selected staging records.
///
/// Every attempt, success or failure, checkpoints the record's verification
/// fields so a resumed pipeline never re-verifies the same record.
pub struct EmailVerifier {
    finder: Arc<dyn EmailFinder>,
    executor: BackoffExecutor,
    min_confidence: u8,
}

impl EmailVerifier {
    pub fn new(finder: Arc<dyn EmailFinder>, executor: BackoffExecutor, min_confidence: u8) -> Self {
        Self {
            finder,
            executor,
            min_confidence,
        }
    }

    /// Remaining paid budget on the provider account.
    pub async fn available_credits(&self) -> Result<u32, RemoteError> {
        let AccountStatus {
            verifications_available,
        } = self
            .executor
            .execute(|| self.finder.account_status())
            .await?;
        Ok(verifications_available)
    }

    /// Verify up to `records.len()` records, pausing between calls.
    ///
    /// Remote failures are per-record: the record is checkpointed as failed
    /// and the batch continues.
    pub async fn verify_batch(
        &self,
        store: &dyn Datastore,
        records: &[StagingRecord],
    ) -> Result<VerificationRun, DatastoreError> {
        let mut run = VerificationRun::default();

        for (idx, record) in records.iter().enumerate() {
            let query = discovery_query(record);
            let outcome = self.executor.execute(|| self.finder.find(&query)).await;
            let now = Utc::now();
            run.attempted += 1;

            match outcome {
                Ok(found) => {
                    run.credits_used += 1;
                    let verified =
                        found.email.is_some() && found.confidence >= self.min_confidence;
                    if verified {
                        run.verified += 1;
                    } else {
                        debug!(
                            record = %record.id,
                            confidence = found.confidence,
                            floor = self.min_confidence,
                            "email below confidence floor"
                        );
                    }
                    store
                        .record_staging_verification(
                            record.id,
                            found.email,
                            Some(found.confidence),
                            verified,
                            now,
                        )
                        .await?;
                }
                Err(err) => {
                    warn!(record = %record.id, error = %err, "email discovery failed");
                    store
                        .record_staging_verification(record.id, None, None, false, now)
                        .await?;
                }
            }

            if idx + 1 < records.len() {
                tokio::time::sleep(INTER_CALL_PAUSE).await;
            }
        }

        Ok(run)
    }
}

fn discovery_query(record: &StagingRecord) -> EmailQuery {
    let (first, last) = record.contact_name();
    EmailQuery {
        first_name: first.map(str::to_owned),
        last_name: last.map(str::to_owned),
        company: record.business_name.clone(),
        domain: derive_domain(&record.business_name),
    }
}

/// Guess a company domain from its registered name: strip legal suffixes,
/// keep alphanumerics, append `.com`.
pub fn derive_domain(business_name: &str) -> String {
    let stem: String = business_name
        .split_whitespace()
        .filter(|word| {
            let bare: String = word
                .chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_lowercase();
            !COMPANY_SUFFIXES.contains(&bare.as_str())
        })
        .flat_map(|word| word.chars())
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();

    format!("{stem}.com")
}
