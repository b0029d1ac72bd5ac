//! Stage 1: candidate selection with AI delegation and heuristic fallback.

use std::sync::Arc;

use tracing::{debug, warn};

use tradecast_core::haversine_miles;
use tradecast_infra::{BackoffExecutor, CandidateRanker, RankCandidate, RankCriteria, RankSelection};
use tradecast_model::{Job, StagingRecord};

/// AI delegation only pays off past this many pre-filtered candidates;
/// smaller pools go straight to the heuristic.
const AI_DELEGATION_THRESHOLD: usize = 5;

/// At most this many candidates are summarized into the ranking context.
const AI_CONTEXT_LIMIT: usize = 50;

/// Heuristic base score before bonuses and penalties.
const BASE_SCORE: i32 = 50;

/// Distance penalty scale: one point per 2.5 miles, capped at 20.
const MILES_PER_PENALTY_POINT: f64 = 2.5;
const MAX_DISTANCE_PENALTY: f64 = 20.0;

/// Selects staging records for a job, preferring an AI ranking capability
/// when one is configured and the pool is large enough to justify it.
///
/// AI failures and malformed responses are absorbed here; callers always get
/// a ranked selection, worst case from the deterministic heuristic.
pub struct RankerAdapter {
    ranker: Option<Arc<dyn CandidateRanker>>,
    executor: BackoffExecutor,
}

impl RankerAdapter {
    pub fn new(ranker: Option<Arc<dyn CandidateRanker>>, executor: BackoffExecutor) -> Self {
        Self { ranker, executor }
    }

    /// Rank `records` for `job` and return at most `limit` selections,
    /// best first.
    pub async fn select(
        &self,
        job: &Job,
        records: &[StagingRecord],
        limit: usize,
    ) -> Vec<RankSelection> {
        let eligible: Vec<&StagingRecord> =
            records.iter().filter(|r| eligible(r, job)).collect();
        if eligible.is_empty() || limit == 0 {
            return Vec::new();
        }

        if eligible.len() > AI_DELEGATION_THRESHOLD {
            if let Some(ranker) = &self.ranker {
                match self.rank_with_ai(ranker.as_ref(), job, &eligible, limit).await {
                    Some(selections) => return selections,
                    None => {
                        debug!(candidates = eligible.len(), "falling back to heuristic ranking");
                    }
                }
            }
        }

        heuristic_rank(job, &eligible, limit)
    }

    /// Delegate to the AI capability; `None` means "use the fallback" for
    /// any failure or malformed response.
    async fn rank_with_ai(
        &self,
        ranker: &dyn CandidateRanker,
        job: &Job,
        eligible: &[&StagingRecord],
        limit: usize,
    ) -> Option<Vec<RankSelection>> {
        let bounded = &eligible[..eligible.len().min(AI_CONTEXT_LIMIT)];
        let candidates: Vec<RankCandidate> = bounded
            .iter()
            .map(|r| RankCandidate {
                id: r.id,
                business_name: r.business_name.clone(),
                trade: r.trade.clone(),
                city: r.city.clone(),
                state: r.state.clone(),
                license_status: r.license_status.clone(),
                miles_from_job: miles_from_job(r, job),
            })
            .collect();
        let criteria = RankCriteria {
            trade: job.trade.clone(),
            city: job.city.clone(),
            state: job.state.clone(),
            point: job.point,
        };

        let response = self
            .executor
            .execute(|| ranker.rank(&candidates, &criteria, limit))
            .await;

        let selections = match response {
            Ok(selections) => selections,
            Err(err) => {
                warn!(error = %err, "AI ranking failed");
                return None;
            }
        };

        validate_ai_selections(selections, bounded, limit)
    }
}

/// Sanity-check an AI response: non-empty, known ids, no duplicates, scores
/// in range. Anything off means the whole response is discarded.
fn validate_ai_selections(
    mut selections: Vec<RankSelection>,
    candidates: &[&StagingRecord],
    limit: usize,
) -> Option<Vec<RankSelection>> {
    if selections.is_empty() {
        warn!("AI ranking returned no selections");
        return None;
    }

    let mut seen = std::collections::HashSet::new();
    for s in &selections {
        if s.score > 100 {
            warn!(score = s.score, "AI ranking returned out-of-range score");
            return None;
        }
        if !candidates.iter().any(|c| c.id == s.id) {
            warn!(id = %s.id, "AI ranking returned unknown candidate id");
            return None;
        }
        if !seen.insert(s.id) {
            warn!(id = %s.id, "AI ranking returned duplicate candidate id");
            return None;
        }
    }

    selections.sort_by(|a, b| b.score.cmp(&a.score));
    selections.truncate(limit);
    Some(selections)
}

/// The pre-filter applied before any scoring: must have a city, a matching
/// (or generic) trade, the job's state, and a non-disqualified license.
fn eligible(record: &StagingRecord, job: &Job) -> bool {
    record.city.is_some()
        && (record.trade.matches(&job.trade) || record.trade.is_general())
        && record.state.eq_ignore_ascii_case(&job.state)
        && !record.license_disqualified()
}

fn miles_from_job(record: &StagingRecord, job: &Job) -> Option<f64> {
    match (&record.point, &job.point) {
        (Some(a), Some(b)) => Some(haversine_miles(a, b)),
        _ => None,
    }
}

/// Deterministic scoring of one pre-filtered record against a job.
///
/// Base 50; +30 exact trade match (+10 generic); +20 exact city match;
/// +10 active license; +5 phone on file; up to −20 distance penalty
/// (one point per 2.5 miles) when coordinates are available. Clamped to
/// [0, 100].
pub fn heuristic_score(record: &StagingRecord, job: &Job) -> u8 {
    let mut score = BASE_SCORE;

    if record.trade.matches(&job.trade) {
        score += 30;
    } else if record.trade.is_general() {
        score += 10;
    }

    if record
        .city
        .as_deref()
        .is_some_and(|c| c.eq_ignore_ascii_case(&job.city))
    {
        score += 20;
    }

    if record.license_active() {
        score += 10;
    }

    if record.phone.is_some() {
        score += 5;
    }

    if let Some(miles) = miles_from_job(record, job) {
        let penalty = (miles / MILES_PER_PENALTY_POINT).min(MAX_DISTANCE_PENALTY);
        score -= penalty.round() as i32;
    }

    score.clamp(0, 100) as u8
}

fn heuristic_rank(job: &Job, eligible: &[&StagingRecord], limit: usize) -> Vec<RankSelection> {
    let mut scored: Vec<(&StagingRecord, u8)> = eligible
        .iter()
        .map(|r| (*r, heuristic_score(r, job)))
        .collect();
    // Stable tiebreak on name keeps the ranking reproducible.
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.business_name.cmp(&b.0.business_name)));
    scored.truncate(limit);

    scored
        .into_iter()
        .map(|(record, score)| RankSelection {
            id: record.id,
            score,
            reason: heuristic_reason(record, job),
        })
        .collect()
}

fn heuristic_reason(record: &StagingRecord, job: &Job) -> String {
    let mut parts = Vec::new();
    if record.trade.matches(&job.trade) {
        parts.push("exact trade match");
    } else if record.trade.is_general() {
        parts.push("general trade");
    }
    if record
        .city
        .as_deref()
        .is_some_and(|c| c.eq_ignore_ascii_case(&job.city))
    {
        parts.push("same city");
    }
    if record.license_active() {
        parts.push("active license");
    }
    if record.phone.is_some() {
        parts.push("phone on file");
    }
    if parts.is_empty() {
        "in-state candidate".to_string()
    } else {
        format!("heuristic: {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tradecast_core::{GeoPoint, StagingId, EARTH_RADIUS_MILES};
    use tradecast_infra::RemoteError;
    use tradecast_model::{Trade, Urgency};

    use super::*;

    /// Along a meridian the Haversine distance is exactly radius * angle.
    const MILES_PER_LAT_DEGREE: f64 = EARTH_RADIUS_MILES * std::f64::consts::PI / 180.0;

    fn job() -> Job {
        Job::new(Trade::new("HVAC"), Urgency::Urgent, "Tampa", "FL")
            .with_point(GeoPoint::new(27.9506, -82.4572))
    }

    fn record(name: &str) -> StagingRecord {
        StagingRecord::new(name, Trade::new("HVAC"), "FL")
            .with_city("Tampa")
            .with_license_status("active")
    }

    struct StubRanker {
        response: Result<Vec<RankSelection>, RemoteError>,
        calls: AtomicU32,
    }

    impl StubRanker {
        fn new(response: Result<Vec<RankSelection>, RemoteError>) -> Self {
            Self {
                response,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CandidateRanker for StubRanker {
        async fn rank(
            &self,
            _candidates: &[RankCandidate],
            _criteria: &RankCriteria,
            _limit: usize,
        ) -> Result<Vec<RankSelection>, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    #[test]
    fn prefilter_rejects_missing_city_wrong_state_and_bad_license() {
        let job = job();
        assert!(eligible(&record("A"), &job));

        let no_city = StagingRecord::new("B", Trade::new("HVAC"), "FL");
        assert!(!eligible(&no_city, &job));

        let wrong_state = StagingRecord::new("C", Trade::new("HVAC"), "GA").with_city("Atlanta");
        assert!(!eligible(&wrong_state, &job));

        let revoked = record("D").with_license_status("revoked");
        assert!(!eligible(&revoked, &job));

        let wrong_trade = StagingRecord::new("E", Trade::new("Roofing"), "FL").with_city("Tampa");
        assert!(!eligible(&wrong_trade, &job));

        let general = StagingRecord::new("F", Trade::new("General"), "FL").with_city("Tampa");
        assert!(eligible(&general, &job));
    }

    #[test]
    fn heuristic_score_is_deterministic_and_in_range() {
        let job = job();
        // Exact trade, matching city, active license, phone, ~10 miles out.
        let candidate = record("Bay Cooling")
            .with_phone("813-555-0100")
            .with_point(GeoPoint::new(27.9506 + 10.0 / MILES_PER_LAT_DEGREE, -82.4572));

        let first = heuristic_score(&candidate, &job);
        let second = heuristic_score(&candidate, &job);
        assert_eq!(first, second);
        // 50 + 30 + 20 + 10 + 5 - 4 = 111 -> clamped to 100.
        assert_eq!(first, 100);
    }

    #[test]
    fn distance_penalty_caps_at_twenty() {
        let job = job();
        let near = record("Near").with_point(GeoPoint::new(27.9506, -82.4572));
        let far =
            record("Far").with_point(GeoPoint::new(27.9506 + 49.0 / MILES_PER_LAT_DEGREE, -82.4572));

        // 50 + 30 + 20 + 10 = 110 clamps to 100 either way; drop the city
        // bonus to expose the penalty.
        let near = StagingRecord { city: Some("Orlando".into()), ..near };
        let far = StagingRecord { city: Some("Orlando".into()), ..far };

        let near_score = heuristic_score(&near, &job);
        let far_score = heuristic_score(&far, &job);
        // 50 + 30 + 10 = 90 near; far loses ~20 points of distance penalty.
        assert_eq!(near_score, 90);
        assert_eq!(far_score, 70);
    }

    #[tokio::test]
    async fn small_pools_skip_ai_entirely() {
        let ranker = Arc::new(StubRanker::new(Ok(vec![])));
        let adapter = RankerAdapter::new(Some(ranker.clone()), BackoffExecutor::default());
        let records = vec![record("A"), record("B")];

        let selections = adapter.select(&job(), &records, 20).await;

        assert_eq!(selections.len(), 2);
        assert_eq!(ranker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ai_failure_falls_back_to_heuristic() {
        let ranker = Arc::new(StubRanker::new(Err(RemoteError::status(500, "boom"))));
        let adapter = RankerAdapter::new(Some(ranker.clone()), BackoffExecutor::default());
        let records: Vec<StagingRecord> =
            (0..8).map(|i| record(&format!("Company {i}"))).collect();

        let selections = adapter.select(&job(), &records, 3).await;

        // Fallback still ranks and truncates.
        assert_eq!(selections.len(), 3);
        // The executor retried before giving up.
        assert_eq!(ranker.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn malformed_ai_response_falls_back() {
        // Unknown id: not one of the submitted candidates.
        let bogus = vec![RankSelection {
            id: StagingId::new(),
            score: 90,
            reason: "made up".into(),
        }];
        let ranker = Arc::new(StubRanker::new(Ok(bogus)));
        let adapter = RankerAdapter::new(Some(ranker), BackoffExecutor::default());
        let records: Vec<StagingRecord> =
            (0..8).map(|i| record(&format!("Company {i}"))).collect();

        let selections = adapter.select(&job(), &records, 20).await;

        assert_eq!(selections.len(), 8);
        assert!(selections.iter().all(|s| s.reason.starts_with("heuristic")));
    }

    #[tokio::test]
    async fn valid_ai_response_is_used_sorted_and_truncated() {
        let records: Vec<StagingRecord> =
            (0..8).map(|i| record(&format!("Company {i}"))).collect();
        let response = vec![
            RankSelection { id: records[1].id, score: 70, reason: "ok".into() },
            RankSelection { id: records[0].id, score: 95, reason: "great".into() },
            RankSelection { id: records[2].id, score: 40, reason: "meh".into() },
        ];
        let ranker = Arc::new(StubRanker::new(Ok(response)));
        let adapter = RankerAdapter::new(Some(ranker), BackoffExecutor::default());

        let selections = adapter.select(&job(), &records, 2).await;

        assert_eq!(selections.len(), 2);
        assert_eq!(selections[0].id, records[0].id);
        assert_eq!(selections[0].score, 95);
        assert_eq!(selections[1].id, records[1].id);
    }

    #[tokio::test]
    async fn no_ranker_configured_uses_heuristic() {
        let adapter = RankerAdapter::new(None, BackoffExecutor::default());
        let records: Vec<StagingRecord> =
            (0..8).map(|i| record(&format!("Company {i}"))).collect();

        let selections = adapter.select(&job(), &records, 20).await;
        assert_eq!(selections.len(), 8);
    }
}
