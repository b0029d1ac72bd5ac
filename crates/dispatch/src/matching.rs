//! Warm path: geofenced filtering and composite ranking of technicians.

use chrono::Utc;

use tradecast_core::{haversine_miles, DISPATCH_RADIUS_MILES};
use tradecast_model::{Job, Technician};

/// A technician that survived the geofilter, with its distance and score.
#[derive(Debug, Clone)]
pub struct WarmMatch {
    pub technician: Technician,
    pub miles: f64,
    pub score: f64,
}

/// Composite scoring seam for warm candidates.
///
/// The filter guarantees `miles` is inside the dispatch radius; scorers only
/// order the survivors.
pub trait WarmScorer: Send + Sync {
    fn score(&self, job: &Job, technician: &Technician, miles: f64) -> f64;
}

/// Default composite score: closer is better, higher-rated is better, and
/// technicians who have not been dispatched recently get a boost so work
/// spreads across the pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositeScorer;

impl WarmScorer for CompositeScorer {
    fn score(&self, _job: &Job, technician: &Technician, miles: f64) -> f64 {
        // Distance: up to 50 points, linear falloff across the radius.
        let distance = (1.0 - miles / DISPATCH_RADIUS_MILES) * 50.0;

        // Rating: up to 30 points; unrated technicians assume a neutral 3.0.
        let rating = technician.rating.unwrap_or(3.0).clamp(0.0, 5.0) / 5.0 * 30.0;

        // Recency: up to 20 points, full for never-dispatched, scaling back
        // up over 30 days since the last dispatch.
        let recency = match technician.last_dispatched_at {
            None => 20.0,
            Some(at) => {
                let days = (Utc::now() - at).num_days().max(0) as f64;
                (days.min(30.0) / 30.0) * 20.0
            }
        };

        distance + rating + recency
    }
}

/// Filter technicians to the job's dispatch radius and rank them by
/// composite score, best first.
///
/// A technician missing either its own or the job's coordinates cannot be
/// ranked and is excluded outright. The radius boundary is exclusive.
pub fn rank_warm(job: &Job, technicians: Vec<Technician>, scorer: &dyn WarmScorer) -> Vec<WarmMatch> {
    let Some(job_point) = job.point else {
        return Vec::new();
    };

    let mut matches: Vec<WarmMatch> = technicians
        .into_iter()
        .filter_map(|technician| {
            let point = technician.point?;
            let miles = haversine_miles(&point, &job_point);
            if miles >= DISPATCH_RADIUS_MILES {
                return None;
            }
            let score = scorer.score(job, &technician, miles);
            Some(WarmMatch {
                technician,
                miles,
                score,
            })
        })
        .collect();

    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches
}
