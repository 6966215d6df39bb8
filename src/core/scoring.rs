use std::collections::HashSet;

use crate::core::distance::distance_miles;
use crate::models::{Coordinates, JobContext, ScoreBreakdown, SkillId, WorkerContext};

/// Factor weights; they sum to 1.0 so the total stays within 0-100
pub const SKILL_WEIGHT: f64 = 0.40;
pub const DISTANCE_WEIGHT: f64 = 0.35;
pub const TRANSPORT_WEIGHT: f64 = 0.25;

/// Score used when the input needed for a factor is unavailable
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Skill score for a worker that lists no skills
const NO_SKILLS_SCORE: f64 = 30.0;

/// Transport score when the worker needs a ride the job does not offer
const NO_TRANSPORT_SCORE: f64 = 30.0;

/// Calculate the compatibility of a worker with a job (0-100)
///
/// Scoring formula:
/// total = round(
///     skill_score * 0.40 +         # Share of required skills the worker has
///     distance_score * 0.35 +      # Piecewise decay over haversine miles
///     transport_score * 0.25       # Can the worker get there?
/// )
///
/// Pure and infallible: missing location or skills fall back to fixed
/// scores instead of erroring.
pub fn calculate_job_score(job: &JobContext, worker: &WorkerContext) -> ScoreBreakdown {
    let skill_score = calculate_skill_score(&job.skill_ids, &worker.skill_ids);
    let distance_score = calculate_distance_score(&job.location, worker.location.as_ref());
    let transport_score =
        calculate_transport_score(job.provides_transportation, worker.needs_transportation);

    ScoreBreakdown {
        skill_score,
        distance_score,
        transport_score,
        total: weighted_total(skill_score, distance_score, transport_score),
    }
}

/// Weighted sum of the three factors, rounded half-up and clamped to 0-100
#[inline]
pub fn weighted_total(skill_score: f64, distance_score: f64, transport_score: f64) -> u8 {
    let total = skill_score * SKILL_WEIGHT
        + distance_score * DISTANCE_WEIGHT
        + transport_score * TRANSPORT_WEIGHT;

    (total + 0.5).floor().clamp(0.0, 100.0) as u8
}

/// Calculate skill score (0-100)
///
/// Recall over the job's required skills: extra worker skills neither help
/// nor hurt.
#[inline]
pub fn calculate_skill_score(job_skills: &HashSet<SkillId>, worker_skills: &HashSet<SkillId>) -> f64 {
    if job_skills.is_empty() {
        return NEUTRAL_SCORE;
    }
    if worker_skills.is_empty() {
        return NO_SKILLS_SCORE;
    }

    let matching = job_skills.intersection(worker_skills).count() as f64;
    100.0 * matching / job_skills.len() as f64
}

/// Calculate distance score (0-100) from the worker's location
#[inline]
pub fn calculate_distance_score(job_location: &Coordinates, worker_location: Option<&Coordinates>) -> f64 {
    match worker_location {
        Some(worker) => distance_score_for_miles(distance_miles(worker, job_location)),
        None => NEUTRAL_SCORE,
    }
}

/// Map a distance in miles to a score (0-100)
///
/// 0-1 mi: 100, 1-5 mi: 100-80, 5-10 mi: 80-50, 10-25 mi: 50-20,
/// beyond 25 mi: 20 down to 0. Continuous at every breakpoint.
#[inline]
pub fn distance_score_for_miles(distance: f64) -> f64 {
    if distance <= 1.0 {
        100.0
    } else if distance <= 5.0 {
        100.0 - (distance - 1.0) * 5.0
    } else if distance <= 10.0 {
        80.0 - (distance - 5.0) * 6.0
    } else if distance <= 25.0 {
        50.0 - (distance - 10.0) * 2.0
    } else {
        (20.0 - (distance - 25.0) * 0.5).max(0.0)
    }
}

/// Calculate transportation compatibility score (0-100)
#[inline]
pub fn calculate_transport_score(job_provides_transportation: bool, worker_needs_transportation: bool) -> f64 {
    if !worker_needs_transportation || job_provides_transportation {
        100.0
    } else {
        NO_TRANSPORT_SCORE
    }
}
