// Core algorithm exports
pub mod distance;
pub mod matcher;
pub mod ranking;
pub mod scoring;

pub use distance::{distance_miles, euclidean_degrees, haversine_distance};
pub use matcher::{match_order, MatchFinder, ScanOutcome, DEFAULT_MIN_SCORE};
pub use ranking::{check_posting, InvariantViolation, ListingRanker, RankedPage};
pub use scoring::{calculate_job_score, distance_score_for_miles, weighted_total};
