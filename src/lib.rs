//! Gigmatch - ranking and notification fan-out for short-term job postings
//!
//! Scores workers against postings, ranks listings for a viewer, finds
//! the workers worth telling about a new posting and routes the
//! resulting notifications to pluggable delivery channels.

pub mod config;
pub mod core;
pub mod models;
pub mod notifications;
pub mod routes;
pub mod services;
pub mod shutdown;

// Re-export commonly used types
pub use crate::core::{calculate_job_score, distance::haversine_distance, ListingRanker, MatchFinder};
pub use crate::models::{JobContext, MatchCandidate, Notification, ScoreBreakdown, SortMode, WorkerContext};
pub use crate::notifications::{MatchNotifier, NotificationDispatcher};
