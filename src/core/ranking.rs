use std::cmp::Ordering;

use thiserror::Error;

use crate::core::distance::euclidean_degrees;
use crate::core::scoring::calculate_job_score;
use crate::models::{JobContext, ListingFilter, Page, RankedPosting, SortMode, WorkerContext};

/// A posting that cannot be ranked; it is dropped from the listing
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("posting {job_id} has invalid pay amount {amount}")]
    InvalidPay { job_id: String, amount: f64 },

    #[error("posting {job_id} has invalid coordinates ({latitude}, {longitude})")]
    InvalidLocation {
        job_id: String,
        latitude: f64,
        longitude: f64,
    },
}

/// One page of ranked postings plus the size of the full ordered listing
#[derive(Debug, Clone)]
pub struct RankedPage {
    pub postings: Vec<RankedPosting>,
    pub total_count: usize,
}

/// Check the invariants a posting must hold before it can be ranked
pub fn check_posting(job: &JobContext) -> Result<(), InvariantViolation> {
    if !job.pay_amount.is_finite() || job.pay_amount < 0.0 {
        return Err(InvariantViolation::InvalidPay {
            job_id: job.id.clone(),
            amount: job.pay_amount,
        });
    }

    if !job.location.is_valid() {
        return Err(InvariantViolation::InvalidLocation {
            job_id: job.id.clone(),
            latitude: job.location.latitude,
            longitude: job.location.longitude,
        });
    }

    Ok(())
}

/// Scores, orders and paginates postings for one viewer
///
/// Stateless; every call works on its own copy of the postings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListingRanker;

impl ListingRanker {
    pub fn new() -> Self {
        Self
    }

    /// Rank `postings` for `viewer` and return the requested page
    ///
    /// Every posting gets a match score whenever a viewer context is
    /// available, whatever the sort mode. Postings breaking an invariant
    /// are excluded with a warning and not counted in `total_count`.
    pub fn rank(
        &self,
        postings: Vec<JobContext>,
        viewer: Option<&WorkerContext>,
        sort_mode: SortMode,
        page: Page,
    ) -> RankedPage {
        self.rank_filtered(postings, &ListingFilter::default(), viewer, sort_mode, page)
    }

    /// [`rank`](Self::rank) after dropping postings rejected by `filter`
    pub fn rank_filtered(
        &self,
        postings: Vec<JobContext>,
        filter: &ListingFilter,
        viewer: Option<&WorkerContext>,
        sort_mode: SortMode,
        page: Page,
    ) -> RankedPage {
        let mut ranked: Vec<RankedPosting> = postings
            .into_iter()
            .filter(|job| filter.matches(job))
            .filter(|job| match check_posting(job) {
                Ok(()) => true,
                Err(violation) => {
                    tracing::warn!("Excluding posting from listing: {}", violation);
                    false
                }
            })
            .map(|posting| {
                let match_score = viewer.map(|worker| calculate_job_score(&posting, worker).total);
                RankedPosting { posting, match_score }
            })
            .collect();

        sort_postings(&mut ranked, viewer, sort_mode);

        let total_count = ranked.len();

        RankedPage {
            postings: page.slice(ranked),
            total_count,
        }
    }
}

/// Order postings in place; every sort is stable
fn sort_postings(ranked: &mut [RankedPosting], viewer: Option<&WorkerContext>, sort_mode: SortMode) {
    match sort_mode {
        SortMode::Match => ranked.sort_by(|a, b| {
            b.match_score
                .cmp(&a.match_score)
                .then_with(|| b.posting.created_at.cmp(&a.posting.created_at))
        }),
        SortMode::Date => ranked.sort_by(|a, b| b.posting.start_date.cmp(&a.posting.start_date)),
        // Raw amount; hourly, daily and fixed pay are compared as-is
        SortMode::Pay => ranked.sort_by(|a, b| {
            b.posting
                .pay_amount
                .partial_cmp(&a.posting.pay_amount)
                .unwrap_or(Ordering::Equal)
        }),
        SortMode::Distance => {
            // Degree-space distance, not the haversine miles used for scoring.
            // Without a viewer location the input order is kept.
            if let Some(origin) = viewer.and_then(|v| v.location) {
                ranked.sort_by(|a, b| {
                    euclidean_degrees(&a.posting.location, &origin)
                        .partial_cmp(&euclidean_degrees(&b.posting.location, &origin))
                        .unwrap_or(Ordering::Equal)
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, PayType};
    use chrono::{Duration, TimeZone, Utc};

    fn create_posting(id: &str, lat: f64, lon: f64, pay: f64, start: (i32, u32, u32)) -> JobContext {
        JobContext {
            id: id.to_string(),
            title: format!("Job {}", id),
            skill_ids: ["cleaning".to_string()].into_iter().collect(),
            location: Coordinates::new(lat, lon).unwrap(),
            provides_transportation: false,
            pay_amount: pay,
            pay_type: PayType::Hourly,
            start_date: Utc.with_ymd_and_hms(start.0, start.1, start.2, 8, 0, 0).unwrap(),
            created_at: Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap(),
            employer_id: "employer".to_string(),
            city: None,
            zip_code: None,
            address: None,
        }
    }

    fn viewer_at(lat: f64, lon: f64) -> WorkerContext {
        WorkerContext {
            skill_ids: ["cleaning".to_string()].into_iter().collect(),
            location: Some(Coordinates::new(lat, lon).unwrap()),
            needs_transportation: false,
        }
    }

    fn ids(page: &RankedPage) -> Vec<&str> {
        page.postings.iter().map(|p| p.posting.id.as_str()).collect()
    }

    #[test]
    fn test_pay_sort_descending() {
        let postings = vec![
            create_posting("low", 37.0, -122.0, 15.0, (2024, 1, 1)),
            create_posting("high", 37.0, -122.0, 40.0, (2024, 1, 1)),
            create_posting("mid", 37.0, -122.0, 25.0, (2024, 1, 1)),
        ];

        let page = ListingRanker::new().rank(postings, None, SortMode::Pay, Page::new(1, 20).unwrap());
        assert_eq!(ids(&page), vec!["high", "mid", "low"]);
        assert!(page.postings.iter().all(|p| p.match_score.is_none()));
    }

    #[test]
    fn test_distance_sort_uses_degree_space() {
        let postings = vec![
            create_posting("far", 38.0, -122.0, 20.0, (2024, 1, 1)),
            create_posting("near", 37.01, -122.0, 20.0, (2024, 1, 1)),
        ];
        let viewer = viewer_at(37.0, -122.0);

        let page = ListingRanker::new().rank(postings, Some(&viewer), SortMode::Distance, Page::new(1, 20).unwrap());
        assert_eq!(ids(&page), vec!["near", "far"]);
        assert!(page.postings.iter().all(|p| p.match_score.is_some()));
    }

    #[test]
    fn test_distance_sort_without_location_keeps_input_order() {
        let postings = vec![
            create_posting("far", 38.0, -122.0, 20.0, (2024, 1, 1)),
            create_posting("near", 37.01, -122.0, 20.0, (2024, 1, 1)),
        ];
        let viewer = WorkerContext::default();

        let page = ListingRanker::new().rank(postings, Some(&viewer), SortMode::Distance, Page::new(1, 20).unwrap());
        assert_eq!(ids(&page), vec!["far", "near"]);
    }

    #[test]
    fn test_match_sort_breaks_ties_by_created_at() {
        let mut older = create_posting("older", 37.0, -122.0, 20.0, (2024, 1, 1));
        let mut newer = create_posting("newer", 37.0, -122.0, 20.0, (2024, 1, 1));
        older.created_at = Utc::now() - Duration::days(2);
        newer.created_at = Utc::now();
        let best = create_posting("best", 37.0, -122.0, 20.0, (2024, 1, 1));
        let mut worse = create_posting("worse", 39.0, -122.0, 20.0, (2024, 1, 1));
        worse.skill_ids.insert("welding".to_string());

        let viewer = viewer_at(37.0, -122.0);
        let page = ListingRanker::new().rank(
            vec![worse, older, newer, best],
            Some(&viewer),
            SortMode::Match,
            Page::new(1, 20).unwrap(),
        );

        // older/newer/best all score 100; newer and older were created after best
        assert_eq!(ids(&page), vec!["newer", "older", "best", "worse"]);
    }

    #[test]
    fn test_invalid_posting_is_excluded() {
        let mut broken = create_posting("broken", 37.0, -122.0, 20.0, (2024, 1, 1));
        broken.pay_amount = f64::NAN;
        let postings = vec![broken, create_posting("ok", 37.0, -122.0, 20.0, (2024, 1, 1))];

        let page = ListingRanker::new().rank(postings, None, SortMode::Date, Page::new(1, 20).unwrap());
        assert_eq!(ids(&page), vec!["ok"]);
        assert_eq!(page.total_count, 1);
    }

    #[test]
    fn test_filter_applied_before_ranking() {
        let mut sf = create_posting("sf", 37.0, -122.0, 20.0, (2024, 1, 1));
        sf.city = Some("San Francisco".to_string());
        let oakland = create_posting("oak", 37.0, -122.0, 20.0, (2024, 1, 1));
        let filter = ListingFilter {
            city: Some("san fran".to_string()),
            ..Default::default()
        };

        let page = ListingRanker::new().rank_filtered(
            vec![sf, oakland],
            &filter,
            None,
            SortMode::Match,
            Page::new(1, 20).unwrap(),
        );
        assert_eq!(ids(&page), vec!["sf"]);
    }
}
