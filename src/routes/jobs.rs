use actix_web::{web, HttpResponse};

use crate::models::{
    FanOutResponse, ListJobsQuery, ListJobsResponse, MatchesQuery, MatchesResponse, Pagination, WorkerContext,
};
use crate::routes::{ApiError, AppState};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/jobs", web::get().to(list_jobs))
        .route("/jobs/{id}/matches", web::get().to(job_matches))
        .route("/jobs/{id}/notify-matches", web::post().to(notify_matches));
}

/// Ranked job listing
///
/// GET /api/v1/jobs?viewerId=..&latitude=..&longitude=..&sortBy=match&page=1&limit=20
///
/// The viewer's stored profile supplies skills and location; query
/// coordinates override the stored location. Without either, postings
/// carry no match score.
async fn list_jobs(state: web::Data<AppState>, query: web::Query<ListJobsQuery>) -> Result<HttpResponse, ApiError> {
    let listing = &state.settings.listing;
    let sort_mode = query.sort_mode()?;
    let page = query.page(listing.page_size, listing.max_page_size)?;
    let coordinates = query.coordinates()?;

    let mut viewer = match &query.viewer_id {
        Some(viewer_id) => Some(
            state
                .workers
                .fetch_worker(viewer_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("User {}", viewer_id)))?,
        ),
        None => None,
    };

    if let Some(location) = coordinates {
        viewer.get_or_insert_with(WorkerContext::default).location = Some(location);
    }

    let postings = state.postings.fetch_open_postings().await?;
    let ranked = state
        .ranker
        .rank_filtered(postings, &query.filter(), viewer.as_ref(), sort_mode, page);

    tracing::debug!(
        "Listing page {} ({} of {} postings) sorted by {:?}",
        page.number,
        ranked.postings.len(),
        ranked.total_count,
        sort_mode
    );

    Ok(HttpResponse::Ok().json(ListJobsResponse {
        jobs: ranked.postings,
        pagination: Pagination::new(page.number, page.size, ranked.total_count),
    }))
}

/// Workers compatible with a posting
///
/// GET /api/v1/jobs/{id}/matches?minScore=50
async fn job_matches(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<MatchesQuery>,
) -> Result<HttpResponse, ApiError> {
    let job_id = path.into_inner();
    let job = state
        .postings
        .fetch_posting(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job {}", job_id)))?;

    let min_score = query
        .min_score
        .unwrap_or(state.settings.matching.min_match_score_for_general_query);

    let cancel = state.shutdown.child_token();
    let outcome = state
        .finder
        .scan_population(&job, state.workers.stream_candidates(&job.employer_id), min_score, &cancel)
        .await;

    tracing::info!(job_id = %job_id, "Found {} matches at min score {}", outcome.matches.len(), min_score);

    Ok(HttpResponse::Ok().json(MatchesResponse {
        job_id,
        matches: outcome.matches,
        scanned: outcome.scanned,
        skipped: outcome.skipped,
    }))
}

/// Notify compatible workers about a posting
///
/// POST /api/v1/jobs/{id}/notify-matches
///
/// Called by the posting service after a job is created. Safe to repeat:
/// workers already notified about the job keep their original record.
async fn notify_matches(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let job_id = path.into_inner();
    let job = state
        .postings
        .fetch_posting(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job {}", job_id)))?;

    let cancel = state.shutdown.child_token();
    let report = state.notifier.notify_matching_workers(&job, &cancel).await;

    Ok(HttpResponse::Ok().json(FanOutResponse {
        job_id,
        notified: report.notifications.len(),
        failed: report.failed.into_iter().map(|(worker_id, _)| worker_id).collect(),
        notifications: report.notifications,
    }))
}
