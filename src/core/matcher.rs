use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt::Display;
use std::pin::pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::core::scoring::calculate_job_score;
use crate::models::{JobContext, MatchCandidate, WorkerContext, WorkerId};

/// Default threshold for raw match queries
pub const DEFAULT_MIN_SCORE: u8 = 50;

const DEFAULT_BATCH_SIZE: usize = 512;
const DEFAULT_PARALLELISM: usize = 4;

/// Result of scanning a worker population for one job
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub matches: Vec<MatchCandidate>,
    /// Workers read from the pool (excluding skipped rows)
    pub scanned: usize,
    /// Rows that failed to load and were left out
    pub skipped: usize,
    /// The scan stopped early; `matches` covers only what was scored
    pub cancelled: bool,
}

/// Finds the workers compatible with a newly created posting
///
/// Scoring is stateless, so batches of workers are scored on the blocking
/// pool in parallel and merged into one bounded accumulator. Sorting
/// happens once, over the already reduced candidate list.
#[derive(Debug, Clone)]
pub struct MatchFinder {
    max_candidates: Option<usize>,
    batch_size: usize,
    parallelism: usize,
}

impl MatchFinder {
    pub fn new() -> Self {
        Self {
            max_candidates: None,
            batch_size: DEFAULT_BATCH_SIZE,
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    /// Keep at most `cap` best candidates in memory
    pub fn with_max_candidates(mut self, cap: Option<usize>) -> Self {
        self.max_candidates = cap.filter(|c| *c > 0);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Score every worker in `pool` against `job` and keep those scoring
    /// at least `min_score`
    ///
    /// The job's own poster is never returned. Output is ordered by score
    /// descending, then worker id ascending. No match is an empty vec.
    pub fn find_matches<I>(&self, job: &JobContext, pool: I, min_score: u8) -> Vec<MatchCandidate>
    where
        I: IntoIterator<Item = (WorkerId, WorkerContext)>,
    {
        let mut accumulator = CandidateAccumulator::new(self.max_candidates);
        for (worker_id, worker) in pool {
            if let Some(candidate) = score_worker(job, worker_id, &worker, min_score) {
                accumulator.push(candidate);
            }
        }
        accumulator.into_sorted()
    }

    /// Streamed variant of [`find_matches`](Self::find_matches) for large
    /// populations
    ///
    /// Rows that fail to load are logged and skipped. When `cancel` fires,
    /// in-flight batches are aborted and whatever was already merged is
    /// returned with `cancelled` set.
    pub async fn scan_population<S, E>(
        &self,
        job: &JobContext,
        pool: S,
        min_score: u8,
        cancel: &CancellationToken,
    ) -> ScanOutcome
    where
        S: Stream<Item = Result<(WorkerId, WorkerContext), E>>,
        E: Display,
    {
        let shared_job = Arc::new(job.clone());
        let mut batches = pin!(pool.chunks(self.batch_size));
        let mut in_flight: JoinSet<Vec<MatchCandidate>> = JoinSet::new();
        let mut accumulator = CandidateAccumulator::new(self.max_candidates);
        let mut outcome = ScanOutcome::default();

        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.cancelled(job, in_flight, accumulator, outcome);
                }
                batch = batches.next() => batch,
            };

            let Some(batch) = batch else { break };

            let mut workers = Vec::with_capacity(batch.len());
            for row in batch {
                match row {
                    Ok(worker) => workers.push(worker),
                    Err(e) => {
                        outcome.skipped += 1;
                        tracing::warn!(job_id = %job.id, "Skipping candidate that failed to load: {}", e);
                    }
                }
            }
            outcome.scanned += workers.len();

            let batch_job = Arc::clone(&shared_job);
            in_flight.spawn_blocking(move || score_batch(&batch_job, workers, min_score));

            while in_flight.len() >= self.parallelism {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return self.cancelled(job, in_flight, accumulator, outcome);
                    }
                    Some(joined) = in_flight.join_next() => merge_batch(&mut accumulator, joined),
                }
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.cancelled(job, in_flight, accumulator, outcome);
                }
                joined = in_flight.join_next() => match joined {
                    Some(joined) => merge_batch(&mut accumulator, joined),
                    None => break,
                },
            }
        }

        outcome.matches = accumulator.into_sorted();

        tracing::debug!(
            job_id = %job.id,
            "Scanned {} workers ({} skipped), {} matches at min score {}",
            outcome.scanned,
            outcome.skipped,
            outcome.matches.len(),
            min_score
        );

        outcome
    }

    fn cancelled(
        &self,
        job: &JobContext,
        mut in_flight: JoinSet<Vec<MatchCandidate>>,
        accumulator: CandidateAccumulator,
        mut outcome: ScanOutcome,
    ) -> ScanOutcome {
        in_flight.abort_all();
        outcome.matches = accumulator.into_sorted();
        outcome.cancelled = true;

        tracing::info!(
            job_id = %job.id,
            "Population scan cancelled after {} workers, returning {} partial matches",
            outcome.scanned,
            outcome.matches.len()
        );

        outcome
    }
}

impl Default for MatchFinder {
    fn default() -> Self {
        Self::new()
    }
}

/// Output order: score descending, worker id ascending
pub fn match_order(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.worker_id.cmp(&b.worker_id))
}

fn score_worker(job: &JobContext, worker_id: WorkerId, worker: &WorkerContext, min_score: u8) -> Option<MatchCandidate> {
    if worker_id == job.employer_id {
        return None;
    }

    let score = calculate_job_score(job, worker).total;
    (score >= min_score).then_some(MatchCandidate { worker_id, score })
}

fn score_batch(job: &JobContext, workers: Vec<(WorkerId, WorkerContext)>, min_score: u8) -> Vec<MatchCandidate> {
    workers
        .into_iter()
        .filter_map(|(worker_id, worker)| score_worker(job, worker_id, &worker, min_score))
        .collect()
}

fn merge_batch(accumulator: &mut CandidateAccumulator, joined: Result<Vec<MatchCandidate>, JoinError>) {
    match joined {
        Ok(candidates) => {
            for candidate in candidates {
                accumulator.push(candidate);
            }
        }
        Err(e) => tracing::error!("Scoring batch failed: {}", e),
    }
}

/// Heap entry ordered so the worst candidate is the greatest
#[derive(Debug, PartialEq, Eq)]
struct Ranked(MatchCandidate);

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        match_order(&self.0, &other.0)
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reduces scored candidates into a deduplicated, optionally capped set
struct CandidateAccumulator {
    cap: Option<usize>,
    seen: HashSet<WorkerId>,
    heap: BinaryHeap<Ranked>,
}

impl CandidateAccumulator {
    fn new(cap: Option<usize>) -> Self {
        Self {
            cap,
            seen: HashSet::new(),
            heap: BinaryHeap::new(),
        }
    }

    fn push(&mut self, candidate: MatchCandidate) {
        // first occurrence of a worker wins
        if !self.seen.insert(candidate.worker_id.clone()) {
            return;
        }

        self.heap.push(Ranked(candidate));

        if let Some(cap) = self.cap {
            if self.heap.len() > cap {
                self.heap.pop();
            }
        }
    }

    fn into_sorted(self) -> Vec<MatchCandidate> {
        self.heap.into_sorted_vec().into_iter().map(|r| r.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, PayType};
    use chrono::Utc;
    use futures::stream;

    fn create_job() -> JobContext {
        JobContext {
            id: "job-1".to_string(),
            title: "Help moving".to_string(),
            skill_ids: ["moving".to_string(), "hauling".to_string()].into_iter().collect(),
            location: Coordinates::new(37.7749, -122.4194).unwrap(),
            provides_transportation: false,
            pay_amount: 25.0,
            pay_type: PayType::Hourly,
            start_date: Utc::now(),
            created_at: Utc::now(),
            employer_id: "employer".to_string(),
            city: Some("San Francisco".to_string()),
            zip_code: None,
            address: None,
        }
    }

    fn create_worker(skills: &[&str], lat: f64, lon: f64) -> WorkerContext {
        WorkerContext {
            skill_ids: skills.iter().map(|s| s.to_string()).collect(),
            location: Some(Coordinates::new(lat, lon).unwrap()),
            needs_transportation: false,
        }
    }

    fn pool() -> Vec<(WorkerId, WorkerContext)> {
        vec![
            ("c".to_string(), create_worker(&["moving", "hauling"], 37.7749, -122.4194)), // 100
            ("a".to_string(), create_worker(&["moving", "hauling"], 37.7749, -122.4194)), // 100
            ("b".to_string(), create_worker(&["moving"], 37.7749, -122.4194)),            // 80
            ("far".to_string(), create_worker(&[], 45.0, -100.0)),                          // 37
            ("employer".to_string(), create_worker(&["moving", "hauling"], 37.7749, -122.4194)),
        ]
    }

    #[test]
    fn test_find_matches_sorted_with_id_tiebreak() {
        let finder = MatchFinder::new();
        let matches = finder.find_matches(&create_job(), pool(), DEFAULT_MIN_SCORE);

        let ids: Vec<_> = matches.iter().map(|m| m.worker_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(matches[0].score, 100);
        assert_eq!(matches[2].score, 80);
    }

    #[test]
    fn test_find_matches_excludes_employer() {
        let finder = MatchFinder::new();
        let matches = finder.find_matches(&create_job(), pool(), 0);

        assert!(matches.iter().all(|m| m.worker_id != "employer"));
        assert_eq!(matches.len(), 4);
    }

    #[test]
    fn test_find_matches_empty_when_nobody_qualifies() {
        let finder = MatchFinder::new();
        let matches = finder.find_matches(&create_job(), pool(), 101);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_duplicates_collapsed() {
        let finder = MatchFinder::new();
        let mut workers = pool();
        workers.push(("a".to_string(), create_worker(&["moving"], 37.7749, -122.4194)));

        let matches = finder.find_matches(&create_job(), workers, DEFAULT_MIN_SCORE);
        assert_eq!(matches.iter().filter(|m| m.worker_id == "a").count(), 1);
    }

    #[test]
    fn test_max_candidates_keeps_best() {
        let finder = MatchFinder::new().with_max_candidates(Some(2));
        let matches = finder.find_matches(&create_job(), pool(), 0);

        let ids: Vec<_> = matches.iter().map(|m| m.worker_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_scan_population_matches_sync_path() {
        let finder = MatchFinder::new().with_batch_size(2).with_parallelism(2);
        let job = create_job();
        let rows = pool().into_iter().map(Ok::<_, String>);

        let outcome = finder
            .scan_population(&job, stream::iter(rows), DEFAULT_MIN_SCORE, &CancellationToken::new())
            .await;

        assert!(!outcome.cancelled);
        assert_eq!(outcome.scanned, 5);
        assert_eq!(outcome.matches, finder.find_matches(&job, pool(), DEFAULT_MIN_SCORE));
    }

    #[tokio::test]
    async fn test_scan_population_skips_failed_rows() {
        let finder = MatchFinder::new().with_batch_size(3);
        let mut rows: Vec<Result<(WorkerId, WorkerContext), String>> = pool().into_iter().map(Ok).collect();
        rows.insert(1, Err("bad row".to_string()));

        let outcome = finder
            .scan_population(&create_job(), stream::iter(rows), DEFAULT_MIN_SCORE, &CancellationToken::new())
            .await;

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.matches.len(), 3);
    }

    #[tokio::test]
    async fn test_scan_population_honours_cancellation() {
        let finder = MatchFinder::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let rows = pool().into_iter().map(Ok::<_, String>);
        let outcome = finder
            .scan_population(&create_job(), stream::iter(rows), DEFAULT_MIN_SCORE, &cancel)
            .await;

        assert!(outcome.cancelled);
        assert!(outcome.matches.is_empty());
    }
}
