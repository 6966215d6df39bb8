use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::MatchFinder;
use crate::models::{Contact, DeliveryMethod, JobContext, MatchCandidate, Notification, NotifyRequest, WorkerId};
use crate::notifications::dispatcher::NotificationDispatcher;
use crate::notifications::DispatchError;
use crate::services::WorkerStore;

/// Outcome of notifying the matches for one posting
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub notifications: Vec<Notification>,
    /// Recipients whose notification could not be created
    pub failed: Vec<(WorkerId, DispatchError)>,
    pub scanned: usize,
    pub cancelled: bool,
}

/// Notifies compatible workers when a posting is created
pub struct MatchNotifier {
    dispatcher: Arc<NotificationDispatcher>,
    workers: Arc<dyn WorkerStore>,
    finder: MatchFinder,
    min_score: u8,
    concurrency: usize,
    default_delivery: DeliveryMethod,
}

impl MatchNotifier {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, workers: Arc<dyn WorkerStore>, finder: MatchFinder) -> Self {
        Self {
            dispatcher,
            workers,
            finder,
            min_score: 60,
            concurrency: 8,
            default_delivery: DeliveryMethod::InApp,
        }
    }

    pub fn with_min_score(mut self, min_score: u8) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_default_delivery(mut self, method: DeliveryMethod) -> Self {
        self.default_delivery = method;
        self
    }

    /// Scan the worker population for `job` and send one job-match
    /// notification per worker at or above the notification threshold
    ///
    /// Notifications go out with bounded concurrency, in match order.
    /// One recipient's failure is reported in the result and does not
    /// affect the others. A cancelled scan sends nothing.
    pub async fn notify_matching_workers(&self, job: &JobContext, cancel: &CancellationToken) -> FanOutReport {
        let candidates = self.workers.stream_candidates(&job.employer_id);
        let outcome = self
            .finder
            .scan_population(job, candidates, self.min_score, cancel)
            .await;

        let mut report = FanOutReport {
            scanned: outcome.scanned,
            cancelled: outcome.cancelled,
            ..Default::default()
        };

        if outcome.cancelled {
            tracing::info!(job_id = %job.id, "Match scan cancelled, no notifications sent");
            return report;
        }

        let results: Vec<(WorkerId, Result<Notification, DispatchError>)> = stream::iter(outcome.matches)
            .map(|candidate| async move {
                let worker_id = candidate.worker_id.clone();
                let result = self.notify_candidate(job, candidate).await;
                (worker_id, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (worker_id, result) in results {
            match result {
                Ok(notification) => report.notifications.push(notification),
                Err(e) => {
                    tracing::warn!(job_id = %job.id, worker_id = %worker_id, "Failed to notify worker: {}", e);
                    report.failed.push((worker_id, e));
                }
            }
        }

        tracing::info!(
            job_id = %job.id,
            "Notified {} matching workers ({} failed)",
            report.notifications.len(),
            report.failed.len()
        );

        report
    }

    async fn notify_candidate(&self, job: &JobContext, candidate: MatchCandidate) -> Result<Notification, DispatchError> {
        let (method, contact) = self.resolve_delivery(&candidate.worker_id).await;

        let mut request = NotifyRequest::job_match(candidate.worker_id, job, candidate.score).with_delivery(method);
        if let Some(contact) = contact {
            request = request.with_contact(contact);
        }

        self.dispatcher.notify(request).await
    }

    /// Pick the worker's preferred channel when it is enabled
    ///
    /// Contact details are only looked up when an outbound channel could
    /// be used; a failed lookup falls back to the default method.
    async fn resolve_delivery(&self, worker_id: &str) -> (DeliveryMethod, Option<Contact>) {
        let config = self.dispatcher.config();
        if !config.has_outbound() {
            return (self.default_delivery, None);
        }

        let contact = match self.workers.fetch_contact(worker_id).await {
            Ok(contact) => contact,
            Err(e) => {
                tracing::warn!(worker_id, "Contact lookup failed: {}", e);
                return (self.default_delivery, None);
            }
        };

        let method = contact
            .as_ref()
            .and_then(|c| c.preferred_delivery)
            .filter(|m| config.is_enabled(*m))
            .unwrap_or(self.default_delivery);

        (method, contact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, DeliveryStatus, NotificationType, PayType, UserType, WorkerContext};
    use crate::notifications::channels::InAppChannel;
    use crate::notifications::dispatcher::DispatcherConfig;
    use crate::services::InMemoryStore;
    use chrono::Utc;

    fn job() -> JobContext {
        JobContext {
            id: "job-1".to_string(),
            title: "Paint fence".to_string(),
            skill_ids: ["painting".to_string()].into_iter().collect(),
            location: Coordinates::new(30.0, -97.0).unwrap(),
            provides_transportation: false,
            pay_amount: 20.0,
            pay_type: PayType::Hourly,
            start_date: Utc::now(),
            created_at: Utc::now(),
            employer_id: "emp".to_string(),
            city: Some("Austin".to_string()),
            zip_code: None,
            address: None,
        }
    }

    fn worker(skill: &str, lat: f64) -> WorkerContext {
        WorkerContext {
            skill_ids: [skill.to_string()].into_iter().collect(),
            location: Some(Coordinates::new(lat, -97.0).unwrap()),
            needs_transportation: true,
        }
    }

    async fn notifier(store: &Arc<InMemoryStore>, enabled: &[DeliveryMethod]) -> MatchNotifier {
        let dispatcher = NotificationDispatcher::new(
            DispatcherConfig::new(enabled.iter().copied()),
            store.clone(),
            store.clone(),
            store.clone(),
        )
        .with_channel(Arc::new(InAppChannel));

        MatchNotifier::new(Arc::new(dispatcher), store.clone(), MatchFinder::new().with_batch_size(2))
    }

    #[tokio::test]
    async fn test_only_matches_above_threshold_are_notified() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_user("near", UserType::Worker, worker("painting", 30.0), Contact::default()).await;
        store.insert_user("far", UserType::Worker, worker("painting", 31.0), Contact::default()).await;
        store.insert_user("wrong", UserType::Worker, worker("plumbing", 30.0), Contact::default()).await;
        store.insert_user("emp", UserType::Both, worker("painting", 30.0), Contact::default()).await;

        let report = notifier(&store, &[DeliveryMethod::InApp])
            .await
            .notify_matching_workers(&job(), &CancellationToken::new())
            .await;

        assert_eq!(report.notifications.len(), 1);
        let notification = &report.notifications[0];
        assert_eq!(notification.recipient_id, "near");
        assert_eq!(notification.notification_type, NotificationType::JobMatch);
        assert_eq!(notification.delivery_status, DeliveryStatus::Pending);
        assert_eq!(notification.payload["matchScore"], 83);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_scan_sends_nothing() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_user("near", UserType::Worker, worker("painting", 30.0), Contact::default()).await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = notifier(&store, &[DeliveryMethod::InApp])
            .await
            .notify_matching_workers(&job(), &cancel)
            .await;

        assert!(report.cancelled);
        assert!(report.notifications.is_empty());
        assert_eq!(store.notification_count().await, 0);
    }

    #[tokio::test]
    async fn test_preferred_channel_used_when_enabled() {
        let store = Arc::new(InMemoryStore::new());
        let contact = Contact {
            phone: Some("+15551234".to_string()),
            preferred_delivery: Some(DeliveryMethod::VoiceCall),
            ..Default::default()
        };
        store.insert_user("near", UserType::Worker, worker("painting", 30.0), contact).await;

        let report = notifier(&store, &[DeliveryMethod::InApp, DeliveryMethod::VoiceCall])
            .await
            .notify_matching_workers(&job(), &CancellationToken::new())
            .await;

        // no voice channel is registered, so the record stays pending
        assert_eq!(report.notifications[0].delivery_method, DeliveryMethod::VoiceCall);
        assert_eq!(report.notifications[0].delivery_status, DeliveryStatus::Pending);
    }
}
