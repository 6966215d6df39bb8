use std::sync::Arc;

use crate::models::{Notification, NotifyRequest, UserResponse, VoiceAction};
use crate::notifications::dispatcher::NotificationDispatcher;
use crate::notifications::DispatchError;
use crate::services::{ApplicationOutcome, ApplicationStore, PostingStore, WorkerStore};

const VOICE_COVER_NOTE: &str = "Applied via voice call";

/// What a callee's voice response led to
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceActionOutcome {
    Applied {
        application_id: String,
        employer_notification: Notification,
    },
    AlreadyApplied {
        application_id: String,
    },
    /// Nothing to do for this response
    Ignored,
}

/// Acts on the choices a worker makes during a voice call
pub struct VoiceActionHandler {
    dispatcher: Arc<NotificationDispatcher>,
    applications: Arc<dyn ApplicationStore>,
    postings: Arc<dyn PostingStore>,
    workers: Arc<dyn WorkerStore>,
}

impl VoiceActionHandler {
    pub fn new(
        dispatcher: Arc<NotificationDispatcher>,
        applications: Arc<dyn ApplicationStore>,
        postings: Arc<dyn PostingStore>,
        workers: Arc<dyn WorkerStore>,
    ) -> Self {
        Self {
            dispatcher,
            applications,
            postings,
            workers,
        }
    }

    /// Handle the response `worker_id` gave on a call
    ///
    /// `apply_to_job` creates at most one application per worker and job
    /// and tells the employer about it. Other actions are logged only.
    pub async fn handle(&self, worker_id: &str, response: &UserResponse) -> Result<VoiceActionOutcome, DispatchError> {
        match response.action {
            VoiceAction::ApplyToJob => match response.job_id.as_deref() {
                Some(job_id) => self.apply_to_job(worker_id, job_id).await,
                None => {
                    tracing::warn!(worker_id, "apply_to_job response without a job id");
                    Ok(VoiceActionOutcome::Ignored)
                }
            },
            VoiceAction::AcceptJob | VoiceAction::DeclineJob | VoiceAction::Unknown => {
                tracing::info!(worker_id, "No handler for voice action {:?}", response.action);
                Ok(VoiceActionOutcome::Ignored)
            }
        }
    }

    async fn apply_to_job(&self, worker_id: &str, job_id: &str) -> Result<VoiceActionOutcome, DispatchError> {
        let Some(job) = self.postings.fetch_posting(job_id).await? else {
            tracing::warn!(worker_id, job_id, "Voice application for unknown job");
            return Ok(VoiceActionOutcome::Ignored);
        };

        let application_id = match self.applications.apply(job_id, worker_id, VOICE_COVER_NOTE).await? {
            ApplicationOutcome::Created(id) => id,
            ApplicationOutcome::Existing(id) => {
                tracing::debug!(worker_id, job_id, "Worker already applied");
                return Ok(VoiceActionOutcome::AlreadyApplied { application_id: id });
            }
        };

        tracing::info!(worker_id, job_id, application_id = %application_id, "Application created from voice call");

        let worker_name = self
            .workers
            .fetch_contact(worker_id)
            .await?
            .and_then(|contact| contact.name)
            .unwrap_or_else(|| "A worker".to_string());

        let employer_notification = self
            .dispatcher
            .notify(NotifyRequest::application_received(
                job.employer_id.as_str(),
                &worker_name,
                &job.title,
                &job.id,
                &application_id,
            ))
            .await?;

        Ok(VoiceActionOutcome::Applied {
            application_id,
            employer_notification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Contact, Coordinates, DeliveryMethod, JobContext, NotificationType, Page, PayType, UserType, WorkerContext,
    };
    use crate::notifications::channels::InAppChannel;
    use crate::notifications::dispatcher::DispatcherConfig;
    use crate::services::{InMemoryStore, NotificationStore};
    use chrono::{TimeZone, Utc};

    async fn setup() -> (Arc<InMemoryStore>, VoiceActionHandler) {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_posting(JobContext {
                id: "j1".to_string(),
                title: "Move boxes".to_string(),
                skill_ids: Default::default(),
                location: Coordinates::new(40.0, -74.0).unwrap(),
                provides_transportation: false,
                pay_amount: 25.0,
                pay_type: PayType::Hourly,
                start_date: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
                created_at: Utc.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap(),
                employer_id: "e1".to_string(),
                city: None,
                zip_code: None,
                address: None,
            })
            .await;
        store
            .insert_user(
                "w1",
                UserType::Worker,
                WorkerContext::default(),
                Contact {
                    name: Some("Dana".to_string()),
                    ..Default::default()
                },
            )
            .await;

        let dispatcher = NotificationDispatcher::new(
            DispatcherConfig::new([DeliveryMethod::InApp]),
            store.clone(),
            store.clone(),
            store.clone(),
        )
        .with_channel(Arc::new(InAppChannel));

        let handler = VoiceActionHandler::new(Arc::new(dispatcher), store.clone(), store.clone(), store.clone());
        (store, handler)
    }

    fn apply(job_id: Option<&str>) -> UserResponse {
        UserResponse {
            action: VoiceAction::ApplyToJob,
            job_id: job_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_apply_creates_application_and_notifies_employer() {
        let (store, handler) = setup().await;

        let employer_notification = match handler.handle("w1", &apply(Some("j1"))).await.unwrap() {
            VoiceActionOutcome::Applied { employer_notification, .. } => employer_notification,
            other => panic!("expected an application, got {:?}", other),
        };

        assert_eq!(employer_notification.recipient_id, "e1");
        assert_eq!(employer_notification.notification_type, NotificationType::ApplicationReceived);
        assert_eq!(employer_notification.body, "Dana applied for \"Move boxes\"");
        assert_eq!(store.application_count().await, 1);
    }

    #[tokio::test]
    async fn test_repeated_apply_is_idempotent() {
        let (store, handler) = setup().await;

        handler.handle("w1", &apply(Some("j1"))).await.unwrap();
        let again = handler.handle("w1", &apply(Some("j1"))).await.unwrap();

        assert!(matches!(again, VoiceActionOutcome::AlreadyApplied { .. }));
        assert_eq!(store.application_count().await, 1);

        let (inbox, total) = store
            .list_for_recipient("e1", false, Page::new(1, 20).unwrap())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(inbox[0].notification_type, NotificationType::ApplicationReceived);
    }

    #[tokio::test]
    async fn test_unknown_job_and_other_actions_are_ignored() {
        let (store, handler) = setup().await;

        assert_eq!(handler.handle("w1", &apply(Some("missing"))).await.unwrap(), VoiceActionOutcome::Ignored);
        assert_eq!(handler.handle("w1", &apply(None)).await.unwrap(), VoiceActionOutcome::Ignored);

        let decline = UserResponse {
            action: VoiceAction::DeclineJob,
            job_id: Some("j1".to_string()),
        };
        assert_eq!(handler.handle("w1", &decline).await.unwrap(), VoiceActionOutcome::Ignored);

        assert_eq!(store.application_count().await, 0);
        assert_eq!(store.notification_count().await, 0);
    }
}
