use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Contact, DeliveryStatus, JobContext, Notification, Page, UserType, WorkerContext,
};
use crate::services::store::{
    AppendOutcome, ApplicationOutcome, ApplicationStore, CandidateRow, NotificationStore, PostingStore,
    StoreError, WorkerStore,
};

#[derive(Debug, Clone)]
struct UserRecord {
    user_type: UserType,
    context: WorkerContext,
    contact: Contact,
}

/// In-process implementation of every store, for development and tests
///
/// Postings are kept in insertion order; users stream in id order so scans
/// are reproducible.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    postings: RwLock<Vec<JobContext>>,
    users: RwLock<HashMap<String, UserRecord>>,
    notifications: RwLock<HashMap<Uuid, Notification>>,
    /// (job id, worker id) -> application id
    applications: RwLock<HashMap<(String, String), String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_posting(&self, job: JobContext) {
        let mut postings = self.postings.write().await;
        postings.retain(|p| p.id != job.id);
        postings.push(job);
    }

    pub async fn insert_user(
        &self,
        user_id: impl Into<String>,
        user_type: UserType,
        context: WorkerContext,
        contact: Contact,
    ) {
        self.users.write().await.insert(
            user_id.into(),
            UserRecord {
                user_type,
                context,
                contact,
            },
        );
    }

    pub async fn notification_count(&self) -> usize {
        self.notifications.read().await.len()
    }

    pub async fn application_count(&self) -> usize {
        self.applications.read().await.len()
    }
}

#[async_trait]
impl PostingStore for InMemoryStore {
    async fn fetch_posting(&self, job_id: &str) -> Result<Option<JobContext>, StoreError> {
        Ok(self.postings.read().await.iter().find(|p| p.id == job_id).cloned())
    }

    async fn fetch_open_postings(&self) -> Result<Vec<JobContext>, StoreError> {
        Ok(self.postings.read().await.clone())
    }
}

#[async_trait]
impl WorkerStore for InMemoryStore {
    async fn fetch_worker(&self, worker_id: &str) -> Result<Option<WorkerContext>, StoreError> {
        Ok(self.users.read().await.get(worker_id).map(|u| u.context.clone()))
    }

    async fn fetch_contact(&self, user_id: &str) -> Result<Option<Contact>, StoreError> {
        Ok(self.users.read().await.get(user_id).map(|u| u.contact.clone()))
    }

    fn stream_candidates<'a>(&'a self, exclude_user_id: &'a str) -> BoxStream<'a, CandidateRow> {
        stream::once(async move {
            let users = self.users.read().await;
            let mut rows: Vec<_> = users
                .iter()
                .filter(|(id, user)| user.user_type.can_work() && id.as_str() != exclude_user_id)
                .map(|(id, user)| (id.clone(), user.context.clone()))
                .collect();
            rows.sort_by(|a, b| a.0.cmp(&b.0));
            stream::iter(rows.into_iter().map(Ok))
        })
        .flatten()
        .boxed()
    }
}

#[async_trait]
impl ApplicationStore for InMemoryStore {
    async fn apply(&self, job_id: &str, worker_id: &str, _cover_note: &str) -> Result<ApplicationOutcome, StoreError> {
        let mut applications = self.applications.write().await;
        let key = (job_id.to_string(), worker_id.to_string());
        if let Some(existing) = applications.get(&key) {
            return Ok(ApplicationOutcome::Existing(existing.clone()));
        }
        let id = Uuid::new_v4().to_string();
        applications.insert(key, id.clone());
        Ok(ApplicationOutcome::Created(id))
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn append(&self, notification: Notification) -> Result<AppendOutcome, StoreError> {
        let mut notifications = self.notifications.write().await;
        if let Some(existing) = notifications.get(&notification.id) {
            return Ok(AppendOutcome::Duplicate(existing.clone()));
        }
        notifications.insert(notification.id, notification.clone());
        Ok(AppendOutcome::Inserted(notification))
    }

    async fn update_status(&self, id: Uuid, status: DeliveryStatus) -> Result<(), StoreError> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("notification {}", id)))?;
        notification.delivery_status = status;
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        Ok(self.notifications.read().await.get(&id).cloned())
    }

    async fn list_for_recipient(
        &self,
        recipient_id: &str,
        unread_only: bool,
        page: Page,
    ) -> Result<(Vec<Notification>, usize), StoreError> {
        let notifications = self.notifications.read().await;
        let mut matching: Vec<Notification> = notifications
            .values()
            .filter(|n| n.recipient_id == recipient_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        let total = matching.len();
        Ok((page.slice(matching), total))
    }

    async fn unread_count(&self, recipient_id: &str) -> Result<usize, StoreError> {
        Ok(self
            .notifications
            .read()
            .await
            .values()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
            .count())
    }

    async fn mark_read(&self, id: Uuid, recipient_id: &str) -> Result<bool, StoreError> {
        let mut notifications = self.notifications.write().await;
        match notifications.get_mut(&id) {
            Some(n) if n.recipient_id == recipient_id => {
                n.is_read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryMethod, NotificationType};
    use chrono::Utc;

    fn notification(recipient: &str, key: Option<&str>) -> Notification {
        Notification {
            id: Notification::identity(recipient, NotificationType::JobMatch, key),
            recipient_id: recipient.to_string(),
            notification_type: NotificationType::JobMatch,
            title: "New Job Match!".to_string(),
            body: "body".to_string(),
            payload: serde_json::Value::Null,
            delivery_method: DeliveryMethod::InApp,
            delivery_status: DeliveryStatus::Pending,
            event_key: key.map(str::to_string),
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_rejects_duplicate_identity() {
        let store = InMemoryStore::new();

        let first = store.append(notification("w1", Some("job:1"))).await.unwrap();
        let second = store.append(notification("w1", Some("job:1"))).await.unwrap();

        assert!(matches!(first, AppendOutcome::Inserted(_)));
        assert!(matches!(second, AppendOutcome::Duplicate(_)));
        assert_eq!(store.notification_count().await, 1);
    }

    #[tokio::test]
    async fn test_candidates_exclude_employers_and_poster() {
        let store = InMemoryStore::new();
        store.insert_user("a", UserType::Worker, WorkerContext::default(), Contact::default()).await;
        store.insert_user("b", UserType::Both, WorkerContext::default(), Contact::default()).await;
        store.insert_user("c", UserType::Employer, WorkerContext::default(), Contact::default()).await;

        let ids: Vec<String> = store
            .stream_candidates("b")
            .map(|row| row.unwrap().0)
            .collect()
            .await;

        assert_eq!(ids, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_mark_read_checks_recipient() {
        let store = InMemoryStore::new();
        let n = store.append(notification("w1", None)).await.unwrap().into_inner();

        assert!(!store.mark_read(n.id, "someone-else").await.unwrap());
        assert_eq!(store.unread_count("w1").await.unwrap(), 1);
        assert!(store.mark_read(n.id, "w1").await.unwrap());
        assert_eq!(store.unread_count("w1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_apply_once_per_worker_and_job() {
        let store = InMemoryStore::new();

        let first = store.apply("j1", "w1", "").await.unwrap();
        let second = store.apply("j1", "w1", "").await.unwrap();
        let other_job = store.apply("j2", "w1", "").await.unwrap();

        assert!(matches!(first, ApplicationOutcome::Created(_)));
        assert_eq!(second, ApplicationOutcome::Existing(first.application_id().to_string()));
        assert_ne!(other_job.application_id(), first.application_id());
        assert_eq!(store.application_count().await, 2);
    }
}
