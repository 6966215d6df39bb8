use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Contact, DeliveryStatus, JobContext, Notification, Page, WorkerContext, WorkerId,
};

/// Errors raised by the persistence collaborators
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A worker read from the candidate population
pub type CandidateRow = Result<(WorkerId, WorkerContext), StoreError>;

/// Read access to job postings
#[async_trait]
pub trait PostingStore: Send + Sync {
    async fn fetch_posting(&self, job_id: &str) -> Result<Option<JobContext>, StoreError>;

    /// All postings currently open for applications
    async fn fetch_open_postings(&self) -> Result<Vec<JobContext>, StoreError>;
}

/// Read access to worker profiles
#[async_trait]
pub trait WorkerStore: Send + Sync {
    async fn fetch_worker(&self, worker_id: &str) -> Result<Option<WorkerContext>, StoreError>;

    async fn fetch_contact(&self, user_id: &str) -> Result<Option<Contact>, StoreError>;

    /// Stream every user that can take work, except `exclude_user_id`
    ///
    /// A row that fails to decode is yielded as an error so the scan can
    /// skip it and keep going.
    fn stream_candidates<'a>(&'a self, exclude_user_id: &'a str) -> BoxStream<'a, CandidateRow>;
}

/// Result of appending a notification
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Inserted(Notification),
    /// A record with the same identity already exists; it is returned as stored
    Duplicate(Notification),
}

impl AppendOutcome {
    pub fn into_inner(self) -> Notification {
        match self {
            AppendOutcome::Inserted(n) | AppendOutcome::Duplicate(n) => n,
        }
    }
}

/// Append-mostly storage for notification records
///
/// Implementations enforce uniqueness on the notification id, which encodes
/// (recipient, type, source event) when an event key is supplied.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn append(&self, notification: Notification) -> Result<AppendOutcome, StoreError>;

    async fn update_status(&self, id: Uuid, status: DeliveryStatus) -> Result<(), StoreError>;

    async fn fetch(&self, id: Uuid) -> Result<Option<Notification>, StoreError>;

    /// Newest first, with the total count for the filter
    async fn list_for_recipient(
        &self,
        recipient_id: &str,
        unread_only: bool,
        page: Page,
    ) -> Result<(Vec<Notification>, usize), StoreError>;

    async fn unread_count(&self, recipient_id: &str) -> Result<usize, StoreError>;

    /// Returns false when no notification with that id belongs to the recipient
    async fn mark_read(&self, id: Uuid, recipient_id: &str) -> Result<bool, StoreError>;
}

/// Result of recording a job application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationOutcome {
    Created(String),
    /// The worker had already applied; carries the stored application id
    Existing(String),
}

impl ApplicationOutcome {
    pub fn application_id(&self) -> &str {
        match self {
            ApplicationOutcome::Created(id) | ApplicationOutcome::Existing(id) => id,
        }
    }
}

/// Write access to job applications
///
/// A worker holds at most one application per job.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn apply(&self, job_id: &str, worker_id: &str, cover_note: &str) -> Result<ApplicationOutcome, StoreError>;
}
