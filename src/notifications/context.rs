use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Contact, JobContext, Notification, NotificationType};
use crate::services::{PostingStore, WorkerStore};

/// Everything a channel needs to reach one recipient
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelContext {
    pub notification_id: Uuid,
    pub recipient_id: String,
    /// Supplied by the caller; never serialized to the provider
    #[serde(skip)]
    pub contact: Contact,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub details: ContextDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextDetails {
    JobMatch(JobMatchDetails),
    ApplicationAccepted(AcceptedJobDetails),
    General(GeneralDetails),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMatchDetails {
    pub job_id: String,
    pub title: String,
    /// e.g. `$25 hourly`
    pub pay: String,
    pub city: Option<String>,
    pub address: Option<String>,
    pub start_date: DateTime<Utc>,
    pub provides_transportation: bool,
    pub employer_name: Option<String>,
    pub match_score: Option<u8>,
}

/// Job details shared with a worker once they are hired, including the
/// employer's phone number
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedJobDetails {
    pub job_id: String,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub employer_name: Option<String>,
    pub employer_phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralDetails {
    pub job_id: Option<String>,
    pub application_id: Option<String>,
    pub review_id: Option<String>,
}

impl ChannelContext {
    /// Provider-facing JSON for voice agents
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Builds channel contexts, resolving job and employer details from the
/// stores
pub struct ContextBuilder<'a> {
    postings: &'a dyn PostingStore,
    workers: &'a dyn WorkerStore,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(postings: &'a dyn PostingStore, workers: &'a dyn WorkerStore) -> Self {
        Self { postings, workers }
    }

    /// Details degrade to [`ContextDetails::General`] when the job it
    /// refers to cannot be loaded.
    pub async fn build(&self, notification: &Notification, contact: Contact) -> ChannelContext {
        let general = general_details(&notification.payload);

        let details = match notification.notification_type {
            NotificationType::JobMatch => match self.load_job(general.job_id.as_deref()).await {
                Some((job, employer)) => ContextDetails::JobMatch(JobMatchDetails {
                    pay: format!("${} {}", job.pay_amount, job.pay_type.as_str().to_lowercase()),
                    job_id: job.id,
                    title: job.title,
                    city: job.city,
                    address: job.address,
                    start_date: job.start_date,
                    provides_transportation: job.provides_transportation,
                    employer_name: employer.and_then(|e| e.name),
                    match_score: notification
                        .payload
                        .get("matchScore")
                        .and_then(|s| s.as_u64())
                        .and_then(|s| u8::try_from(s).ok()),
                }),
                None => ContextDetails::General(general),
            },
            NotificationType::ApplicationAccepted => {
                match self.load_job(general.job_id.as_deref()).await {
                    Some((job, employer)) => {
                        let (employer_name, employer_phone) = employer
                            .map(|e| (e.name, e.phone))
                            .unwrap_or_default();
                        ContextDetails::ApplicationAccepted(AcceptedJobDetails {
                            job_id: job.id,
                            title: job.title,
                            start_date: job.start_date,
                            address: job.address,
                            city: job.city,
                            employer_name,
                            employer_phone,
                        })
                    }
                    None => ContextDetails::General(general),
                }
            }
            NotificationType::ApplicationReceived
            | NotificationType::ApplicationRejected
            | NotificationType::NewMessage
            | NotificationType::JobCompleted
            | NotificationType::ReviewReceived => ContextDetails::General(general),
        };

        ChannelContext {
            notification_id: notification.id,
            recipient_id: notification.recipient_id.clone(),
            contact,
            notification_type: notification.notification_type,
            title: notification.title.clone(),
            body: notification.body.clone(),
            details,
        }
    }

    async fn load_job(&self, job_id: Option<&str>) -> Option<(JobContext, Option<Contact>)> {
        let job_id = job_id?;

        let job = match self.postings.fetch_posting(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::debug!(job_id, "Job referenced by notification no longer exists");
                return None;
            }
            Err(e) => {
                tracing::warn!(job_id, "Failed to load job for channel context: {}", e);
                return None;
            }
        };

        let employer = match self.workers.fetch_contact(&job.employer_id).await {
            Ok(contact) => contact,
            Err(e) => {
                tracing::warn!(job_id, "Failed to load employer contact: {}", e);
                None
            }
        };

        Some((job, employer))
    }
}

fn general_details(payload: &serde_json::Value) -> GeneralDetails {
    let field = |name: &str| payload.get(name).and_then(|v| v.as_str()).map(str::to_string);

    GeneralDetails {
        job_id: field("jobId"),
        application_id: field("applicationId"),
        review_id: field("reviewId"),
    }
}
