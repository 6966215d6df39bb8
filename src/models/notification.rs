use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use super::domain::{InputError, JobContext};

/// Namespace for deterministic notification ids
const NOTIFICATION_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a9e_4b7d_4e0a_9c35_d2f8_7a61_b403);

/// Closed set of notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    JobMatch,
    ApplicationReceived,
    ApplicationAccepted,
    ApplicationRejected,
    NewMessage,
    JobCompleted,
    ReviewReceived,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::JobMatch => "JOB_MATCH",
            NotificationType::ApplicationReceived => "APPLICATION_RECEIVED",
            NotificationType::ApplicationAccepted => "APPLICATION_ACCEPTED",
            NotificationType::ApplicationRejected => "APPLICATION_REJECTED",
            NotificationType::NewMessage => "NEW_MESSAGE",
            NotificationType::JobCompleted => "JOB_COMPLETED",
            NotificationType::ReviewReceived => "REVIEW_RECEIVED",
        }
    }
}

impl FromStr for NotificationType {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "JOB_MATCH" => Ok(NotificationType::JobMatch),
            "APPLICATION_RECEIVED" => Ok(NotificationType::ApplicationReceived),
            "APPLICATION_ACCEPTED" => Ok(NotificationType::ApplicationAccepted),
            "APPLICATION_REJECTED" => Ok(NotificationType::ApplicationRejected),
            "NEW_MESSAGE" => Ok(NotificationType::NewMessage),
            "JOB_COMPLETED" => Ok(NotificationType::JobCompleted),
            "REVIEW_RECEIVED" => Ok(NotificationType::ReviewReceived),
            _ => Err(InputError::UnknownNotificationType(s.to_string())),
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMethod {
    #[default]
    InApp,
    Sms,
    VoiceCall,
    Email,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::InApp => "IN_APP",
            DeliveryMethod::Sms => "SMS",
            DeliveryMethod::VoiceCall => "VOICE_CALL",
            DeliveryMethod::Email => "EMAIL",
        }
    }
}

impl FromStr for DeliveryMethod {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "IN_APP" => Ok(DeliveryMethod::InApp),
            "SMS" => Ok(DeliveryMethod::Sms),
            "VOICE_CALL" => Ok(DeliveryMethod::VoiceCall),
            "EMAIL" => Ok(DeliveryMethod::Email),
            _ => Err(InputError::UnknownDeliveryMethod(s.to_string())),
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery lifecycle of a notification
///
/// `Pending -> Delivered | Failed`, `Failed -> Delivered | Failed` on retry,
/// and for voice calls `Pending | Delivered -> Provider(_)` as the provider
/// reports progress. Progress states such as `ringing` may be followed by
/// any provider state; the final call outcomes in [`FINAL_CALL_STATUSES`]
/// only accept a repeat of themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid delivery status transition {from:?} -> {to:?} for {method} notification")]
pub struct InvalidTransition {
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
    pub method: DeliveryMethod,
}

/// Provider call states after which no further callback changes the record
pub const FINAL_CALL_STATUSES: [&str; 6] = ["completed", "no-answer", "busy", "failed", "canceled", "voicemail"];

impl DeliveryStatus {
    /// True once a voice call has reached its final outcome
    pub fn is_final_call_status(&self) -> bool {
        match self {
            DeliveryStatus::Provider(status) => FINAL_CALL_STATUSES.contains(&status.as_str()),
            _ => false,
        }
    }

    pub fn can_transition(&self, next: &DeliveryStatus, method: DeliveryMethod) -> bool {
        use DeliveryStatus::*;
        match (self, next) {
            (Pending, Delivered | Failed) => true,
            (Failed, Delivered | Failed) => true,
            (Pending | Delivered, Provider(_)) => method == DeliveryMethod::VoiceCall,
            (Provider(current), Provider(reported)) => {
                method == DeliveryMethod::VoiceCall && (!self.is_final_call_status() || current == reported)
            }
            _ => false,
        }
    }

    pub fn transition(
        &self,
        next: DeliveryStatus,
        method: DeliveryMethod,
    ) -> Result<DeliveryStatus, InvalidTransition> {
        if self.can_transition(&next, method) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self.clone(),
                to: next,
                method,
            })
        }
    }

    /// Column representation, `PROVIDER:<status>` for provider states
    pub fn to_db(&self) -> String {
        match self {
            DeliveryStatus::Pending => "PENDING".to_string(),
            DeliveryStatus::Delivered => "DELIVERED".to_string(),
            DeliveryStatus::Failed => "FAILED".to_string(),
            DeliveryStatus::Provider(status) => format!("PROVIDER:{}", status),
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(DeliveryStatus::Pending),
            "DELIVERED" => Some(DeliveryStatus::Delivered),
            "FAILED" => Some(DeliveryStatus::Failed),
            other => other
                .strip_prefix("PROVIDER:")
                .map(|s| DeliveryStatus::Provider(s.to_string())),
        }
    }
}

/// A persisted notification record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub payload: serde_json::Value,
    pub delivery_method: DeliveryMethod,
    pub delivery_status: DeliveryStatus,
    pub event_key: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Identity of a notification: deterministic when an event key is given
    pub fn identity(recipient_id: &str, notification_type: NotificationType, event_key: Option<&str>) -> Uuid {
        match event_key {
            Some(key) => {
                let name = format!("{}|{}|{}", recipient_id, notification_type.as_str(), key);
                Uuid::new_v5(&NOTIFICATION_NAMESPACE, name.as_bytes())
            }
            None => Uuid::new_v4(),
        }
    }
}

/// Input for a single Notify call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    #[validate(length(min = 1))]
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub delivery_method: DeliveryMethod,
    #[serde(default)]
    pub event_key: Option<String>,
    #[serde(default)]
    pub contact: Option<super::Contact>,
}

impl NotifyRequest {
    pub fn new(
        recipient_id: impl Into<String>,
        notification_type: NotificationType,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            notification_type,
            title: title.into(),
            body: body.into(),
            payload: serde_json::Value::Null,
            delivery_method: DeliveryMethod::InApp,
            event_key: None,
            contact: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_delivery(mut self, method: DeliveryMethod) -> Self {
        self.delivery_method = method;
        self
    }

    pub fn with_event_key(mut self, key: impl Into<String>) -> Self {
        self.event_key = Some(key.into());
        self
    }

    pub fn with_contact(mut self, contact: super::Contact) -> Self {
        self.contact = Some(contact);
        self
    }

    /// Job-match notification for a worker who cleared the fan-out threshold
    pub fn job_match(recipient_id: impl Into<String>, job: &JobContext, score: u8) -> Self {
        let body = format!(
            "A new job \"{}\" matches your skills! Pay: {}",
            job.title,
            job.pay_label()
        );
        Self::new(recipient_id, NotificationType::JobMatch, "New Job Match!", body)
            .with_payload(serde_json::json!({
                "jobId": job.id,
                "matchScore": score,
                "jobTitle": job.title,
                "payAmount": job.pay_amount,
                "payType": job.pay_type,
                "city": job.city,
                "providesTransportation": job.provides_transportation,
            }))
            .with_event_key(format!("job:{}", job.id))
    }

    pub fn application_received(
        employer_id: impl Into<String>,
        worker_name: &str,
        job_title: &str,
        job_id: &str,
        application_id: &str,
    ) -> Self {
        Self::new(
            employer_id,
            NotificationType::ApplicationReceived,
            "New Application",
            format!("{} applied for \"{}\"", worker_name, job_title),
        )
        .with_payload(serde_json::json!({ "applicationId": application_id, "jobId": job_id }))
        .with_event_key(format!("application:{}:received", application_id))
    }

    /// Accepted/rejected decision on an application
    pub fn application_decision(
        worker_id: impl Into<String>,
        accepted: bool,
        job_title: &str,
        job_id: &str,
        application_id: &str,
    ) -> Self {
        let (kind, title, body) = if accepted {
            (
                NotificationType::ApplicationAccepted,
                "Application Accepted!",
                format!("Your application for \"{}\" has been accepted!", job_title),
            )
        } else {
            (
                NotificationType::ApplicationRejected,
                "Application Update",
                format!("Your application for \"{}\" was not accepted.", job_title),
            )
        };
        Self::new(worker_id, kind, title, body)
            .with_payload(serde_json::json!({ "applicationId": application_id, "jobId": job_id }))
            .with_event_key(format!("application:{}:decision", application_id))
    }

    pub fn job_completed(worker_id: impl Into<String>, job_title: &str, job_id: &str, application_id: &str) -> Self {
        Self::new(
            worker_id,
            NotificationType::JobCompleted,
            "Job Completed!",
            format!(
                "The job \"{}\" has been marked as completed. Don't forget to leave a review!",
                job_title
            ),
        )
        .with_payload(serde_json::json!({ "applicationId": application_id, "jobId": job_id }))
        .with_event_key(format!("application:{}:completed", application_id))
    }

    pub fn review_received(
        subject_id: impl Into<String>,
        author_name: &str,
        rating: u8,
        review_id: &str,
        job_id: Option<&str>,
    ) -> Self {
        Self::new(
            subject_id,
            NotificationType::ReviewReceived,
            "New Review",
            format!("{} left you a {}-star review", author_name, rating),
        )
        .with_payload(serde_json::json!({ "reviewId": review_id, "jobId": job_id }))
        .with_event_key(format!("review:{}", review_id))
    }

    pub fn new_message(recipient_id: impl Into<String>, sender_name: &str, conversation_id: &str, message_id: &str) -> Self {
        Self::new(
            recipient_id,
            NotificationType::NewMessage,
            "New Message",
            format!("{} sent you a message", sender_name),
        )
        .with_payload(serde_json::json!({ "conversationId": conversation_id, "messageId": message_id }))
        .with_event_key(format!("message:{}", message_id))
    }
}
