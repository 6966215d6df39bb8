use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::models::DeliveryMethod;
use crate::notifications::context::ChannelContext;
use crate::notifications::provider::{ProviderClient, ProviderError};

/// Outcome of handing a notification to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    Failed { reason: String },
    /// Accepted for later delivery; the record stays pending
    Deferred,
}

impl From<Result<(), ProviderError>> for DeliveryResult {
    fn from(result: Result<(), ProviderError>) -> Self {
        match result {
            Ok(()) => DeliveryResult::Delivered,
            Err(e) if e.is_retryable() => DeliveryResult::Deferred,
            Err(e) => DeliveryResult::Failed { reason: e.to_string() },
        }
    }
}

/// A transport that turns a notification record into an outward message
#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> DeliveryMethod;

    async fn send(&self, context: &ChannelContext) -> DeliveryResult;
}

/// In-app delivery; the persisted record is the message
///
/// Clients pick the record up from the inbox, so there is nothing to
/// confirm here and the status stays pending.
#[derive(Debug, Clone, Copy, Default)]
pub struct InAppChannel;

#[async_trait]
impl Channel for InAppChannel {
    fn kind(&self) -> DeliveryMethod {
        DeliveryMethod::InApp
    }

    async fn send(&self, _context: &ChannelContext) -> DeliveryResult {
        DeliveryResult::Deferred
    }
}

pub struct SmsChannel {
    client: Arc<ProviderClient>,
}

impl SmsChannel {
    pub fn new(client: Arc<ProviderClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Channel for SmsChannel {
    fn kind(&self) -> DeliveryMethod {
        DeliveryMethod::Sms
    }

    async fn send(&self, context: &ChannelContext) -> DeliveryResult {
        let Some(phone) = context.contact.phone.as_deref() else {
            return Err::<(), _>(ProviderError::MissingContact("phone number")).into();
        };

        let text = format!("{}: {}", context.title, context.body);
        self.client.send_sms(phone, &text).await.into()
    }
}

/// Voice-agent call; the agent gets the channel context as its script
pub struct VoiceCallChannel {
    client: Arc<ProviderClient>,
}

impl VoiceCallChannel {
    pub fn new(client: Arc<ProviderClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Channel for VoiceCallChannel {
    fn kind(&self) -> DeliveryMethod {
        DeliveryMethod::VoiceCall
    }

    async fn send(&self, context: &ChannelContext) -> DeliveryResult {
        let Some(phone) = context.contact.phone.as_deref() else {
            return Err::<(), _>(ProviderError::MissingContact("phone number")).into();
        };

        let metadata = json!({
            "notificationId": context.notification_id,
            "userId": context.recipient_id,
        });

        match self.client.place_call(phone, &context.to_value(), metadata).await {
            Ok(call_id) => {
                tracing::info!(
                    notification_id = %context.notification_id,
                    "Voice call started: {}",
                    call_id.as_deref().unwrap_or("unknown")
                );
                DeliveryResult::Delivered
            }
            Err(e) => Err::<(), _>(e).into(),
        }
    }
}

pub struct EmailChannel {
    client: Arc<ProviderClient>,
}

impl EmailChannel {
    pub fn new(client: Arc<ProviderClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn kind(&self) -> DeliveryMethod {
        DeliveryMethod::Email
    }

    async fn send(&self, context: &ChannelContext) -> DeliveryResult {
        let Some(address) = context.contact.email.as_deref() else {
            return Err::<(), _>(ProviderError::MissingContact("e-mail address")).into();
        };

        self.client.send_email(address, &context.title, &context.body).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::models::{Contact, NotificationType};
    use crate::notifications::context::{ContextDetails, GeneralDetails};
    use uuid::Uuid;

    fn context(contact: Contact) -> ChannelContext {
        ChannelContext {
            notification_id: Uuid::new_v4(),
            recipient_id: "w1".to_string(),
            contact,
            notification_type: NotificationType::JobCompleted,
            title: "Job Completed!".to_string(),
            body: "Nice work".to_string(),
            details: ContextDetails::General(GeneralDetails::default()),
        }
    }

    fn client(base_url: String) -> Arc<ProviderClient> {
        Arc::new(
            ProviderClient::new(&ProviderSettings {
                base_url,
                api_key: "k".to_string(),
                voice_agent_id: "agent".to_string(),
                sms_sender: None,
                email_sender: None,
                timeout_secs: 5,
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_in_app_is_deferred() {
        let result = InAppChannel.send(&context(Contact::default())).await;
        assert_eq!(result, DeliveryResult::Deferred);
    }

    #[tokio::test]
    async fn test_missing_phone_fails_without_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/v1/calls").expect(0).create_async().await;

        let channel = VoiceCallChannel::new(client(server.url()));
        let result = channel.send(&context(Contact::default())).await;

        assert!(matches!(result, DeliveryResult::Failed { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_voice_call_delivered() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/calls")
            .with_status(201)
            .with_body(r#"{"call_id": "c-1"}"#)
            .create_async()
            .await;

        let channel = VoiceCallChannel::new(client(server.url()));
        let contact = Contact {
            phone: Some("+15551234".to_string()),
            ..Default::default()
        };

        assert_eq!(channel.send(&context(contact)).await, DeliveryResult::Delivered);
    }

    #[tokio::test]
    async fn test_service_unavailable_is_deferred() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/v1/emails").with_status(503).create_async().await;

        let channel = EmailChannel::new(client(server.url()));
        let contact = Contact {
            email: Some("w1@example.com".to_string()),
            ..Default::default()
        };

        assert_eq!(channel.send(&context(contact)).await, DeliveryResult::Deferred);
    }
}
