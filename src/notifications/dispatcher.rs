use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Contact, DeliveryMethod, DeliveryStatus, Notification, NotifyRequest};
use crate::notifications::channels::{Channel, DeliveryResult};
use crate::notifications::context::ContextBuilder;
use crate::notifications::DispatchError;
use crate::services::{AppendOutcome, NotificationStore, PostingStore, WorkerStore};

/// Which delivery channels may actually send
///
/// Built once from settings and handed to the dispatcher; a method that
/// is not enabled still gets its record, it just stays pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub enabled_channels: HashSet<DeliveryMethod>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new([DeliveryMethod::InApp])
    }
}

impl DispatcherConfig {
    pub fn new(enabled: impl IntoIterator<Item = DeliveryMethod>) -> Self {
        Self {
            enabled_channels: enabled.into_iter().collect(),
        }
    }

    pub fn is_enabled(&self, method: DeliveryMethod) -> bool {
        self.enabled_channels.contains(&method)
    }

    /// True when some channel other than in-app may send
    pub fn has_outbound(&self) -> bool {
        self.enabled_channels.iter().any(|m| *m != DeliveryMethod::InApp)
    }
}

/// Creates notification records and routes them to delivery channels
pub struct NotificationDispatcher {
    config: DispatcherConfig,
    channels: HashMap<DeliveryMethod, Arc<dyn Channel>>,
    notifications: Arc<dyn NotificationStore>,
    postings: Arc<dyn PostingStore>,
    workers: Arc<dyn WorkerStore>,
}

impl NotificationDispatcher {
    pub fn new(
        config: DispatcherConfig,
        notifications: Arc<dyn NotificationStore>,
        postings: Arc<dyn PostingStore>,
        workers: Arc<dyn WorkerStore>,
    ) -> Self {
        Self {
            config,
            channels: HashMap::new(),
            notifications,
            postings,
            workers,
        }
    }

    /// Register a channel, replacing any earlier one of the same kind
    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Persist a notification, then hand it to its channel
    ///
    /// The record is written before any delivery attempt. A repeated
    /// event key returns the stored record without delivering again.
    /// Delivery problems never fail the call; they show up in the
    /// returned record's status.
    pub async fn notify(&self, request: NotifyRequest) -> Result<Notification, DispatchError> {
        let notification = Notification {
            id: Notification::identity(
                &request.recipient_id,
                request.notification_type,
                request.event_key.as_deref(),
            ),
            recipient_id: request.recipient_id,
            notification_type: request.notification_type,
            title: request.title,
            body: request.body,
            payload: request.payload,
            delivery_method: request.delivery_method,
            delivery_status: DeliveryStatus::Pending,
            event_key: request.event_key,
            is_read: false,
            created_at: Utc::now(),
        };

        let notification = match self.notifications.append(notification).await? {
            AppendOutcome::Inserted(notification) => notification,
            AppendOutcome::Duplicate(existing) => {
                tracing::debug!(
                    notification_id = %existing.id,
                    "Notification already exists for this event, not delivering again"
                );
                return Ok(existing);
            }
        };

        Ok(self.deliver(notification, request.contact.unwrap_or_default()).await)
    }

    /// Re-send a failed notification through its channel
    ///
    /// Notifications in any other state come back unchanged.
    pub async fn retry_delivery(&self, id: Uuid, contact: Option<Contact>) -> Result<Notification, DispatchError> {
        let notification = self
            .notifications
            .fetch(id)
            .await?
            .ok_or(DispatchError::NotFound(id))?;

        if notification.delivery_status != DeliveryStatus::Failed {
            return Ok(notification);
        }

        Ok(self.deliver(notification, contact.unwrap_or_default()).await)
    }

    /// Record call progress reported by the provider
    ///
    /// Providers call back several times per call; each report replaces
    /// the last until a final outcome such as `completed` arrives.
    pub async fn record_provider_status(&self, id: Uuid, status: &str) -> Result<Notification, DispatchError> {
        let mut notification = self
            .notifications
            .fetch(id)
            .await?
            .ok_or(DispatchError::NotFound(id))?;

        let next = notification
            .delivery_status
            .transition(DeliveryStatus::Provider(status.to_string()), notification.delivery_method)?;

        self.notifications.update_status(id, next.clone()).await?;
        notification.delivery_status = next;

        tracing::info!(notification_id = %id, "Provider reported call status {}", status);

        Ok(notification)
    }

    async fn deliver(&self, mut notification: Notification, contact: Contact) -> Notification {
        let method = notification.delivery_method;

        if !self.config.is_enabled(method) {
            tracing::info!(
                notification_id = %notification.id,
                "{} delivery disabled, would have sent {} to {}",
                method,
                notification.notification_type,
                notification.recipient_id
            );
            return notification;
        }

        let Some(channel) = self.channels.get(&method) else {
            tracing::warn!(notification_id = %notification.id, "No channel registered for {}", method);
            return notification;
        };

        let context = ContextBuilder::new(self.postings.as_ref(), self.workers.as_ref())
            .build(&notification, contact)
            .await;

        let next = match channel.send(&context).await {
            DeliveryResult::Delivered => DeliveryStatus::Delivered,
            DeliveryResult::Failed { reason } => {
                tracing::warn!(notification_id = %notification.id, "{} delivery failed: {}", method, reason);
                DeliveryStatus::Failed
            }
            DeliveryResult::Deferred => return notification,
        };

        let next = match notification.delivery_status.transition(next, method) {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(notification_id = %notification.id, "{}", e);
                return notification;
            }
        };

        match self.notifications.update_status(notification.id, next.clone()).await {
            Ok(()) => notification.delivery_status = next,
            Err(e) => tracing::error!(
                notification_id = %notification.id,
                "Failed to record delivery status: {}",
                e
            ),
        }

        notification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationType;
    use crate::notifications::channels::InAppChannel;
    use crate::notifications::context::ChannelContext;
    use crate::services::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedChannel {
        kind: DeliveryMethod,
        result: DeliveryResult,
        sent: AtomicUsize,
    }

    impl ScriptedChannel {
        fn new(kind: DeliveryMethod, result: DeliveryResult) -> Arc<Self> {
            Arc::new(Self {
                kind,
                result,
                sent: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn kind(&self) -> DeliveryMethod {
            self.kind
        }

        async fn send(&self, _context: &ChannelContext) -> DeliveryResult {
            self.sent.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn dispatcher(store: &Arc<InMemoryStore>, enabled: &[DeliveryMethod]) -> NotificationDispatcher {
        NotificationDispatcher::new(
            DispatcherConfig::new(enabled.iter().copied()),
            store.clone(),
            store.clone(),
            store.clone(),
        )
    }

    fn message(recipient: &str) -> NotifyRequest {
        NotifyRequest::new(recipient, NotificationType::NewMessage, "New Message", "Sam sent you a message")
    }

    #[tokio::test]
    async fn test_in_app_stays_pending() {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = dispatcher(&store, &[DeliveryMethod::InApp]).with_channel(Arc::new(InAppChannel));

        let notification = dispatcher.notify(message("w1")).await.unwrap();

        assert_eq!(notification.delivery_status, DeliveryStatus::Pending);
        assert_eq!(store.notification_count().await, 1);
    }

    #[tokio::test]
    async fn test_disabled_channel_returns_pending_without_sending() {
        let store = Arc::new(InMemoryStore::new());
        let voice = ScriptedChannel::new(DeliveryMethod::VoiceCall, DeliveryResult::Delivered);
        let dispatcher = dispatcher(&store, &[DeliveryMethod::InApp]).with_channel(voice.clone());

        let notification = dispatcher
            .notify(message("w1").with_delivery(DeliveryMethod::VoiceCall))
            .await
            .unwrap();

        assert_eq!(notification.delivery_status, DeliveryStatus::Pending);
        assert_eq!(voice.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_then_retry() {
        let store = Arc::new(InMemoryStore::new());
        let failing = ScriptedChannel::new(
            DeliveryMethod::Sms,
            DeliveryResult::Failed {
                reason: "carrier rejected".to_string(),
            },
        );
        let dispatcher = dispatcher(&store, &[DeliveryMethod::Sms]).with_channel(failing.clone());

        let notification = dispatcher
            .notify(message("w1").with_delivery(DeliveryMethod::Sms))
            .await
            .unwrap();
        assert_eq!(notification.delivery_status, DeliveryStatus::Failed);

        let stored = store.fetch(notification.id).await.unwrap().unwrap();
        assert_eq!(stored.delivery_status, DeliveryStatus::Failed);

        let working = ScriptedChannel::new(DeliveryMethod::Sms, DeliveryResult::Delivered);
        let dispatcher = dispatcher_with(&store, working);
        let retried = dispatcher.retry_delivery(notification.id, None).await.unwrap();
        assert_eq!(retried.delivery_status, DeliveryStatus::Delivered);

        // delivered notifications are left alone
        let again = dispatcher.retry_delivery(notification.id, None).await.unwrap();
        assert_eq!(again.delivery_status, DeliveryStatus::Delivered);
    }

    fn dispatcher_with(store: &Arc<InMemoryStore>, channel: Arc<ScriptedChannel>) -> NotificationDispatcher {
        dispatcher(store, &[channel.kind]).with_channel(channel)
    }

    #[tokio::test]
    async fn test_duplicate_event_is_not_delivered_twice() {
        let store = Arc::new(InMemoryStore::new());
        let sms = ScriptedChannel::new(DeliveryMethod::Sms, DeliveryResult::Delivered);
        let dispatcher = dispatcher_with(&store, sms.clone());

        let request = message("w1")
            .with_delivery(DeliveryMethod::Sms)
            .with_event_key("message:m1");

        let first = dispatcher.notify(request.clone()).await.unwrap();
        let second = dispatcher.notify(request).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(sms.sent.load(Ordering::SeqCst), 1);
        assert_eq!(store.notification_count().await, 1);
    }

    #[tokio::test]
    async fn test_provider_status_only_for_voice_calls() {
        let store = Arc::new(InMemoryStore::new());
        let voice = ScriptedChannel::new(DeliveryMethod::VoiceCall, DeliveryResult::Delivered);
        let dispatcher = dispatcher_with(&store, voice);

        let call = dispatcher
            .notify(message("w1").with_delivery(DeliveryMethod::VoiceCall))
            .await
            .unwrap();
        let updated = dispatcher.record_provider_status(call.id, "completed").await.unwrap();
        assert_eq!(updated.delivery_status, DeliveryStatus::Provider("completed".to_string()));

        let in_app = dispatcher.notify(message("w2")).await.unwrap();
        let err = dispatcher.record_provider_status(in_app.id, "completed").await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition(_)));

        let missing = dispatcher.record_provider_status(Uuid::new_v4(), "busy").await.unwrap_err();
        assert!(matches!(missing, DispatchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_call_progress_then_final_status() {
        let store = Arc::new(InMemoryStore::new());
        let voice = ScriptedChannel::new(DeliveryMethod::VoiceCall, DeliveryResult::Delivered);
        let dispatcher = dispatcher_with(&store, voice);

        let call = dispatcher
            .notify(message("w1").with_delivery(DeliveryMethod::VoiceCall))
            .await
            .unwrap();

        let ringing = dispatcher.record_provider_status(call.id, "ringing").await.unwrap();
        assert_eq!(ringing.delivery_status, DeliveryStatus::Provider("ringing".to_string()));

        let completed = dispatcher.record_provider_status(call.id, "completed").await.unwrap();
        assert_eq!(completed.delivery_status, DeliveryStatus::Provider("completed".to_string()));

        let stored = store.fetch(call.id).await.unwrap().unwrap();
        assert_eq!(stored.delivery_status, DeliveryStatus::Provider("completed".to_string()));

        // a late progress report cannot reopen a finished call
        let late = dispatcher.record_provider_status(call.id, "ringing").await.unwrap_err();
        assert!(matches!(late, DispatchError::InvalidTransition(_)));
    }
}
