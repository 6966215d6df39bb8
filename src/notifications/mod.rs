//! Notification records, delivery channels and posting fan-out

pub mod channels;
pub mod context;
pub mod dispatcher;
pub mod fanout;
pub mod provider;
pub mod voice;

use thiserror::Error;
use uuid::Uuid;

use crate::models::InvalidTransition;
use crate::services::StoreError;

pub use channels::{Channel, DeliveryResult, EmailChannel, InAppChannel, SmsChannel, VoiceCallChannel};
pub use context::{ChannelContext, ContextBuilder, ContextDetails};
pub use dispatcher::{DispatcherConfig, NotificationDispatcher};
pub use fanout::{FanOutReport, MatchNotifier};
pub use provider::{ProviderClient, ProviderError};
pub use voice::{VoiceActionHandler, VoiceActionOutcome};

/// Errors surfaced by the dispatcher
///
/// Delivery failures are not errors; they are recorded on the
/// notification itself.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Notification not found: {0}")]
    NotFound(Uuid),
}
