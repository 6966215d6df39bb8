use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::ProviderSettings;

/// Errors that can occur when talking to the delivery provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error {status}: {message}")]
    ApiError { status: u16, message: String },

    /// The provider asked us to come back later
    #[error("Provider throttled the request ({0})")]
    Throttled(u16),

    #[error("Recipient has no {0} on file")]
    MissingContact(&'static str),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Throttled(_))
    }
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    call_id: Option<String>,
}

/// HTTP client for the outbound voice, SMS and e-mail provider
///
/// Every request is a JSON POST with bearer authentication. The
/// provider answers 2xx when it accepted the message, 429/503 when it
/// wants the caller to retry later.
pub struct ProviderClient {
    base_url: String,
    api_key: String,
    voice_agent_id: String,
    sms_sender: Option<String>,
    email_sender: Option<String>,
    client: Client,
}

impl ProviderClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            voice_agent_id: settings.voice_agent_id.clone(),
            sms_sender: settings.sms_sender.clone(),
            email_sender: settings.email_sender.clone(),
            client,
        })
    }

    /// Start an outbound voice call; returns the provider's call id
    ///
    /// `metadata` is echoed back by the provider in status callbacks.
    pub async fn place_call(&self, phone: &str, context: &Value, metadata: Value) -> Result<Option<String>, ProviderError> {
        let body = json!({
            "to": phone,
            "agent_id": self.voice_agent_id,
            "context": context,
            "metadata": metadata,
        });

        let response = self.post("/v1/calls", &body).await?;
        let parsed: CallResponse = response.json().await.unwrap_or(CallResponse { call_id: None });

        Ok(parsed.call_id)
    }

    pub async fn send_sms(&self, phone: &str, text: &str) -> Result<(), ProviderError> {
        let body = json!({
            "to": phone,
            "from": self.sms_sender,
            "body": text,
        });

        self.post("/v1/messages", &body).await.map(|_| ())
    }

    pub async fn send_email(&self, address: &str, subject: &str, text: &str) -> Result<(), ProviderError> {
        let body = json!({
            "to": address,
            "from": self.email_sender,
            "subject": subject,
            "text": text,
        });

        self.post("/v1/emails", &body).await.map(|_| ())
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{}", self.base_url, path);

        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(ProviderError::Throttled(status.as_u16()));
        }

        let message = response.text().await.unwrap_or_default();
        Err(ProviderError::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}
