use serde::{Deserialize, Serialize};
use validator::Validate;

use super::domain::{Coordinates, InputError, ListingFilter, Page, SortMode};

/// Query string for the job listing endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsQuery {
    /// Viewer whose profile drives match scores (supplied by the auth layer)
    #[serde(default)]
    pub viewer_id: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    /// Comma separated skill ids
    #[serde(default)]
    pub skill_ids: Option<String>,
    #[serde(default)]
    pub provides_transportation: Option<bool>,
}

impl ListJobsQuery {
    pub fn sort_mode(&self) -> Result<SortMode, InputError> {
        match &self.sort_by {
            Some(s) => s.parse(),
            None => Ok(SortMode::default()),
        }
    }

    pub fn page(&self, default_size: usize, max_size: usize) -> Result<Page, InputError> {
        let size = self.limit.unwrap_or(default_size as i64);
        let page = Page::new(self.page.unwrap_or(1), size)?;
        Ok(Page {
            size: page.size.min(max_size),
            ..page
        })
    }

    pub fn coordinates(&self) -> Result<Option<Coordinates>, InputError> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }

    pub fn filter(&self) -> ListingFilter {
        ListingFilter {
            city: self.city.clone().filter(|c| !c.trim().is_empty()),
            zip_code: self.zip_code.clone().filter(|z| !z.trim().is_empty()),
            skill_ids: self
                .skill_ids
                .as_deref()
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            provides_transportation_only: self.provides_transportation.unwrap_or(false),
        }
    }
}

/// Query string for the match preview endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchesQuery {
    #[serde(default)]
    pub min_score: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
    #[validate(length(min = 1))]
    pub recipient_id: String,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub unread_only: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    #[validate(length(min = 1))]
    pub recipient_id: String,
}

/// Call status callback from the voice provider
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProviderStatusRequest {
    #[validate(length(min = 1))]
    pub call_id: String,
    #[validate(length(min = 1))]
    pub status: String,
    pub metadata: ProviderMetadata,
    /// What the callee chose during the call, if anything
    #[serde(default)]
    pub user_response: Option<UserResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub action: VoiceAction,
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Action picked by the callee on a voice call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceAction {
    ApplyToJob,
    AcceptJob,
    DeclineJob,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetadata {
    pub notification_id: uuid::Uuid,
    #[serde(default)]
    pub user_id: Option<String>,
}
