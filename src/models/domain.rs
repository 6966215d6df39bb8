use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub type SkillId = String;
pub type WorkerId = String;
pub type JobId = String;

/// Errors raised for malformed caller input
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("Invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("Unknown sort mode: {0}")]
    UnknownSortMode(String),

    #[error("Unknown delivery method: {0}")]
    UnknownDeliveryMethod(String),

    #[error("Unknown notification type: {0}")]
    UnknownNotificationType(String),

    #[error("Unknown pay type: {0}")]
    UnknownPayType(String),

    #[error("Page must be at least 1, got {0}")]
    InvalidPage(i64),

    #[error("Page size must be at least 1, got {0}")]
    InvalidPageSize(i64),
}

/// A validated latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InputError> {
        let coords = Self { latitude, longitude };
        if coords.is_valid() {
            Ok(coords)
        } else {
            Err(InputError::InvalidCoordinates { latitude, longitude })
        }
    }

    /// Build from an optional pair
    ///
    /// Both halves missing means unknown location. A lone latitude or
    /// longitude is rejected, with the missing half reported as NaN.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<Self>, InputError> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Self::new(lat, lon).map(Some),
            (None, None) => Ok(None),
            (lat, lon) => Err(InputError::InvalidCoordinates {
                latitude: lat.unwrap_or(f64::NAN),
                longitude: lon.unwrap_or(f64::NAN),
            }),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Worker-side inputs for scoring, built from a persisted profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerContext {
    pub skill_ids: HashSet<SkillId>,
    pub location: Option<Coordinates>,
    pub needs_transportation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayType {
    Hourly,
    Daily,
    Fixed,
}

impl PayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayType::Hourly => "HOURLY",
            PayType::Daily => "DAILY",
            PayType::Fixed => "FIXED",
        }
    }
}

impl FromStr for PayType {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HOURLY" => Ok(PayType::Hourly),
            "DAILY" => Ok(PayType::Daily),
            "FIXED" => Ok(PayType::Fixed),
            _ => Err(InputError::UnknownPayType(s.to_string())),
        }
    }
}

impl fmt::Display for PayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of an open job posting
///
/// `id`, `skill_ids`, `location`, `provides_transportation`, `pay_*`,
/// `start_date` and `employer_id` feed scoring and ranking; the rest is
/// carried for display and notification context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContext {
    pub id: JobId,
    pub title: String,
    pub skill_ids: HashSet<SkillId>,
    pub location: Coordinates,
    pub provides_transportation: bool,
    pub pay_amount: f64,
    pub pay_type: PayType,
    pub start_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub employer_id: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl JobContext {
    /// Formatted pay, e.g. `$25/hourly`
    pub fn pay_label(&self) -> String {
        format!("${}/{}", self.pay_amount, self.pay_type.as_str().to_lowercase())
    }
}

/// Per-factor scores for one (worker, job) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub skill_score: f64,
    pub distance_score: f64,
    pub transport_score: f64,
    pub total: u8,
}

/// A worker that cleared the match threshold for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub worker_id: WorkerId,
    pub score: u8,
}

/// A posting annotated with the viewer's compatibility score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPosting {
    #[serde(flatten)]
    pub posting: JobContext,
    pub match_score: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Match,
    Date,
    Pay,
    Distance,
}

impl FromStr for SortMode {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "match" => Ok(SortMode::Match),
            "date" => Ok(SortMode::Date),
            "pay" => Ok(SortMode::Pay),
            "distance" => Ok(SortMode::Distance),
            _ => Err(InputError::UnknownSortMode(s.to_string())),
        }
    }
}

/// Offset pagination parameters, both 1-based and positive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub size: usize,
}

impl Page {
    pub fn new(number: i64, size: i64) -> Result<Self, InputError> {
        if number < 1 {
            return Err(InputError::InvalidPage(number));
        }
        if size < 1 {
            return Err(InputError::InvalidPageSize(size));
        }
        Ok(Self {
            number: number as usize,
            size: size as usize,
        })
    }

    pub fn offset(&self) -> usize {
        (self.number - 1).saturating_mul(self.size)
    }

    /// Slice one page out of a fully ordered sequence
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset()).take(self.size).collect()
    }
}

/// Account role; only workers are matched against postings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    Worker,
    Employer,
    Both,
}

impl UserType {
    pub fn can_work(&self) -> bool {
        matches!(self, UserType::Worker | UserType::Both)
    }
}

/// Contact details a caller supplies for phone/e-mail channels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_delivery: Option<super::DeliveryMethod>,
}

/// Listing filters applied before scoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub skill_ids: HashSet<SkillId>,
    pub provides_transportation_only: bool,
}

impl ListingFilter {
    pub fn matches(&self, job: &JobContext) -> bool {
        if let Some(city) = &self.city {
            let wanted = city.to_lowercase();
            let found = job
                .city
                .as_ref()
                .map(|c| c.to_lowercase().contains(&wanted))
                .unwrap_or(false);
            if !found {
                return false;
            }
        }

        if let Some(zip) = &self.zip_code {
            if job.zip_code.as_deref() != Some(zip.as_str()) {
                return false;
            }
        }

        if !self.skill_ids.is_empty() && self.skill_ids.is_disjoint(&job.skill_ids) {
            return false;
        }

        if self.provides_transportation_only && !job.provides_transportation {
            return false;
        }

        true
    }
}
