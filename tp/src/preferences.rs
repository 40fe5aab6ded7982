//! Traveler preferences and their flat-file store
//!
//! Preferences are a small record persisted as JSON:
//!
//! ```text
//! {"preferred_airlines": [], "hotel_amenities": [], "budget_level": "mid-range"}
//! ```
//!
//! The conversation core only ever reads them, and only when a workflow is started.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Airlines offered when editing preferences
pub const AIRLINES: &[&str] = &[
    "SkyWays",
    "OceanAir",
    "MountainJet",
    "Delta",
    "United",
    "American",
    "Southwest",
];

/// Hotel amenities offered when editing preferences
pub const AMENITIES: &[&str] = &["WiFi", "Pool", "Gym", "Free Breakfast", "Restaurant", "Spa", "Parking"];

/// Errors from loading or saving preferences
#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("Preference file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Preference file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown {field} option '{value}'")]
    UnknownOption { field: &'static str, value: String },
}

/// How much the traveler wants to spend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetLevel {
    Budget,
    #[default]
    MidRange,
    Luxury,
}

impl BudgetLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetLevel::Budget => "budget",
            BudgetLevel::MidRange => "mid-range",
            BudgetLevel::Luxury => "luxury",
        }
    }
}

impl fmt::Display for BudgetLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BudgetLevel {
    type Err = PreferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "budget" => Ok(BudgetLevel::Budget),
            "mid-range" | "midrange" | "mid" => Ok(BudgetLevel::MidRange),
            "luxury" => Ok(BudgetLevel::Luxury),
            _ => Err(PreferenceError::UnknownOption {
                field: "budget level",
                value: s.to_string(),
            }),
        }
    }
}

/// The persisted preference record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub preferred_airlines: BTreeSet<String>,
    #[serde(default)]
    pub hotel_amenities: BTreeSet<String>,
    #[serde(default)]
    pub budget_level: BudgetLevel,
}

impl Preferences {
    /// Build a record, rejecting values outside the offered catalogues
    pub fn validated<A, H>(airlines: A, amenities: H, budget_level: BudgetLevel) -> Result<Self, PreferenceError>
    where
        A: IntoIterator,
        A::Item: Into<String>,
        H: IntoIterator,
        H::Item: Into<String>,
    {
        let preferred_airlines = canonicalize(airlines, AIRLINES, "airline")?;
        let hotel_amenities = canonicalize(amenities, AMENITIES, "hotel amenity")?;
        Ok(Self {
            preferred_airlines,
            hotel_amenities,
            budget_level,
        })
    }

    /// Apply an edit; fields left as `None` keep their current value
    pub fn with_updates(
        &self,
        airlines: Option<Vec<String>>,
        amenities: Option<Vec<String>>,
        budget_level: Option<BudgetLevel>,
    ) -> Result<Self, PreferenceError> {
        debug!(
            airlines = airlines.is_some(),
            amenities = amenities.is_some(),
            budget = budget_level.is_some(),
            "with_updates: called"
        );
        Self::validated(
            airlines.unwrap_or_else(|| self.preferred_airlines.iter().cloned().collect()),
            amenities.unwrap_or_else(|| self.hotel_amenities.iter().cloned().collect()),
            budget_level.unwrap_or(self.budget_level),
        )
    }
}

/// Match each value case-insensitively against a catalogue, keeping the catalogue spelling
fn canonicalize<I>(values: I, catalogue: &[&str], field: &'static str) -> Result<BTreeSet<String>, PreferenceError>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    values
        .into_iter()
        .map(|v| {
            let v: String = v.into();
            catalogue
                .iter()
                .find(|known| known.eq_ignore_ascii_case(v.trim()))
                .map(|known| known.to_string())
                .ok_or(PreferenceError::UnknownOption { field, value: v })
        })
        .collect()
}

/// Who is planning, and what they like
///
/// `user_id` is minted once per process; the preference fields come from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub preferences: Preferences,
}

impl UserContext {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            user_id: Uuid::now_v7(),
            preferences,
        }
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::new(Preferences::default())
    }
}

/// Loads and saves the preference record
pub trait PreferenceStore: Send + Sync {
    /// Current preferences, or defaults when nothing was saved yet
    fn load(&self) -> Result<Preferences, PreferenceError>;

    fn save(&self, preferences: &Preferences) -> Result<(), PreferenceError>;

    /// Forget saved preferences and return the defaults
    fn reset(&self) -> Result<Preferences, PreferenceError>;
}

/// JSON file backed preference store
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load(&self) -> Result<Preferences, PreferenceError> {
        debug!(path = %self.path.display(), "load: called");
        if !self.path.exists() {
            debug!("load: no preference file, using defaults");
            return Ok(Preferences::default());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, preferences: &Preferences) -> Result<(), PreferenceError> {
        debug!(path = %self.path.display(), "save: called");
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(preferences)?;
        fs::write(&self.path, content)?;
        info!(path = %self.path.display(), "Preferences saved");
        Ok(())
    }

    fn reset(&self) -> Result<Preferences, PreferenceError> {
        debug!(path = %self.path.display(), "reset: called");
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(Preferences::default())
    }
}
