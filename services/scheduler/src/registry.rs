//! Interviewer registry.
//!
//! The registry is built once per process and shared read-only across runs.
//! Construction validates every entry; a registry that exists is valid.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use panelist_id::{IdError, InterviewerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Default weekly cap for entries that do not set one.
pub const DEFAULT_MAX_PER_WEEK: u32 = 5;

/// Default timezone for entries that do not set one.
pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

/// Registry construction errors. All are fatal before any run starts.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid interviewer id: {0}")]
    InvalidId(#[from] IdError),

    #[error("duplicate interviewer id: {0}")]
    DuplicateId(InterviewerId),

    #[error("interviewer {id}: invalid timezone {value:?}")]
    InvalidTimezone { id: String, value: String },

    #[error("interviewer {0}: max_per_week must be positive")]
    ZeroCapacity(InterviewerId),

    #[error("failed to read registry file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse registry file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse registry: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Specialty Tags
// =============================================================================

/// A normalized specialty tag (`"Data Engineering"` becomes `data_engineering`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SpecialtyTag(String);

impl SpecialtyTag {
    pub fn new(raw: &str) -> Self {
        let mut tag = String::with_capacity(raw.len());
        for c in raw.trim().chars() {
            let c = match c {
                ' ' | '/' | '-' => '_',
                c => c.to_ascii_lowercase(),
            };
            if c == '_' && tag.ends_with('_') {
                continue;
            }
            tag.push(c);
        }
        Self(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SpecialtyTag {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for SpecialtyTag {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<SpecialtyTag> for String {
    fn from(tag: SpecialtyTag) -> Self {
        tag.0
    }
}

impl std::fmt::Display for SpecialtyTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Interviewer
// =============================================================================

/// A member of the interviewer pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interviewer {
    pub id: InterviewerId,
    pub name: String,
    pub email: String,

    /// Opaque handle passed to the calendar collaborator.
    pub calendar_ref: String,

    pub specialties: BTreeSet<SpecialtyTag>,
    pub timezone: Tz,
    pub active: bool,
    pub max_per_week: u32,
}

impl Interviewer {
    /// An active interviewer with the default cap and no specialties.
    pub fn new(
        id: InterviewerId,
        name: impl Into<String>,
        email: impl Into<String>,
        timezone: Tz,
    ) -> Self {
        let email = email.into();
        Self {
            id,
            name: name.into(),
            calendar_ref: email.clone(),
            email,
            specialties: BTreeSet::new(),
            timezone,
            active: true,
            max_per_week: DEFAULT_MAX_PER_WEEK,
        }
    }

    pub fn with_specialty(mut self, tag: impl Into<SpecialtyTag>) -> Self {
        self.specialties.insert(tag.into());
        self
    }

    pub fn with_max_per_week(mut self, max_per_week: u32) -> Self {
        self.max_per_week = max_per_week;
        self
    }

    pub fn with_calendar_ref(mut self, calendar_ref: impl Into<String>) -> Self {
        self.calendar_ref = calendar_ref.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Returns true if any specialty is in `required`.
    pub fn matches_any(&self, required: &BTreeSet<SpecialtyTag>) -> bool {
        self.specialties.iter().any(|tag| required.contains(tag))
    }

    /// First specialty (in tag order) that is in `required`.
    pub fn matched_specialty<'a>(
        &'a self,
        required: &BTreeSet<SpecialtyTag>,
    ) -> Option<&'a SpecialtyTag> {
        self.specialties.iter().find(|tag| required.contains(*tag))
    }
}

// =============================================================================
// Registry File
// =============================================================================

/// One entry of the registry file.
#[derive(Debug, Clone, Deserialize)]
pub struct InterviewerEntry {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub email: String,

    #[serde(default, alias = "calendar_id")]
    pub calendar_ref: Option<String>,

    #[serde(default)]
    pub specialties: Vec<String>,

    /// Single-specialty form, merged into `specialties`.
    #[serde(default)]
    pub specialty: Option<String>,

    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default = "default_max_per_week", alias = "max_interviews_per_week")]
    pub max_per_week: u32,
}

fn default_active() -> bool {
    true
}

fn default_max_per_week() -> u32 {
    DEFAULT_MAX_PER_WEEK
}

impl InterviewerEntry {
    /// Validates the entry. `position` numbers entries without an id.
    fn into_interviewer(self, position: usize) -> Result<Interviewer, RegistryError> {
        let raw_id = self.id.unwrap_or_else(|| format!("sa{}", position + 1));
        let id = InterviewerId::parse(&raw_id)?;

        let tz_name = self.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = tz_name.parse().map_err(|_| RegistryError::InvalidTimezone {
            id: raw_id.clone(),
            value: tz_name.clone(),
        })?;

        let specialties = self
            .specialties
            .iter()
            .chain(self.specialty.iter())
            .map(|s| SpecialtyTag::new(s))
            .filter(|tag| !tag.as_str().is_empty())
            .collect();

        Ok(Interviewer {
            name: self.name.unwrap_or_else(|| raw_id.clone()),
            calendar_ref: self.calendar_ref.unwrap_or_else(|| self.email.clone()),
            email: self.email,
            specialties,
            timezone,
            active: self.active,
            max_per_week: self.max_per_week,
            id,
        })
    }
}

/// Registry file document.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryFile {
    #[serde(alias = "solution_architects")]
    pub interviewers: Vec<InterviewerEntry>,
}

// =============================================================================
// Registry
// =============================================================================

/// Read-only interviewer lookup keyed by id.
#[derive(Debug, Clone, Default)]
pub struct InterviewerRegistry {
    by_id: BTreeMap<InterviewerId, Interviewer>,
}

impl InterviewerRegistry {
    /// Builds a registry, rejecting duplicate ids and zero caps.
    pub fn new(interviewers: impl IntoIterator<Item = Interviewer>) -> Result<Self, RegistryError> {
        let mut by_id = BTreeMap::new();
        for interviewer in interviewers {
            if interviewer.max_per_week == 0 {
                return Err(RegistryError::ZeroCapacity(interviewer.id));
            }
            if by_id.contains_key(&interviewer.id) {
                return Err(RegistryError::DuplicateId(interviewer.id));
            }
            by_id.insert(interviewer.id.clone(), interviewer);
        }
        Ok(Self { by_id })
    }

    pub fn from_entries(entries: Vec<InterviewerEntry>) -> Result<Self, RegistryError> {
        let interviewers = entries
            .into_iter()
            .enumerate()
            .map(|(position, entry)| entry.into_interviewer(position))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(interviewers)
    }

    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_json::from_str(json)?;
        Self::from_entries(file.interviewers)
    }

    /// Loads and validates a registry file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: RegistryFile =
            serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let registry = Self::from_entries(file.interviewers)?;
        info!(
            path = %path.display(),
            interviewers = registry.len(),
            active = registry.active_count(),
            "Loaded interviewer registry"
        );
        Ok(registry)
    }

    pub fn get(&self, id: &InterviewerId) -> Option<&Interviewer> {
        self.by_id.get(id)
    }

    /// Active interviewers, ordered by id.
    pub fn active_interviewers(&self) -> Vec<&Interviewer> {
        self.by_id.values().filter(|i| i.active).collect()
    }

    /// Active interviewers carrying `tag`, ordered by id.
    pub fn by_specialty(&self, tag: &SpecialtyTag) -> Vec<&Interviewer> {
        self.by_id
            .values()
            .filter(|i| i.active && i.specialties.contains(tag))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interviewer> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.by_id.values().filter(|i| i.active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::{Los_Angeles, New_York};

    fn id(s: &str) -> InterviewerId {
        InterviewerId::parse(s).unwrap()
    }

    #[test]
    fn test_specialty_tag_normalization() {
        assert_eq!(SpecialtyTag::new("Data Engineering").as_str(), "data_engineering");
        assert_eq!(SpecialtyTag::new("ML/AI").as_str(), "ml_ai");
        assert_eq!(SpecialtyTag::new("  Cloud  Architecture ").as_str(), "cloud_architecture");
        assert_eq!(SpecialtyTag::new("platform").as_str(), "platform");
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let result = InterviewerRegistry::new([
            Interviewer::new(id("sa1"), "Alex", "alex@example.com", Los_Angeles),
            Interviewer::new(id("sa1"), "Alex Again", "alex2@example.com", New_York),
        ]);
        assert!(matches!(result, Err(RegistryError::DuplicateId(dup)) if dup.as_str() == "sa1"));
    }

    #[test]
    fn test_registry_rejects_zero_capacity() {
        let result = InterviewerRegistry::new([Interviewer::new(
            id("sa1"),
            "Alex",
            "alex@example.com",
            Los_Angeles,
        )
        .with_max_per_week(0)]);
        assert!(matches!(result, Err(RegistryError::ZeroCapacity(_))));
    }

    #[test]
    fn test_active_and_by_specialty() {
        let registry = InterviewerRegistry::new([
            Interviewer::new(id("sa2"), "Sarah", "sarah@example.com", New_York)
                .with_specialty("ML/AI"),
            Interviewer::new(id("sa1"), "Alex", "alex@example.com", Los_Angeles)
                .with_specialty("Data Engineering"),
            Interviewer::new(id("sa3"), "Marcus", "marcus@example.com", Los_Angeles)
                .with_specialty("Data Engineering")
                .inactive(),
        ])
        .unwrap();

        let active: Vec<&str> = registry
            .active_interviewers()
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(active, vec!["sa1", "sa2"]);

        let data_eng = registry.by_specialty(&SpecialtyTag::new("data_engineering"));
        assert_eq!(data_eng.len(), 1);
        assert_eq!(data_eng[0].id.as_str(), "sa1");

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.active_count(), 2);
        assert!(registry.get(&id("sa3")).is_some());
    }

    #[test]
    fn test_registry_file_defaults() {
        let registry = InterviewerRegistry::from_json(
            r#"{
                "interviewers": [
                    { "id": "sa1", "name": "Alex Chen", "email": "alex@example.com",
                      "specialty": "Data Engineering" },
                    { "id": "sa2", "name": "Sarah", "email": "sarah@example.com",
                      "calendar_id": "sarah-cal", "timezone": "America/New_York",
                      "specialties": ["ML/AI", "Data Science"],
                      "max_interviews_per_week": 3, "active": false }
                ]
            }"#,
        )
        .unwrap();

        let alex = registry.get(&id("sa1")).unwrap();
        assert!(alex.active);
        assert_eq!(alex.max_per_week, DEFAULT_MAX_PER_WEEK);
        assert_eq!(alex.timezone, Los_Angeles);
        assert_eq!(alex.calendar_ref, "alex@example.com");
        assert!(alex.specialties.contains(&SpecialtyTag::new("data_engineering")));

        let sarah = registry.get(&id("sa2")).unwrap();
        assert!(!sarah.active);
        assert_eq!(sarah.max_per_week, 3);
        assert_eq!(sarah.timezone, New_York);
        assert_eq!(sarah.calendar_ref, "sarah-cal");
        assert_eq!(sarah.specialties.len(), 2);
    }

    #[test]
    fn test_registry_file_legacy_key_and_missing_id() {
        let registry = InterviewerRegistry::from_json(
            r#"{ "solution_architects": [ { "name": "First" }, { "name": "Second" } ] }"#,
        )
        .unwrap();
        assert!(registry.get(&id("sa1")).is_some());
        assert!(registry.get(&id("sa2")).is_some());
    }

    #[test]
    fn test_registry_rejects_invalid_timezone() {
        let entries = vec![InterviewerEntry {
            id: Some("sa1".into()),
            name: None,
            email: "alex@example.com".into(),
            calendar_ref: None,
            specialties: vec![],
            specialty: None,
            timezone: Some("Mars/Olympus_Mons".into()),
            active: true,
            max_per_week: 5,
        }];
        assert!(matches!(
            InterviewerRegistry::from_entries(entries),
            Err(RegistryError::InvalidTimezone { .. })
        ));
    }

    #[test]
    fn test_registry_rejects_empty_id() {
        let result = InterviewerRegistry::from_json(r#"{ "interviewers": [ { "id": "" } ] }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let result = InterviewerRegistry::load(Path::new("/nonexistent/registry.json"));
        assert!(matches!(result, Err(RegistryError::Io { .. })));
    }
}
