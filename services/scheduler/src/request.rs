//! Interview requests.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hours::Interval;
use crate::registry::SpecialtyTag;

/// Reasons a request is rejected before the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("date range is empty: {start} is not before {end}")]
    EmptyDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("duration must be positive")]
    ZeroDuration,

    #[error("candidate email is empty")]
    MissingCandidateEmail,
}

/// A request to schedule one interview for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewRequest {
    pub candidate_name: String,
    pub candidate_email: String,
    pub candidate_timezone: Tz,
    pub interview_type: String,

    /// Specialties that earn the ranking bonus. Empty means any specialty.
    #[serde(default)]
    pub required_specialties: BTreeSet<SpecialtyTag>,

    pub duration_minutes: u32,
    pub date_range_start: DateTime<Utc>,
    pub date_range_end: DateTime<Utc>,
}

impl InterviewRequest {
    pub fn new(
        candidate_name: impl Into<String>,
        candidate_email: impl Into<String>,
        candidate_timezone: Tz,
        interview_type: impl Into<String>,
        duration_minutes: u32,
        date_range_start: DateTime<Utc>,
        date_range_end: DateTime<Utc>,
    ) -> Self {
        Self {
            candidate_name: candidate_name.into(),
            candidate_email: candidate_email.into(),
            candidate_timezone,
            interview_type: interview_type.into(),
            required_specialties: BTreeSet::new(),
            duration_minutes,
            date_range_start,
            date_range_end,
        }
    }

    pub fn with_required_specialty(mut self, tag: impl Into<SpecialtyTag>) -> Self {
        self.required_specialties.insert(tag.into());
        self
    }

    /// Fills `required_specialties` from the interview type when none were given.
    pub fn with_specialties_from(mut self, map: &SpecialtyMap) -> Self {
        if self.required_specialties.is_empty() {
            self.required_specialties = map.resolve(&self.interview_type);
        }
        self
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.date_range_start >= self.date_range_end {
            return Err(RequestError::EmptyDateRange {
                start: self.date_range_start,
                end: self.date_range_end,
            });
        }
        if self.duration_minutes == 0 {
            return Err(RequestError::ZeroDuration);
        }
        if self.candidate_email.trim().is_empty() {
            return Err(RequestError::MissingCandidateEmail);
        }
        Ok(())
    }

    pub fn duration(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.duration_minutes))
    }

    pub fn date_range(&self) -> Interval {
        Interval::new(self.date_range_start, self.date_range_end)
    }
}

/// Maps interview types to the specialties they prefer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialtyMap(BTreeMap<String, BTreeSet<SpecialtyTag>>);

impl Default for SpecialtyMap {
    fn default() -> Self {
        let entry = |kind: &str, tags: &[&str]| -> (String, BTreeSet<SpecialtyTag>) {
            (
                kind.to_string(),
                tags.iter().map(|t| SpecialtyTag::new(t)).collect(),
            )
        };

        Self(BTreeMap::from([
            entry("tech_screen", &[]),
            entry("system_design", &["platform", "cloud_architecture"]),
            entry("coding", &["data_engineering", "platform"]),
            entry("architecture", &["cloud_architecture", "platform"]),
            entry("ml_ai", &["ml_ai", "data_science"]),
            entry("data", &["data_engineering", "data_science"]),
        ]))
    }
}

impl SpecialtyMap {
    /// Preferred specialties for `interview_type`; unknown types prefer none.
    pub fn resolve(&self, interview_type: &str) -> BTreeSet<SpecialtyTag> {
        let key = SpecialtyTag::new(interview_type);
        self.0.get(key.as_str()).cloned().unwrap_or_default()
    }

    pub fn insert(&mut self, interview_type: &str, tags: impl IntoIterator<Item = SpecialtyTag>) {
        self.0.insert(
            SpecialtyTag::new(interview_type).as_str().to_string(),
            tags.into_iter().collect(),
        );
    }

    pub fn interview_types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn request() -> InterviewRequest {
        InterviewRequest::new(
            "Jane Doe",
            "jane@example.com",
            chrono_tz::America::New_York,
            "coding",
            60,
            Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 26, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_valid_request() {
        request().validate().unwrap();
        assert_eq!(request().duration(), TimeDelta::hours(1));
    }

    #[test]
    fn test_rejects_inverted_range() {
        let mut req = request();
        std::mem::swap(&mut req.date_range_start, &mut req.date_range_end);
        assert!(matches!(req.validate(), Err(RequestError::EmptyDateRange { .. })));
    }

    #[test]
    fn test_rejects_zero_duration() {
        let req = InterviewRequest {
            duration_minutes: 0,
            ..request()
        };
        assert_eq!(req.validate(), Err(RequestError::ZeroDuration));
    }

    #[rstest]
    #[case("tech_screen", &[])]
    #[case("system_design", &["cloud_architecture", "platform"])]
    #[case("coding", &["data_engineering", "platform"])]
    #[case("Data", &["data_engineering", "data_science"])]
    #[case("ml_ai", &["data_science", "ml_ai"])]
    #[case("behavioral", &[])]
    fn test_specialty_map(#[case] interview_type: &str, #[case] expected: &[&str]) {
        let resolved: Vec<String> = SpecialtyMap::default()
            .resolve(interview_type)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_explicit_specialties_win_over_map() {
        let req = request()
            .with_required_specialty("ML/AI")
            .with_specialties_from(&SpecialtyMap::default());
        assert_eq!(req.required_specialties.len(), 1);
        assert!(req.required_specialties.contains(&SpecialtyTag::new("ml_ai")));

        let derived = request().with_specialties_from(&SpecialtyMap::default());
        assert!(derived
            .required_specialties
            .contains(&SpecialtyTag::new("data_engineering")));
    }
}
