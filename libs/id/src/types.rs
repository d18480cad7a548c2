//! Identifier definitions.

use crate::{define_id, IdError};

// =============================================================================
// Generated identifiers
// =============================================================================

define_id!(AssignmentId, "asgn");
define_id!(RunId, "run");

// =============================================================================
// Interviewer identifier
// =============================================================================

/// Maximum length of an interviewer slug.
pub const MAX_INTERVIEWER_ID_LEN: usize = 64;

/// Operator-chosen interviewer identifier from the registry.
///
/// Allowed characters are ASCII alphanumerics plus `.`, `-` and `_`. Ordering
/// is plain byte-wise string ordering, which the ranker relies on as its last
/// tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterviewerId(String);

impl InterviewerId {
    /// Validates and wraps an interviewer slug.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        if s.len() > MAX_INTERVIEWER_ID_LEN {
            return Err(IdError::InvalidFormat {
                message: format!(
                    "interviewer id longer than {MAX_INTERVIEWER_ID_LEN} characters"
                ),
            });
        }

        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
        {
            return Err(IdError::InvalidFormat {
                message: format!("interviewer id '{s}' contains invalid character '{bad}'"),
            });
        }

        Ok(Self(s.to_string()))
    }

    /// Returns the slug.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InterviewerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for InterviewerId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for InterviewerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for InterviewerId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for InterviewerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
