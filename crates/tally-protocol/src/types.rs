//! Small value types shared by snapshots and messages.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// VoteValue
// ---------------------------------------------------------------------------

/// A single estimate as it appears on the wire.
///
/// Room servers are inconsistent about vote encoding: `"5"`, `5` and
/// `0.5` all show up. `VoteValue` accepts JSON strings and numbers and
/// normalizes both to their textual form, which is also the key used in
/// vote distributions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VoteValue(String);

impl VoteValue {
    /// Creates a vote value from its textual form.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the value as a finite number, if it is one.
    pub fn as_number(&self) -> Option<f64> {
        self.0
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
    }
}

impl fmt::Display for VoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VoteValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for VoteValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for VoteValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self(text),
            Raw::Number(number) => Self(number_text(&number)),
        })
    }
}

/// Largest integer an `f64` represents exactly (2^53).
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

// Integral floats (`5.0`) print without a fraction so they match the
// `"5"` scale option, the way a JavaScript client stringifies them.
fn number_text(number: &serde_json::Number) -> String {
    let integral = number
        .as_f64()
        .filter(|n| number.is_f64() && n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER);
    match integral {
        // Exact: integral and below 2^53.
        Some(n) => format!("{}", n as i64),
        None => number.to_string(),
    }
}

// ---------------------------------------------------------------------------
// ExternalService
// ---------------------------------------------------------------------------

/// Which issue tracker (if any) a room pulls tickets from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ExternalService {
    #[default]
    None,
    Jira,
    Linear,
    Github,
}

impl ExternalService {
    /// Path segment used by the integration API, or `None` when the room
    /// has no integration.
    pub fn provider(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Jira => Some("jira"),
            Self::Linear => Some("linear"),
            Self::Github => Some("github"),
        }
    }
}
