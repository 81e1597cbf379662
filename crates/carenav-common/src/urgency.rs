use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Coarse triage signal, ordered by severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum UrgencyLevel {
    Green,
    Yellow,
    Red,
}

impl UrgencyLevel {
    pub const ALL: [UrgencyLevel; 3] = [Self::Green, Self::Yellow, Self::Red];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green => "Green",
            Self::Yellow => "Yellow",
            Self::Red => "Red",
        }
    }

    /// Short advice shown next to the level.
    pub fn label(self) -> &'static str {
        match self {
            Self::Green => "Safe to manage at home",
            Self::Yellow => "Clinic visit recommended",
            Self::Red => "Urgent medical attention needed",
        }
    }

    /// Exact, case-sensitive match against the three level names.
    pub fn from_exact(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == raw)
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve an urgency value reported by the guidance service.
///
/// Returns the matching level when `raw` is exactly `"Green"`, `"Yellow"` or `"Red"`.
/// Anything else, including `None`, resolves to [`UrgencyLevel::Green`].
pub fn parse_urgency(raw: Option<&str>) -> UrgencyLevel {
    raw.and_then(UrgencyLevel::from_exact)
        .unwrap_or(UrgencyLevel::Green)
}
