//! Detection archetypes - what a signature reports when it fires.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Suspicion tiers. Declaration order is severity order: `Maximum` has the
/// lowest ordinal and sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspicionLevel {
    /// Almost certainly malicious
    Maximum,
    Strong,
    Medium,
    Weak,
    /// Informational only
    NothingBurger,
}

impl SuspicionLevel {
    pub const ALL: [SuspicionLevel; 5] = [
        SuspicionLevel::Maximum,
        SuspicionLevel::Strong,
        SuspicionLevel::Medium,
        SuspicionLevel::Weak,
        SuspicionLevel::NothingBurger,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SuspicionLevel::Maximum => "MAXIMUM",
            SuspicionLevel::Strong => "STRONG",
            SuspicionLevel::Medium => "MEDIUM",
            SuspicionLevel::Weak => "WEAK",
            SuspicionLevel::NothingBurger => "NOTHING_BURGER",
        }
    }

    /// Ordinal position; lower is more severe.
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    pub fn is_more_severe_than(&self, other: SuspicionLevel) -> bool {
        self.ordinal() < other.ordinal()
    }
}

impl fmt::Display for SuspicionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuspicionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| format!("unknown suspicion level '{}'", s))
    }
}

/// Identity, severity and description of a detectable pattern family.
///
/// Equality considers identifier and level; ordering is by identifier first so
/// that archetype-keyed maps iterate alphabetically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archetype {
    pub level: SuspicionLevel,
    pub identifier: String,
    pub description: String,
}

impl Archetype {
    pub fn new<I: Into<String>, D: Into<String>>(level: SuspicionLevel, identifier: I, description: D) -> Self {
        Self { level, identifier: identifier.into(), description: description.into() }
    }
}

impl PartialEq for Archetype {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier && self.level == other.level
    }
}

impl Eq for Archetype {}

impl PartialOrd for Archetype {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Archetype {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identifier
            .cmp(&other.identifier)
            .then_with(|| self.level.cmp(&other.level))
    }
}

impl std::hash::Hash for Archetype {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
        self.level.hash(state);
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.identifier, self.level)
    }
}
