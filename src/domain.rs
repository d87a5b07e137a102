use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::FetchError;

/// Storage state of a file as reported by the archive search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum FileStatus {
    Live,
    Purged,
    /// Any token the archive sends that is not a known state; the raw
    /// (upper-cased) value is kept for the manifest.
    Other(String),
}

impl FileStatus {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_uppercase();
        match normalized.as_str() {
            "LIVE" => FileStatus::Live,
            "PURGED" => FileStatus::Purged,
            _ => FileStatus::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FileStatus::Live => "LIVE",
            FileStatus::Purged => "PURGED",
            FileStatus::Other(raw) => raw,
        }
    }

    pub fn is_purged(&self) -> bool {
        matches!(self, FileStatus::Purged)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a restore status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStatus {
    Pending,
    Ready,
    Expired,
}

impl RestoreStatus {
    /// Every token other than READY and EXPIRED keeps the job pending.
    pub fn classify(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "READY" => RestoreStatus::Ready,
            "EXPIRED" => RestoreStatus::Expired,
            _ => RestoreStatus::Pending,
        }
    }
}

impl fmt::Display for RestoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreStatus::Pending => write!(f, "pending"),
            RestoreStatus::Ready => write!(f, "ready"),
            RestoreStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Human-readable query name; doubles as the output directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryName(String);

impl QueryName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueryName {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty()
            && normalized != "."
            && normalized != ".."
            && !normalized.contains(['/', '\\'])
            && !normalized.chars().any(|ch| ch.is_control());
        if !is_valid {
            return Err(FetchError::InvalidQueryName(value.to_string()));
        }
        Ok(Self(normalized))
    }
}
