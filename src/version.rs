//! Release detection for archive files.
//!
//! The archive does not put the release in a fixed field. It shows up in
//! display names, directory paths, portal labels and sometimes in object
//! keys, so detection scans the whole file object rather than one field.

use regex::Regex;
use serde_json::Value;

use crate::error::FetchError;

pub const DEFAULT_MARKER: &str = "phytozome";

/// Upper bound on harvested strings per file object.
pub const MAX_HARVESTED_STRINGS: usize = 2000;

/// Upper bound on the joined text the patterns run against, in chars.
pub const MAX_HAYSTACK_CHARS: usize = 200_000;

/// Releases are small integers; three-digit runs are read as their first two digits.
pub const MAX_VERSION_DIGITS: usize = 2;

#[derive(Debug, Clone)]
pub struct VersionDetector {
    marker: String,
    patterns: Vec<Regex>,
}

impl VersionDetector {
    pub fn new(marker: &str) -> Result<Self, FetchError> {
        let marker = marker.trim().to_lowercase();
        if marker.is_empty() {
            return Err(FetchError::InvalidSetting(
                "version marker must not be empty".to_string(),
            ));
        }
        let escaped = regex::escape(&marker);
        let digits = format!(r"([0-9]{{1,{MAX_VERSION_DIGITS}}})");
        // Tried in order; the first pattern with any match wins.
        let sources = [
            format!(r"(?i){escaped}v\s*{digits}"),
            format!(r"(?i){escaped}[\s_/-]*v\s*{digits}"),
            format!(r"(?i){escaped}\s*{digits}"),
        ];
        let patterns = sources
            .iter()
            .map(|source| {
                Regex::new(source).map_err(|err| FetchError::InvalidSetting(err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { marker, patterns })
    }

    pub fn phytozome() -> Result<Self, FetchError> {
        Self::new(DEFAULT_MARKER)
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Detects the release of one file object from the search response.
    ///
    /// Pure: the same object always yields the same answer. `None` means no
    /// marker was found, never an error.
    pub fn detect(&self, file: &Value) -> Option<u32> {
        self.extract(&self.haystack(file))
    }

    /// Joined text the version patterns run against.
    pub fn haystack(&self, file: &Value) -> String {
        let mut strings: Vec<&str> = Vec::new();
        if let Some(name) = file.get("file_name").and_then(Value::as_str) {
            if !name.is_empty() {
                strings.push(name);
            }
        }
        collect_strings(file, &mut strings, MAX_HARVESTED_STRINGS);

        let marked: Vec<&str> = strings
            .iter()
            .copied()
            .filter(|value| value.to_lowercase().contains(&self.marker))
            .collect();
        let chosen = if marked.is_empty() { strings } else { marked };

        truncate_chars(chosen.join(" "), MAX_HAYSTACK_CHARS)
    }

    pub fn extract(&self, text: &str) -> Option<u32> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .captures(text)
                .map(|captures| captures.get(1)?.as_str().parse::<u32>().ok())
        })?
    }
}

/// Depth-first harvest of string values and object keys, stopping at `cap`.
pub fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>, cap: usize) {
    if out.len() >= cap {
        return;
    }
    match value {
        Value::String(text) => out.push(text),
        Value::Object(map) => {
            for (key, child) in map {
                if out.len() >= cap {
                    break;
                }
                out.push(key);
                collect_strings(child, out, cap);
            }
        }
        Value::Array(items) => {
            for child in items {
                if out.len() >= cap {
                    break;
                }
                collect_strings(child, out, cap);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((byte_index, _)) = text.char_indices().nth(max_chars) {
        text.truncate(byte_index);
    }
    text
}
