use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::FileStatus;
use crate::error::FetchError;
use crate::manifest::{FileRecord, Manifest};
use crate::version::VersionDetector;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organisms: Option<Vec<Organism>>,
}

#[derive(Debug, Deserialize)]
struct Organism {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    files: Option<Vec<Value>>,
}

/// Flattens a search response into manifest records, unselected.
///
/// Organisms without an id and files without an id or name are skipped.
/// Each kept record gets its version detected from the whole file object.
pub fn parse_search(response: &Value, detector: &VersionDetector) -> Result<Manifest, FetchError> {
    let parsed = SearchResponse::deserialize(response)
        .map_err(|err| FetchError::Protocol(format!("unexpected search response shape: {err}")))?;

    let mut records = Vec::new();
    for organism in parsed.organisms.unwrap_or_default() {
        let Some(dataset_id) = organism.id.as_ref().and_then(scalar_string) else {
            debug!("skipping organism without id");
            continue;
        };
        for file in organism.files.unwrap_or_default() {
            let file_id = file.get("_id").and_then(scalar_string).unwrap_or_default();
            let file_name = file
                .get("file_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if file_id.is_empty() || file_name.is_empty() {
                debug!(dataset_id = %dataset_id, "skipping file without id or name");
                continue;
            }
            let status = FileStatus::parse(
                file.get("file_status")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            );
            records.push(FileRecord {
                dataset_id: dataset_id.clone(),
                file_id,
                file_name: file_name.to_string(),
                status,
                detected_version: detector.detect(&file),
                selected: false,
            });
        }
    }
    Ok(Manifest::new(records))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
