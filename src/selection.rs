use glob::Pattern;
use serde::Serialize;

use crate::error::FetchError;
use crate::manifest::Manifest;

/// Include/exclude globs matched against file names.
#[derive(Debug, Clone, Default)]
pub struct GlobFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl GlobFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, FetchError> {
        Ok(Self {
            include: compile_globs(include)?,
            exclude: compile_globs(exclude)?,
        })
    }

    /// No include globs selects everything; any exclude match deselects.
    pub fn is_selected(&self, file_name: &str) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|glob| glob.matches(file_name));
        included && !self.exclude.iter().any(|glob| glob.matches(file_name))
    }

    pub fn has_include(&self) -> bool {
        !self.include.is_empty()
    }
}

fn compile_globs(globs: &[String]) -> Result<Vec<Pattern>, FetchError> {
    globs
        .iter()
        .map(|glob| {
            Pattern::new(glob).map_err(|err| FetchError::InvalidGlob(format!("{glob}: {err}")))
        })
        .collect()
}

/// Result of the latest-only refinement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LatestOnlyOutcome {
    /// Selection narrowed to `version`; `deselected` records were dropped.
    Applied { version: u32, deselected: usize },
    /// No selected record carried a version, so nothing changed.
    NoVersionDetected,
}

/// Sets `selected` on every record from the glob filter.
pub fn apply_filter(manifest: &mut Manifest, filter: &GlobFilter) {
    for record in manifest.records_mut() {
        record.selected = filter.is_selected(&record.file_name);
    }
}

/// Keeps only selected records carrying the newest detected version.
///
/// Selected records with a different version or no version at all are
/// deselected. Never selects a record.
pub fn apply_latest_only(manifest: &mut Manifest) -> LatestOnlyOutcome {
    let Some(latest) = manifest
        .selected()
        .filter_map(|record| record.detected_version)
        .max()
    else {
        return LatestOnlyOutcome::NoVersionDetected;
    };

    let mut deselected = 0;
    for record in manifest.records_mut() {
        if record.selected && record.detected_version != Some(latest) {
            record.selected = false;
            deselected += 1;
        }
    }
    LatestOnlyOutcome::Applied {
        version: latest,
        deselected,
    }
}
