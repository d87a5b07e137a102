use std::collections::HashSet;

use serde::Serialize;

use crate::domain::FileStatus;

pub const MANIFEST_COLUMNS: [&str; 6] = [
    "dataset_id",
    "file_id",
    "file_name",
    "file_status",
    "phytozome_version",
    "selected",
];

/// One candidate file seen in a search response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub dataset_id: String,
    pub file_id: String,
    pub file_name: String,
    pub status: FileStatus,
    pub detected_version: Option<u32>,
    pub selected: bool,
}

/// Every file observed for one query, in response order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    records: Vec<FileRecord>,
}

impl Manifest {
    pub fn new(records: Vec<FileRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [FileRecord] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn selected(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.iter().filter(|record| record.selected)
    }

    pub fn selected_count(&self) -> usize {
        self.selected().count()
    }

    pub fn selected_purged_count(&self) -> usize {
        self.selected()
            .filter(|record| record.status.is_purged())
            .count()
    }

    /// Distinct detected versions among selected records, ascending.
    pub fn selected_versions(&self) -> Vec<u32> {
        let mut versions: Vec<u32> = self
            .selected()
            .filter_map(|record| record.detected_version)
            .collect();
        versions.sort_unstable();
        versions.dedup();
        versions
    }

    /// Rebuilds both selection maps from the current `selected` flags.
    pub fn selection(&self) -> Selection {
        Selection {
            all: SelectionMap::from_pairs(
                self.selected()
                    .map(|record| (record.dataset_id.as_str(), record.file_id.as_str())),
            ),
            purged: SelectionMap::from_pairs(
                self.selected()
                    .filter(|record| record.status.is_purged())
                    .map(|record| (record.dataset_id.as_str(), record.file_id.as_str())),
            ),
        }
    }

    /// Tab-separated rendering with a header row.
    pub fn to_tsv(&self) -> String {
        let mut out = MANIFEST_COLUMNS.join("\t");
        out.push('\n');
        for record in &self.records {
            let version = record
                .detected_version
                .map(|version| version.to_string())
                .unwrap_or_default();
            let selected = if record.selected { "True" } else { "False" };
            let row = [
                tsv_field(&record.dataset_id),
                tsv_field(&record.file_id),
                tsv_field(&record.file_name),
                tsv_field(record.status.as_str()),
                version,
                selected.to_string(),
            ];
            out.push_str(&row.join("\t"));
            out.push('\n');
        }
        out
    }
}

fn tsv_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetFiles {
    pub dataset_id: String,
    pub file_ids: Vec<String>,
}

/// File identifiers grouped by dataset, in first-seen order on both levels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SelectionMap {
    datasets: Vec<DatasetFiles>,
}

impl SelectionMap {
    /// Groups `(dataset_id, file_id)` pairs, dropping repeated ids per dataset.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut datasets: Vec<DatasetFiles> = Vec::new();
        let mut seen: HashSet<(&'a str, &'a str)> = HashSet::new();
        for (dataset_id, file_id) in pairs {
            if !seen.insert((dataset_id, file_id)) {
                continue;
            }
            match datasets
                .iter_mut()
                .find(|group| group.dataset_id == dataset_id)
            {
                Some(group) => group.file_ids.push(file_id.to_string()),
                None => datasets.push(DatasetFiles {
                    dataset_id: dataset_id.to_string(),
                    file_ids: vec![file_id.to_string()],
                }),
            }
        }
        Self { datasets }
    }

    pub fn datasets(&self) -> &[DatasetFiles] {
        &self.datasets
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn dataset_count(&self) -> usize {
        self.datasets.len()
    }

    pub fn file_count(&self) -> usize {
        self.datasets.iter().map(|group| group.file_ids.len()).sum()
    }

    pub fn file_ids(&self, dataset_id: &str) -> Option<&[String]> {
        self.datasets
            .iter()
            .find(|group| group.dataset_id == dataset_id)
            .map(|group| group.file_ids.as_slice())
    }
}

/// The two projections of a manifest's current selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub all: SelectionMap,
    pub purged: SelectionMap,
}
