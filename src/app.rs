use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::client::ArchiveClient;
use crate::config::{Query, RunSettings};
use crate::error::FetchError;
use crate::restore::{Clock, RestoreCoordinator, RestoreOutcome};
use crate::retrieval::{RetrievalEngine, RetrievalResult};
use crate::search::parse_search;
use crate::selection::{GlobFilter, LatestOnlyOutcome, apply_filter, apply_latest_only};
use crate::store::{RunMetadata, Store};
use crate::version::VersionDetector;

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub queries: Vec<QueryResult>,
}

impl BatchReport {
    pub fn failed_count(&self) -> usize {
        self.queries
            .iter()
            .filter(|query| query.status == QueryStatus::Failed)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Completed,
    NothingSelected,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub name: String,
    pub search_url: String,
    pub status: QueryStatus,
    pub summary: Option<SelectionSummary>,
    pub restore: Option<RestoreOutcome>,
    pub retrieval: Option<RetrievalResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionSummary {
    pub files_seen: usize,
    pub files_selected: usize,
    pub datasets_selected: usize,
    pub purged_selected: usize,
    pub selected_versions: Vec<u32>,
    pub latest_only: Option<LatestOnlyOutcome>,
    pub manifest_path: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: ArchiveClient, K: Clock> {
    store: Store,
    client: C,
    clock: K,
    detector: VersionDetector,
}

impl<C: ArchiveClient, K: Clock> App<C, K> {
    pub fn new(store: Store, client: C, clock: K) -> Result<Self, FetchError> {
        Ok(Self::with_detector(
            store,
            client,
            clock,
            VersionDetector::phytozome()?,
        ))
    }

    pub fn with_detector(store: Store, client: C, clock: K, detector: VersionDetector) -> Self {
        Self {
            store,
            client,
            clock,
            detector,
        }
    }

    /// Runs every query in order.
    ///
    /// A failing query is recorded and the batch moves on, unless
    /// `fail_fast` is set, in which case the first failure is returned.
    pub fn run(
        &self,
        queries: &[Query],
        settings: &RunSettings,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, FetchError> {
        settings.validate()?;
        if queries.is_empty() {
            return Err(FetchError::EmptyQueryBatch);
        }
        let filter = GlobFilter::new(&settings.include, &settings.exclude)?;
        self.store.ensure_root()?;

        if filter.has_include() {
            info!(include = ?settings.include, "include globs");
        } else {
            info!("no include globs; every returned file is selected");
        }
        if !settings.exclude.is_empty() {
            info!(exclude = ?settings.exclude, "exclude globs");
        }

        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            info!(query = %query.name, "processing query");
            match self.process_query(query, &filter, settings, sink) {
                Ok(result) => results.push(result),
                Err(err) => {
                    if settings.fail_fast || err.is_fatal_for_run() {
                        return Err(err);
                    }
                    warn!(query = %query.name, error = %err, "query failed");
                    sink.event(ProgressEvent {
                        message: format!("phase=Failed; {}: {err}", query.name),
                        elapsed: None,
                    });
                    results.push(QueryResult {
                        name: query.name.to_string(),
                        search_url: query.search_url.clone(),
                        status: QueryStatus::Failed,
                        summary: None,
                        restore: None,
                        retrieval: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }
        Ok(BatchReport { queries: results })
    }

    fn process_query(
        &self,
        query: &Query,
        filter: &GlobFilter,
        settings: &RunSettings,
        sink: &dyn ProgressSink,
    ) -> Result<QueryResult, FetchError> {
        let name = &query.name;
        self.store.ensure_query_dir(name)?;

        sink.event(ProgressEvent {
            message: format!("phase=Search; {name}"),
            elapsed: None,
        });
        let search = self.client.fetch_search(&query.search_url)?;
        Store::write_json(&self.store.search_json_path(name), &search)?;

        let mut manifest = parse_search(&search, &self.detector)?;
        apply_filter(&mut manifest, filter);
        let latest_only = settings
            .latest_only
            .then(|| apply_latest_only(&mut manifest));
        if latest_only == Some(LatestOnlyOutcome::NoVersionDetected) {
            warn!(
                query = %name,
                "could not detect versions in selected files; latest-only had no effect"
            );
        }

        let manifest_path = self.store.manifest_path(name);
        Store::write_bytes_atomic(&manifest_path, manifest.to_tsv().as_bytes())?;

        let selection = manifest.selection();
        let summary = SelectionSummary {
            files_seen: manifest.len(),
            files_selected: manifest.selected_count(),
            datasets_selected: selection.all.dataset_count(),
            purged_selected: manifest.selected_purged_count(),
            selected_versions: manifest.selected_versions(),
            latest_only,
            manifest_path: manifest_path.to_string(),
        };
        info!(
            query = %name,
            seen = summary.files_seen,
            selected = summary.files_selected,
            datasets = summary.datasets_selected,
            purged = summary.purged_selected,
            versions = ?summary.selected_versions,
            "selection complete"
        );
        sink.event(ProgressEvent {
            message: format!(
                "phase=Select; {} of {} file(s) selected, {} purged",
                summary.files_selected, summary.files_seen, summary.purged_selected
            ),
            elapsed: None,
        });

        if selection.all.is_empty() {
            info!(query = %name, "no files selected; skipping");
            return Ok(QueryResult {
                name: name.to_string(),
                search_url: query.search_url.clone(),
                status: QueryStatus::NothingSelected,
                summary: Some(summary),
                restore: None,
                retrieval: None,
                error: None,
            });
        }

        sink.event(ProgressEvent {
            message: "phase=Restore; checking purged files".to_string(),
            elapsed: None,
        });
        let start = Instant::now();
        let restore = RestoreCoordinator::new(settings.poll_interval, settings.max_wait)
            .ensure_restored(&self.client, &self.clock, &selection.purged)?;
        sink.event(ProgressEvent {
            message: "phase=Restore; done".to_string(),
            elapsed: Some(start.elapsed()),
        });

        sink.event(ProgressEvent {
            message: "phase=Download; requesting bundle".to_string(),
            elapsed: None,
        });
        let start = Instant::now();
        let retrieval = RetrievalEngine::new(settings.keep_bundle).retrieve(
            &self.client,
            &selection.all,
            &self.store.bundle_path(name),
            &self.store.files_dir(name),
        )?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Store; extracted {} file(s) into {}",
                retrieval.extracted_files, retrieval.files_dir
            ),
            elapsed: Some(start.elapsed()),
        });

        let files_restored = match &restore {
            RestoreOutcome::NotNeeded => 0,
            RestoreOutcome::Ready { .. } => selection.purged.file_count(),
        };
        let metadata = RunMetadata {
            query: name.to_string(),
            search_url: query.search_url.clone(),
            files_seen: summary.files_seen,
            files_selected: summary.files_selected,
            files_restored,
            selected_versions: summary.selected_versions.clone(),
            extracted_files: retrieval.extracted_files,
            downloaded_at: iso_timestamp(),
            tool: format!("jgi-fetch/{}", env!("CARGO_PKG_VERSION")),
            resolved_path: retrieval.files_dir.clone(),
        };
        Store::write_json(&self.store.metadata_path(name), &metadata)?;

        Ok(QueryResult {
            name: name.to_string(),
            search_url: query.search_url.clone(),
            status: QueryStatus::Completed,
            summary: Some(summary),
            restore: Some(restore),
            retrieval: Some(retrieval),
            error: None,
        })
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
