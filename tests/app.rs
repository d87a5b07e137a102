use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::{Value, json};
use zip::write::SimpleFileOptions;

use jgi_bulk_fetch::app::{App, ProgressEvent, ProgressSink, QueryStatus};
use jgi_bulk_fetch::client::{ArchiveClient, DownloadInfo};
use jgi_bulk_fetch::config::{Query, RunSettings};
use jgi_bulk_fetch::error::FetchError;
use jgi_bulk_fetch::manifest::SelectionMap;
use jgi_bulk_fetch::restore::{Clock, RestoreOutcome};
use jgi_bulk_fetch::selection::LatestOnlyOutcome;
use jgi_bulk_fetch::store::Store;

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
struct NoopClock;

impl Clock for NoopClock {
    fn sleep(&self, _duration: Duration) {}
}

#[derive(Default)]
struct MockArchive {
    searches: HashMap<String, Value>,
    statuses: Mutex<VecDeque<&'static str>>,
    restore_requests: Mutex<Vec<SelectionMap>>,
    download_requests: Mutex<Vec<SelectionMap>>,
}

impl MockArchive {
    fn with_search(mut self, url: &str, response: Value) -> Self {
        self.searches.insert(url.to_string(), response);
        self
    }

    fn with_statuses(self, statuses: &[&'static str]) -> Self {
        *self.statuses.lock().unwrap() = statuses.iter().copied().collect();
        self
    }
}

impl ArchiveClient for MockArchive {
    fn fetch_search(&self, url: &str) -> Result<Value, FetchError> {
        self.searches
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Http(format!("connection refused: {url}")))
    }

    fn request_restore(&self, purged: &SelectionMap) -> Result<String, FetchError> {
        self.restore_requests.lock().unwrap().push(purged.clone());
        Ok("https://archive.test/status/1".to_string())
    }

    fn restore_status(&self, _status_url: &str) -> Result<String, FetchError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or("READY")
            .to_string())
    }

    fn download_bundle(
        &self,
        selected: &SelectionMap,
        destination: &Path,
    ) -> Result<DownloadInfo, FetchError> {
        self.download_requests.lock().unwrap().push(selected.clone());
        let file = std::fs::File::create(destination).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for group in selected.datasets() {
            for file_id in &group.file_ids {
                writer
                    .start_file(
                        format!("{}/{file_id}.dat", group.dataset_id),
                        SimpleFileOptions::default(),
                    )
                    .unwrap();
                writer.write_all(file_id.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap();
        let bytes = std::fs::metadata(destination).unwrap().len();
        Ok(DownloadInfo {
            bytes,
            is_zip: true,
        })
    }
}

fn two_release_search() -> Value {
    json!({
        "organisms": [{
            "id": "Athaliana_447",
            "files": [
                {
                    "_id": "file-v12",
                    "file_name": "x.gff3.gz",
                    "file_status": "LIVE",
                    "metadata": {"portal_display_location": ["Phytozome/PhytozomeV12/Athaliana"]}
                },
                {
                    "_id": "file-v13",
                    "file_name": "x.gff.gz",
                    "file_status": "PURGED",
                    "metadata": {"portal_display_location": ["Phytozome/PhytozomeV13/Athaliana"]}
                }
            ]
        }]
    })
}

fn query(name: &str, url: &str) -> Query {
    Query {
        name: name.parse().unwrap(),
        search_url: url.to_string(),
    }
}

fn settings() -> RunSettings {
    RunSettings {
        include: vec!["*.gff*.gz".to_string()],
        latest_only: true,
        poll_interval: Duration::from_secs(1),
        max_wait: Duration::from_secs(10),
        ..RunSettings::default()
    }
}

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("downloads")).unwrap();
    (temp, root)
}

#[test]
fn latest_release_is_restored_and_downloaded() {
    let (_temp, root) = temp_root();
    let archive = MockArchive::default()
        .with_search("https://search/1", two_release_search())
        .with_statuses(&["PENDING", "READY"]);
    let app = App::new(Store::new(root.clone()), &archive, NoopClock).unwrap();

    let report = app
        .run(
            &[query("Athaliana", "https://search/1")],
            &settings(),
            &NoopSink,
        )
        .unwrap();

    let result = &report.queries[0];
    assert_eq!(result.status, QueryStatus::Completed);
    let summary = result.summary.as_ref().unwrap();
    assert_eq!(summary.files_seen, 2);
    assert_eq!(summary.files_selected, 1);
    assert_eq!(summary.selected_versions, vec![13]);
    assert_eq!(
        summary.latest_only,
        Some(LatestOnlyOutcome::Applied {
            version: 13,
            deselected: 1
        })
    );
    assert_matches!(result.restore, Some(RestoreOutcome::Ready { polls: 2, .. }));

    let manifest = std::fs::read_to_string(root.join("Athaliana/manifest.tsv")).unwrap();
    let rows: Vec<&str> = manifest.lines().collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[1],
        "Athaliana_447\tfile-v12\tx.gff3.gz\tLIVE\t12\tFalse"
    );
    assert_eq!(
        rows[2],
        "Athaliana_447\tfile-v13\tx.gff.gz\tPURGED\t13\tTrue"
    );

    assert!(
        root.join("Athaliana/files/Athaliana_447/file-v13.dat")
            .as_std_path()
            .exists()
    );
    assert!(
        !root.join("Athaliana/files/Athaliana_447/file-v12.dat")
            .as_std_path()
            .exists()
    );
    assert!(!root.join("Athaliana/Athaliana.zip").as_std_path().exists());
    assert!(root.join("Athaliana/search.json").as_std_path().exists());

    let metadata = Store::read_metadata(&root.join("Athaliana/run.json")).unwrap();
    assert_eq!(metadata.files_restored, 1);
    assert_eq!(metadata.extracted_files, 1);
}

#[test]
fn restore_and_download_requests_carry_only_the_selection() {
    let (_temp, root) = temp_root();
    let archive = MockArchive::default().with_search("https://search/1", two_release_search());
    let store = Store::new(root.clone());
    let app = App::new(store, &archive, NoopClock).unwrap();

    app.run(
        &[query("Athaliana", "https://search/1")],
        &settings(),
        &NoopSink,
    )
    .unwrap();

    let expected = SelectionMap::from_pairs([("Athaliana_447", "file-v13")]);
    assert_eq!(*archive.restore_requests.lock().unwrap(), vec![expected.clone()]);
    assert_eq!(*archive.download_requests.lock().unwrap(), vec![expected]);
}

#[test]
fn live_selection_skips_restore() {
    let (_temp, root) = temp_root();
    let archive = MockArchive::default().with_search("https://search/1", two_release_search());
    let app = App::new(Store::new(root.clone()), &archive, NoopClock).unwrap();
    let settings = RunSettings {
        include: vec!["*.gff3.gz".to_string()],
        latest_only: false,
        keep_bundle: true,
        ..settings()
    };

    let report = app
        .run(&[query("live", "https://search/1")], &settings, &NoopSink)
        .unwrap();

    assert_eq!(report.queries[0].restore, Some(RestoreOutcome::NotNeeded));
    assert!(archive.restore_requests.lock().unwrap().is_empty());
    assert!(root.join("live/live.zip").as_std_path().exists());
}

#[test]
fn latest_only_without_versions_is_reported() {
    let (_temp, root) = temp_root();
    let search = json!({
        "organisms": [{"id": "ds", "files": [
            {"_id": "a", "file_name": "a.gff3.gz", "file_status": "LIVE"},
            {"_id": "b", "file_name": "b.gff3.gz", "file_status": "LIVE"}
        ]}]
    });
    let archive = MockArchive::default().with_search("https://search/1", search);
    let app = App::new(Store::new(root.clone()), &archive, NoopClock).unwrap();

    let report = app
        .run(&[query("plain", "https://search/1")], &settings(), &NoopSink)
        .unwrap();

    let summary = report.queries[0].summary.as_ref().unwrap();
    assert_eq!(summary.latest_only, Some(LatestOnlyOutcome::NoVersionDetected));
    assert_eq!(summary.files_selected, 2);
    assert_eq!(report.queries[0].status, QueryStatus::Completed);
}

#[test]
fn empty_selection_writes_manifest_and_skips_download() {
    let (_temp, root) = temp_root();
    let archive = MockArchive::default().with_search("https://search/1", two_release_search());
    let app = App::new(Store::new(root.clone()), &archive, NoopClock).unwrap();
    let settings = RunSettings {
        include: vec!["*.fa.gz".to_string()],
        ..settings()
    };

    let report = app
        .run(&[query("none", "https://search/1")], &settings, &NoopSink)
        .unwrap();

    assert_eq!(report.queries[0].status, QueryStatus::NothingSelected);
    assert!(root.join("none/manifest.tsv").as_std_path().exists());
    assert!(archive.download_requests.lock().unwrap().is_empty());
}

#[test]
fn failing_query_does_not_stop_the_batch() {
    let (_temp, root) = temp_root();
    let archive = MockArchive::default().with_search("https://search/ok", two_release_search());
    let app = App::new(Store::new(root.clone()), &archive, NoopClock).unwrap();

    let report = app
        .run(
            &[
                query("broken", "https://search/missing"),
                query("ok", "https://search/ok"),
            ],
            &settings(),
            &NoopSink,
        )
        .unwrap();

    assert_eq!(report.queries[0].status, QueryStatus::Failed);
    assert!(report.queries[0].error.as_ref().unwrap().contains("connection refused"));
    assert_eq!(report.queries[1].status, QueryStatus::Completed);
    assert_eq!(report.failed_count(), 1);
}

#[test]
fn fail_fast_returns_first_error() {
    let (_temp, root) = temp_root();
    let archive = MockArchive::default().with_search("https://search/ok", two_release_search());
    let app = App::new(Store::new(root.clone()), &archive, NoopClock).unwrap();
    let settings = RunSettings {
        fail_fast: true,
        ..settings()
    };

    let err = app
        .run(
            &[
                query("broken", "https://search/missing"),
                query("ok", "https://search/ok"),
            ],
            &settings,
            &NoopSink,
        )
        .unwrap_err();

    assert_matches!(err, FetchError::Http(_));
    assert!(archive.download_requests.lock().unwrap().is_empty());
}

#[test]
fn expired_restore_fails_only_that_query() {
    let (_temp, root) = temp_root();
    let archive = MockArchive::default()
        .with_search("https://search/1", two_release_search())
        .with_statuses(&["EXPIRED"]);
    let app = App::new(Store::new(root.clone()), &archive, NoopClock).unwrap();

    let report = app
        .run(&[query("exp", "https://search/1")], &settings(), &NoopSink)
        .unwrap();

    assert_eq!(report.queries[0].status, QueryStatus::Failed);
    assert!(report.queries[0].error.as_ref().unwrap().contains("expired"));
    assert!(archive.download_requests.lock().unwrap().is_empty());
    // The manifest is still written for auditing.
    assert!(root.join("exp/manifest.tsv").as_std_path().exists());
}
