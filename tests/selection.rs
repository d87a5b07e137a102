use serde_json::json;

use jgi_bulk_fetch::search::parse_search;
use jgi_bulk_fetch::selection::{GlobFilter, LatestOnlyOutcome, apply_filter, apply_latest_only};
use jgi_bulk_fetch::version::VersionDetector;

fn globs(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn filter_then_latest_then_projection() {
    let response = json!({
        "organisms": [
            {"id": "ds1", "files": [
                {"_id": "a", "file_name": "Sb_PhytozomeV11.gff3.gz", "file_status": "LIVE"},
                {"_id": "b", "file_name": "Sb_PhytozomeV13.gff3.gz", "file_status": "PURGED"},
                {"_id": "c", "file_name": "Sb_PhytozomeV13.softmasked.gff3.gz", "file_status": "PURGED"},
                {"_id": "b", "file_name": "Sb_PhytozomeV13.gff3.gz", "file_status": "PURGED"}
            ]},
            {"id": "ds2", "files": [
                {"_id": "d", "file_name": "Zm.gff3.gz", "file_status": "LIVE",
                 "dirs": {"Phytozome/PhytozomeV13/Zmays": {}}},
                {"_id": "e", "file_name": "Zm_unversioned.gff3.gz", "file_status": "LIVE"}
            ]}
        ]
    });
    let mut manifest = parse_search(&response, &VersionDetector::phytozome().unwrap()).unwrap();
    let filter = GlobFilter::new(&globs(&["*.gff3.gz"]), &globs(&["*masked*"])).unwrap();
    apply_filter(&mut manifest, &filter);
    assert_eq!(manifest.selected_count(), 5);

    let outcome = apply_latest_only(&mut manifest);
    assert_eq!(
        outcome,
        LatestOnlyOutcome::Applied {
            version: 13,
            deselected: 2
        }
    );

    // The manifest keeps every observed row, duplicates included.
    assert_eq!(manifest.len(), 6);

    let selection = manifest.selection();
    assert_eq!(selection.all.file_ids("ds1").unwrap(), ["b"]);
    assert_eq!(selection.all.file_ids("ds2").unwrap(), ["d"]);
    assert_eq!(selection.purged.file_ids("ds1").unwrap(), ["b"]);
    assert!(selection.purged.file_ids("ds2").is_none());
}

#[test]
fn no_version_outcome_differs_from_everything_removed() {
    let response = json!({
        "organisms": [{"id": "ds", "files": [
            {"_id": "a", "file_name": "a.gff3.gz", "file_status": "LIVE"}
        ]}]
    });
    let mut manifest = parse_search(&response, &VersionDetector::phytozome().unwrap()).unwrap();
    apply_filter(&mut manifest, &GlobFilter::default());

    assert_eq!(
        apply_latest_only(&mut manifest),
        LatestOnlyOutcome::NoVersionDetected
    );
    assert_eq!(manifest.selected_count(), 1);
}
