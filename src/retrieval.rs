use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::client::ArchiveClient;
use crate::error::FetchError;
use crate::fs_util::{extract_zip, validate_zip};
use crate::manifest::SelectionMap;
use crate::store::{Store, atomic_rename_dir};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalResult {
    pub bundle_path: String,
    pub bundle_bytes: u64,
    pub bundle_kept: bool,
    pub files_dir: String,
    pub extracted_files: usize,
}

/// Downloads one bundle for a whole selection and unpacks it.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalEngine {
    keep_bundle: bool,
}

impl RetrievalEngine {
    pub fn new(keep_bundle: bool) -> Self {
        Self { keep_bundle }
    }

    pub fn retrieve<C>(
        &self,
        client: &C,
        selected: &SelectionMap,
        bundle_path: &Utf8Path,
        files_dir: &Utf8Path,
    ) -> Result<RetrievalResult, FetchError>
    where
        C: ArchiveClient + ?Sized,
    {
        if selected.is_empty() {
            return Err(FetchError::InvalidSetting(
                "download requested for an empty selection".to_string(),
            ));
        }
        let parent = files_dir
            .parent()
            .ok_or_else(|| FetchError::Filesystem("invalid files directory".to_string()))?;
        std::fs::create_dir_all(parent.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;

        info!(
            files = selected.file_count(),
            datasets = selected.dataset_count(),
            bundle = %bundle_path,
            "downloading bundle"
        );
        let download = client.download_bundle(selected, bundle_path.as_std_path())?;
        if !download.is_zip {
            warn!("bundle response was not labelled as zip; validating contents");
        }
        validate_zip(bundle_path.as_std_path())?;

        // Unpack beside the target and swap it in, so `files/` is never half written.
        let staging = tempfile::Builder::new()
            .prefix(".extract")
            .tempdir_in(parent.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        let extracted_files = extract_zip(bundle_path.as_std_path(), staging.path())?;
        atomic_rename_dir(staging.path(), files_dir.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        info!(files = extracted_files, target = %files_dir, "bundle extracted");

        if !self.keep_bundle {
            Store::remove_bundle(bundle_path)?;
        }

        Ok(RetrievalResult {
            bundle_path: bundle_path.to_string(),
            bundle_bytes: download.bytes,
            bundle_kept: self.keep_bundle,
            files_dir: files_dir.to_string(),
            extracted_files,
        })
    }
}
