use std::fs;
use std::io;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::QueryName;
use crate::error::FetchError;

/// Output layout: one directory per query under a common root.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn query_dir(&self, name: &QueryName) -> Utf8PathBuf {
        self.root.join(name.as_str())
    }

    pub fn search_json_path(&self, name: &QueryName) -> Utf8PathBuf {
        self.query_dir(name).join("search.json")
    }

    pub fn manifest_path(&self, name: &QueryName) -> Utf8PathBuf {
        self.query_dir(name).join("manifest.tsv")
    }

    pub fn metadata_path(&self, name: &QueryName) -> Utf8PathBuf {
        self.query_dir(name).join("run.json")
    }

    pub fn bundle_path(&self, name: &QueryName) -> Utf8PathBuf {
        self.query_dir(name).join(format!("{}.zip", name.as_str()))
    }

    pub fn files_dir(&self, name: &QueryName) -> Utf8PathBuf {
        self.query_dir(name).join("files")
    }

    pub fn ensure_root(&self) -> Result<(), FetchError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))
    }

    pub fn ensure_query_dir(&self, name: &QueryName) -> Result<Utf8PathBuf, FetchError> {
        let dir = self.query_dir(name);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        Ok(dir)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), FetchError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        }
        let tmp_path = Utf8PathBuf::from(format!("{path}.tmp"));
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), FetchError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn read_metadata(path: &Utf8Path) -> Result<RunMetadata, FetchError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| FetchError::Filesystem(err.to_string()))
    }

    /// Removes the bundle if present; a missing file is not an error.
    pub fn remove_bundle(path: &Utf8Path) -> Result<(), FetchError> {
        match fs::remove_file(path.as_std_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FetchError::Filesystem(err.to_string())),
        }
    }
}

/// Written to `run.json` after a query completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub query: String,
    pub search_url: String,
    pub files_seen: usize,
    pub files_selected: usize,
    pub files_restored: usize,
    pub selected_versions: Vec<u32>,
    pub extracted_files: usize,
    pub downloaded_at: String,
    pub tool: String,
    pub resolved_path: String,
}

pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}
