use std::fs;
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::FetchError;

/// Extracts every entry of `zip_path` under `target_dir`, refusing entries
/// that would land outside it. Returns the number of files written.
pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<usize, FetchError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        FetchError::Filesystem(format!("open bundle {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| FetchError::Filesystem(err.to_string()))?;
    fs::create_dir_all(target_dir).map_err(|err| FetchError::Filesystem(err.to_string()))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(FetchError::Filesystem(format!(
                    "bundle entry escapes target directory: {}",
                    entry.name()
                )));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| FetchError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| FetchError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| FetchError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        written += 1;
    }
    Ok(written)
}

/// Reads every entry once so a truncated or corrupt bundle fails before extraction.
pub fn validate_zip(zip_path: &Path) -> Result<(), FetchError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        FetchError::Filesystem(format!("open bundle {}: {err}", zip_path.display()))
    })?;
    let mut archive = ZipArchive::new(file)
        .map_err(|err| FetchError::Filesystem(format!("bundle is not a zip archive: {err}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    }
    Ok(())
}
