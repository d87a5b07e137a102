use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Map, Value, json};

use crate::error::FetchError;
use crate::manifest::SelectionMap;

pub const RESTORE_URL: &str = "https://files.jgi.doe.gov/request_archived_files/";
pub const DOWNLOAD_URL: &str = "https://files-download.jgi.doe.gov/download_files/";
const API_VERSION: &str = "2";

#[derive(Debug, Clone, Copy)]
pub struct DownloadInfo {
    pub bytes: u64,
    pub is_zip: bool,
}

/// Remote archive operations used by one query's pipeline.
pub trait ArchiveClient: Send + Sync {
    fn fetch_search(&self, url: &str) -> Result<Value, FetchError>;

    /// Submits a restore job and returns its status-check location.
    fn request_restore(&self, purged: &SelectionMap) -> Result<String, FetchError>;

    /// Returns the raw status token reported at `status_url`.
    fn restore_status(&self, status_url: &str) -> Result<String, FetchError>;

    fn download_bundle(
        &self,
        selected: &SelectionMap,
        destination: &Path,
    ) -> Result<DownloadInfo, FetchError>;
}

impl<T: ArchiveClient + ?Sized> ArchiveClient for &T {
    fn fetch_search(&self, url: &str) -> Result<Value, FetchError> {
        (**self).fetch_search(url)
    }

    fn request_restore(&self, purged: &SelectionMap) -> Result<String, FetchError> {
        (**self).request_restore(purged)
    }

    fn restore_status(&self, status_url: &str) -> Result<String, FetchError> {
        (**self).restore_status(status_url)
    }

    fn download_bundle(
        &self,
        selected: &SelectionMap,
        destination: &Path,
    ) -> Result<DownloadInfo, FetchError> {
        (**self).download_bundle(selected, destination)
    }
}

#[derive(Clone)]
pub struct JgiHttpClient {
    client: Client,
    token: HeaderValue,
    restore_url: String,
    download_url: String,
}

impl JgiHttpClient {
    pub fn new(token: &str) -> Result<Self, FetchError> {
        Self::with_endpoints(token, RESTORE_URL, DOWNLOAD_URL)
    }

    pub fn with_endpoints(
        token: &str,
        restore_url: &str,
        download_url: &str,
    ) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("jgi-fetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetchError::InvalidSetting(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut token = HeaderValue::from_str(token.trim())
            .map_err(|_| FetchError::InvalidSetting("token is not a valid header value".to_string()))?;
        token.set_sensitive(true);

        // Bundles can be large; only bound the connect phase.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(60))
            .timeout(None)
            .build()
            .map_err(|err| FetchError::Http(err.to_string()))?;

        Ok(Self {
            client,
            token,
            restore_url: restore_url.to_string(),
            download_url: download_url.to_string(),
        })
    }

    fn post_json(&self, url: &str, payload: &Value) -> Result<Response, FetchError> {
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.token.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .map_err(|err| FetchError::Http(err.to_string()))?;
        ensure_success(response)
    }

    fn read_json(response: Response) -> Result<Value, FetchError> {
        response
            .json::<Value>()
            .map_err(|err| FetchError::Protocol(format!("response is not JSON: {err}")))
    }
}

impl ArchiveClient for JgiHttpClient {
    fn fetch_search(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| FetchError::Http(err.to_string()))?;
        Self::read_json(ensure_success(response)?)
    }

    fn request_restore(&self, purged: &SelectionMap) -> Result<String, FetchError> {
        let response = self.post_json(&self.restore_url, &restore_payload(purged))?;
        status_location(&Self::read_json(response)?)
    }

    fn restore_status(&self, status_url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(status_url)
            .header(AUTHORIZATION, self.token.clone())
            .send()
            .map_err(|err| FetchError::Http(err.to_string()))?;
        let body = Self::read_json(ensure_success(response)?)?;
        Ok(body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    fn download_bundle(
        &self,
        selected: &SelectionMap,
        destination: &Path,
    ) -> Result<DownloadInfo, FetchError> {
        let mut response = self.post_json(&self.download_url, &download_payload(selected))?;
        let is_zip = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("zip") || value.contains("octet-stream"))
            .unwrap_or(false);

        let mut file =
            File::create(destination).map_err(|err| FetchError::Filesystem(err.to_string()))?;
        let bytes = std::io::copy(&mut response, &mut file)
            .map_err(|err| FetchError::Http(format!("bundle transfer failed: {err}")))?;
        Ok(DownloadInfo { bytes, is_zip })
    }
}

fn ensure_success(response: Response) -> Result<Response, FetchError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .unwrap_or_else(|_| "archive request failed".to_string());
    Err(FetchError::HttpStatus { status, message })
}

/// Restore body: purged ids per dataset, with mail notification off.
pub fn restore_payload(purged: &SelectionMap) -> Value {
    let ids: Map<String, Value> = purged
        .datasets()
        .iter()
        .map(|group| {
            (
                group.dataset_id.clone(),
                json!({ "file_ids": group.file_ids }),
            )
        })
        .collect();
    json!({
        "ids": ids,
        "send_mail": false,
        "api_version": API_VERSION,
    })
}

/// Download body: every selected id per dataset.
pub fn download_payload(selected: &SelectionMap) -> Value {
    let ids: Map<String, Value> = selected
        .datasets()
        .iter()
        .map(|group| (group.dataset_id.clone(), json!(group.file_ids)))
        .collect();
    json!({
        "ids": ids,
        "api_version": API_VERSION,
    })
}

/// Reads the status-check location out of a restore response.
pub fn status_location(response: &Value) -> Result<String, FetchError> {
    ["request_status_url", "requestStatusUrl"]
        .iter()
        .find_map(|key| {
            response
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|url| !url.is_empty())
        })
        .map(str::to_string)
        .ok_or_else(|| {
            let keys = response
                .as_object()
                .map(|map| map.keys().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            FetchError::Protocol(format!(
                "restore response missing status URL (keys: [{keys}])"
            ))
        })
}
