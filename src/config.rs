use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::QueryName;
use crate::error::FetchError;

pub const TOKEN_ENV: &str = "JGI_TOKEN";
pub const DEFAULT_OUTDIR: &str = "jgi_downloads";
pub const DEFAULT_POLL_SECONDS: u64 = 600;
pub const DEFAULT_MAX_WAIT_SECONDS: u64 = 6 * 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub name: QueryName,
    pub search_url: String,
}

#[derive(Debug, Deserialize)]
struct BatchFile {
    queries: BatchQueries,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchQueries {
    Mapping(serde_json::Map<String, Value>),
    List(Vec<BatchQueryObject>),
}

#[derive(Debug, Deserialize)]
struct BatchQueryObject {
    name: String,
    #[serde(alias = "url")]
    search_url: String,
}

pub struct QueryBatchLoader;

impl QueryBatchLoader {
    /// Loads a batch from JSON or from `name,search_url` rows (header optional).
    pub fn load(path: &Path) -> Result<Vec<Query>, FetchError> {
        let content = fs::read_to_string(path)
            .map_err(|_| FetchError::QueryBatchRead(path.to_path_buf()))?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
            || content.trim_start().starts_with('{');
        if is_json {
            Self::parse_json(&content)
        } else {
            Self::parse_rows(&content)
        }
    }

    pub fn parse_json(content: &str) -> Result<Vec<Query>, FetchError> {
        let batch: BatchFile = serde_json::from_str(content)
            .map_err(|err| FetchError::QueryBatchParse(err.to_string()))?;
        let pairs: Vec<(String, String)> = match batch.queries {
            BatchQueries::Mapping(map) => map
                .into_iter()
                .map(|(name, url)| match url {
                    Value::String(url) => Ok((name, url)),
                    other => Err(FetchError::QueryBatchParse(format!(
                        "search URL for {name} must be a string, got {other}"
                    ))),
                })
                .collect::<Result<_, _>>()?,
            BatchQueries::List(items) => items
                .into_iter()
                .map(|item| (item.name, item.search_url))
                .collect(),
        };
        build_queries(pairs)
    }

    /// Delimited rows (comma, tab, semicolon or pipe, sniffed from the first
    /// row); the first row is a header when it names `name` and `search_url`
    /// (or `url`). Quoted fields may contain the delimiter.
    pub fn parse_rows(content: &str) -> Result<Vec<Query>, FetchError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .delimiter(detect_delimiter(content))
            .from_reader(content.as_bytes());

        let mut pairs = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|err| FetchError::QueryBatchParse(err.to_string()))?;
            let (Some(name), Some(url)) = (record.get(0), record.get(1)) else {
                debug!(
                    line = record.position().map(|pos| pos.line()),
                    "skipping row without two columns"
                );
                continue;
            };
            if index == 0 && is_header(name, url) {
                continue;
            }
            pairs.push((name.to_string(), url.to_string()));
        }
        build_queries(pairs)
    }
}

fn build_queries(pairs: Vec<(String, String)>) -> Result<Vec<Query>, FetchError> {
    let queries = pairs
        .into_iter()
        .filter(|(name, url)| !name.trim().is_empty() && !url.trim().is_empty())
        .map(|(name, url)| {
            Ok(Query {
                name: name.parse()?,
                search_url: url.trim().to_string(),
            })
        })
        .collect::<Result<Vec<_>, FetchError>>()?;
    if queries.is_empty() {
        return Err(FetchError::EmptyQueryBatch);
    }
    Ok(queries)
}

const DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];

/// Picks the candidate seen most often outside quotes on the first data
/// line; comma on ties or when none appears.
fn detect_delimiter(content: &str) -> u8 {
    let first = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .unwrap_or_default();

    let mut counts = [0usize; DELIMITERS.len()];
    let mut quoted = false;
    for byte in first.bytes() {
        if byte == b'"' {
            quoted = !quoted;
        } else if !quoted && let Some(slot) = DELIMITERS.iter().position(|d| *d == byte) {
            counts[slot] += 1;
        }
    }

    let mut best = (DELIMITERS[0], 0);
    for (delimiter, count) in DELIMITERS.into_iter().zip(counts) {
        if count > best.1 {
            best = (delimiter, count);
        }
    }
    best.0
}

fn is_header(first: &str, second: &str) -> bool {
    first.eq_ignore_ascii_case("name")
        && (second.eq_ignore_ascii_case("search_url") || second.eq_ignore_ascii_case("url"))
}

/// Resolves the session token from an environment value.
pub fn resolve_token(value: Option<String>) -> Result<String, FetchError> {
    value
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(FetchError::MissingToken)
}

pub fn token_from_env() -> Result<String, FetchError> {
    resolve_token(std::env::var(TOKEN_ENV).ok())
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub latest_only: bool,
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub keep_bundle: bool,
    pub fail_fast: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            latest_only: false,
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECONDS),
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECONDS),
            keep_bundle: false,
            fail_fast: false,
        }
    }
}

impl RunSettings {
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.poll_interval.is_zero() {
            return Err(FetchError::InvalidSetting(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
