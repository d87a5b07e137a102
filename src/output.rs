use std::io::{self, Write};

use serde::Serialize;

use crate::app::{BatchReport, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_batch(result: &BatchReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_batch(result: &BatchReport) {
        for query in &result.queries {
            println!("==> {} [{:?}]", query.name, query.status);
            if let Some(summary) = &query.summary {
                println!(
                    "  seen {}, selected {} across {} dataset(s), purged {}",
                    summary.files_seen,
                    summary.files_selected,
                    summary.datasets_selected,
                    summary.purged_selected
                );
                if !summary.selected_versions.is_empty() {
                    println!("  versions: {:?}", summary.selected_versions);
                }
                println!("  manifest: {}", summary.manifest_path);
            }
            if let Some(retrieval) = &query.retrieval {
                println!(
                    "  extracted {} file(s) into {}",
                    retrieval.extracted_files, retrieval.files_dir
                );
            }
            if let Some(error) = &query.error {
                println!("  error: {error}");
            }
        }
        println!(
            "Done: {} query(s), {} failed.",
            result.queries.len(),
            result.failed_count()
        );
    }
}
