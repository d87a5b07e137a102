use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use jgi_bulk_fetch::app::App;
use jgi_bulk_fetch::client::JgiHttpClient;
use jgi_bulk_fetch::config::{
    DEFAULT_MAX_WAIT_SECONDS, DEFAULT_OUTDIR, DEFAULT_POLL_SECONDS, QueryBatchLoader, RunSettings,
    token_from_env,
};
use jgi_bulk_fetch::error::FetchError;
use jgi_bulk_fetch::output::{JsonOutput, LogSink, OutputMode, TextOutput};
use jgi_bulk_fetch::restore::SystemClock;
use jgi_bulk_fetch::store::Store;

#[derive(Parser)]
#[command(name = "jgi-fetch")]
#[command(about = "Bulk fetch JGI/Phytozome files from API search URLs")]
#[command(version, author)]
struct Cli {
    /// Query batch: CSV rows `name,search_url` (header optional) or JSON.
    queries: PathBuf,

    #[arg(long, default_value = DEFAULT_OUTDIR)]
    outdir: Utf8PathBuf,

    /// Seconds between restore-status polls.
    #[arg(long, default_value_t = DEFAULT_POLL_SECONDS)]
    poll_seconds: u64,

    /// Maximum seconds to wait for a restore.
    #[arg(long, default_value_t = DEFAULT_MAX_WAIT_SECONDS)]
    max_wait_seconds: u64,

    /// Keep downloaded zip bundles after extraction.
    #[arg(long)]
    keep_zip: bool,

    /// Glob matched against file_name (repeatable), e.g. "*.gff3.gz".
    #[arg(long)]
    include: Vec<String>,

    /// Glob that deselects matching file names (repeatable).
    #[arg(long)]
    exclude: Vec<String>,

    /// After filtering, keep only the newest detected Phytozome version.
    #[arg(long)]
    latest_only: bool,

    /// Abort the whole batch on the first failing query.
    #[arg(long)]
    fail_fast: bool,

    /// Print the batch report as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<FetchError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &FetchError) -> u8 {
    match error {
        FetchError::MissingToken
        | FetchError::InvalidSetting(_)
        | FetchError::QueryBatchRead(_)
        | FetchError::QueryBatchParse(_)
        | FetchError::EmptyQueryBatch
        | FetchError::InvalidQueryName(_)
        | FetchError::InvalidGlob(_) => 2,
        FetchError::Protocol(_)
        | FetchError::RestoreExpired { .. }
        | FetchError::RestoreTimeout { .. }
        | FetchError::Http(_)
        | FetchError::HttpStatus { .. } => 3,
        FetchError::Filesystem(_) => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let token = token_from_env()?;
    let queries = QueryBatchLoader::load(&cli.queries)?;
    tracing::info!(count = queries.len(), path = %cli.queries.display(), "loaded queries");

    let settings = RunSettings {
        include: cli.include,
        exclude: cli.exclude,
        latest_only: cli.latest_only,
        poll_interval: Duration::from_secs(cli.poll_seconds),
        max_wait: Duration::from_secs(cli.max_wait_seconds),
        keep_bundle: cli.keep_zip,
        fail_fast: cli.fail_fast,
    };

    let client = JgiHttpClient::new(&token)?;
    let app = App::new(Store::new(cli.outdir), client, SystemClock)?;

    let report = match output_mode {
        OutputMode::Json => {
            let report = app.run(&queries, &settings, &JsonOutput)?;
            JsonOutput::print_batch(&report).into_diagnostic()?;
            report
        }
        OutputMode::Text => {
            let report = app.run(&queries, &settings, &LogSink)?;
            TextOutput::print_batch(&report);
            report
        }
    };

    if report.failed_count() > 0 {
        return Ok(ExitCode::from(3));
    }
    Ok(ExitCode::SUCCESS)
}
