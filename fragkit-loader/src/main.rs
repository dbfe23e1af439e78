//! fragkit-loader - fetch server-rendered fragments in batches
//!
//! Enqueues each `BATCH_KEY:ITEM_ID` pair, flushes once (one request per
//! batch key, one request in flight at a time) and prints the rendered
//! fragments.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use fragkit_common::config::{ConfigOverrides, ConfigResolver, LoaderConfig, LoggingConfig};
use fragkit_loader::{FragmentLoader, LoaderStats, MemoryHost};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for fragkit-loader
#[derive(Parser, Debug)]
#[command(name = "fragkit-loader")]
#[command(about = "Batched fragment loader")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "FRAGKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Endpoint prefix the comma-joined ids are appended to
    #[arg(long)]
    base_url: Option<String>,

    /// Value for the lines_of_context query parameter
    #[arg(long)]
    lines_of_context: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print fragments as a JSON array
    #[arg(long)]
    json: bool,

    /// Items to load, as BATCH_KEY:ITEM_ID
    #[arg(required = true, value_parser = parse_item)]
    items: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
struct RenderedFragment {
    item_id: String,
    batch_key: String,
    markup: Option<String>,
}

#[derive(Debug, Serialize)]
struct JsonReport {
    fragments: Vec<RenderedFragment>,
    stats: LoaderStats,
}

fn parse_item(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.rsplit_once(':') {
        Some((key, id)) if !key.is_empty() && !id.is_empty() => {
            Ok((key.to_string(), id.to_string()))
        }
        _ => Err(format!("expected BATCH_KEY:ITEM_ID, got {:?}", raw)),
    }
}

/// Resolve configuration under a scoped subscriber.
///
/// The global subscriber depends on the resolved `[logging]` section, so
/// anything the resolver logs goes to `writer` instead.
fn resolve_config<W>(
    overrides: &ConfigOverrides,
    filter: EnvFilter,
    writer: W,
) -> fragkit_common::Result<LoaderConfig>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .finish();

    tracing::subscriber::with_default(subscriber, || ConfigResolver::new().resolve(overrides))
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    match &logging.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        config_path: args.config.clone(),
        base_url: args.base_url.clone(),
        lines_of_context: args.lines_of_context.clone(),
        request_timeout_secs: args.timeout_secs,
    };
    let bootstrap_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let config = resolve_config(&overrides, bootstrap_filter, std::io::stderr)
        .context("Failed to resolve configuration")?;

    init_tracing(&config.logging)?;

    // Build identification first, before any network activity
    info!(
        "Starting fragkit-loader v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Endpoint: {}", config.base_url);

    let host = Arc::new(MemoryHost::new());
    for (_, item_id) in &args.items {
        host.add_container(item_id);
    }

    let loader = FragmentLoader::from_config(host.clone(), &config)
        .context("Failed to create fragment loader")?;

    for (batch_key, item_id) in &args.items {
        loader
            .enqueue(item_id, batch_key, None)
            .with_context(|| format!("Cannot enqueue {}:{}", batch_key, item_id))?;
    }

    let results = loader.flush().wait().await;

    let mut failures = 0;
    for result in &results {
        match result {
            Ok(outcome) => {
                for id in &outcome.missing {
                    warn!("Server returned no fragment for {}:{}", outcome.batch_key, id);
                }
            }
            Err(e) => {
                failures += 1;
                warn!("{}", e);
            }
        }
    }

    let fragments: Vec<RenderedFragment> = args
        .items
        .iter()
        .map(|(batch_key, item_id)| RenderedFragment {
            item_id: item_id.clone(),
            batch_key: batch_key.clone(),
            markup: host.markup_for(item_id),
        })
        .collect();

    let stats = loader.stats();

    if args.json {
        let report = JsonReport { fragments, stats };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for fragment in &fragments {
            if let Some(markup) = &fragment.markup {
                println!("== {}:{} ==", fragment.batch_key, fragment.item_id);
                println!("{}", markup);
            }
        }
    }

    info!(
        requests = stats.requests_issued,
        rendered = stats.items_from_network,
        failed = stats.failed_batches,
        rejected = stats.rejected_batches,
        "Done"
    );
    loader.shutdown().await;

    if failures > 0 {
        bail!("{} of {} batches failed", failures, results.len());
    }
    Ok(())
}
