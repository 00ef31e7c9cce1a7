//! Command-line interface.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde_json::{json, Map, Value};
use tokio::io::AsyncReadExt;
use tracing::info;

use jobharvest::config::{HarvestSettings, SearchSpec};
use jobharvest::scrapers::{BrowserEngineConfig, BrowserTier, HttpTier};
use jobharvest::sink::JsonLinesSink;
use jobharvest::HarvestController;

#[derive(Parser, Debug)]
#[command(name = "jobharvest")]
#[command(about = "Harvest job listings from caterer.com")]
#[command(version)]
pub struct Cli {
    /// JSON input record (`-` reads stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Search keyword
    #[arg(short, long)]
    keyword: Option<String>,

    /// Location filter
    #[arg(short, long)]
    location: Option<String>,

    /// Stop after this many records
    #[arg(long)]
    results_wanted: Option<u32>,

    /// Highest page number to fetch
    #[arg(long)]
    max_pages: Option<u32>,

    /// Recency window: any, 24h, 7d or 30d
    #[arg(long)]
    posted_within: Option<String>,

    /// Explicit first listing page
    #[arg(long)]
    start_url: Option<String>,

    /// JSON file with harvester tunables
    #[arg(long, env = "JOBHARVEST_SETTINGS")]
    settings: Option<PathBuf>,

    /// JSON Lines dataset path
    #[arg(short, long, default_value = "dataset.jsonl")]
    output: PathBuf,

    /// Run statistics path
    #[arg(long, default_value = "run-stats.json")]
    stats: PathBuf,

    /// Never escalate blocked pages to a headless browser
    #[arg(long)]
    no_browser: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

async fn read_input(path: Option<&Path>) -> anyhow::Result<Value> {
    let raw = match path {
        None => return Ok(json!({})),
        Some(p) if p == Path::new("-") => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
        Some(p) => tokio::fs::read_to_string(p)
            .await
            .with_context(|| format!("Failed to read input {}", p.display()))?,
    };
    serde_json::from_str(&raw).context("Input is not valid JSON")
}

async fn read_settings(path: Option<&Path>) -> anyhow::Result<HarvestSettings> {
    let Some(path) = path else {
        return Ok(HarvestSettings::default());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read settings {}", path.display()))?;
    serde_json::from_str(&raw).context("Settings are not valid JSON")
}

impl Cli {
    /// Fold command-line overrides into the input record.
    fn apply_overrides(&self, input: &mut Map<String, Value>) {
        if let Some(v) = &self.keyword {
            input.insert("keyword".into(), json!(v));
        }
        if let Some(v) = &self.location {
            input.insert("location".into(), json!(v));
        }
        if let Some(v) = self.results_wanted {
            input.insert("results_wanted".into(), json!(v));
        }
        if let Some(v) = self.max_pages {
            input.insert("max_pages".into(), json!(v));
        }
        if let Some(v) = &self.posted_within {
            input.insert("postedWithin".into(), json!(v));
        }
        if let Some(v) = &self.start_url {
            input.insert("startUrl".into(), json!(v));
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut input = read_input(cli.input.as_deref()).await?;
    if let Some(obj) = input.as_object_mut() {
        cli.apply_overrides(obj);
    }
    let search = SearchSpec::from_input(&input)?;
    let settings = read_settings(cli.settings.as_deref()).await?;

    let sink = JsonLinesSink::open(&cli.output, &cli.stats).await?;
    let http = HttpTier::new(&settings, &search.proxy);
    let mut controller = HarvestController::new(search.clone(), Box::new(http), sink);

    if settings.use_browser && !cli.no_browser {
        let config = BrowserEngineConfig::from_settings(&settings, &search.proxy).with_env_overrides();
        controller = controller.with_browser(Box::new(BrowserTier::new(config)));
    }

    let (stats, sink) = controller.run_until_shutdown().await?;
    info!(
        "Saved {} record(s) to {}",
        stats.records_saved,
        sink.dataset_path().display()
    );
    Ok(())
}
