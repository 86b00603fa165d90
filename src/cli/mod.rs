//! Command-line interface for ccscout.
//!
//! Provides commands for searching openly licensed content, inspecting and
//! clearing the caches, classifying license strings and showing the resolved
//! configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use crate::adapters::{PexelsAdapter, PixabayAdapter, UnsplashAdapter, YouTubeAdapter};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    Discovery, DurableCache, LicenseClassifier, SearchRequest, SourceFanoutAggregator,
    VolatileCache,
};
use crate::domain::{SearchResponse, SourceResult};

/// ccscout - Creative Commons content discovery across rate-limited providers
#[derive(Parser, Debug)]
#[command(name = "ccscout")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search every configured source
    Search {
        /// Search query
        query: String,

        /// Page number (1-based)
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// Results per page (defaults to fanout.per_page)
        #[arg(long)]
        per_page: Option<usize>,

        /// Restrict to one source (e.g. youtube, pexels, pixabay, unsplash)
        #[arg(short, long)]
        source: Option<String>,

        /// Extra filters as key=value (e.g. image_type=vector, min_views=1000)
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,

        /// Bypass cache reads
        #[arg(long)]
        no_cache: bool,

        /// Caller identity for per-user quota accounting
        #[arg(long, env = "CCSCOUT_USER")]
        user: Option<String>,

        /// Print the full JSON response
        #[arg(long)]
        json: bool,
    },

    /// Inspect or clear the caches
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Classify a license string
    License {
        /// Raw license text as reported by a provider
        raw: String,

        /// Source the license came from
        #[arg(short, long, default_value = "")]
        source: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show entry counts and TTLs
    Stats,

    /// Remove every entry from both tiers
    Clear,

    /// Remove expired entries from both tiers
    Sweep,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty filter name in '{}'", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Search {
                query,
                page,
                per_page,
                source,
                filters,
                no_cache,
                user,
                json,
            } => {
                let cfg = config::config()?;
                let mut request = SearchRequest::new(query)
                    .with_page(page)
                    .with_per_page(per_page.unwrap_or(cfg.fanout.per_page));
                for (key, value) in filters {
                    request = request.with_filter(key, value);
                }
                if let Some(source) = source {
                    request = request.with_filter("source", source);
                }
                if let Some(user) = user {
                    request = request.with_user(user);
                }
                if no_cache {
                    request = request.skip_cache();
                }
                search(cfg, &request, json).await
            }
            Commands::Cache { command } => cache_command(command).await,
            Commands::License { raw, source } => classify_license(&raw, &source),
            Commands::Config => show_config(),
        }
    }
}

/// Build the search stack from configuration
pub fn build_discovery(cfg: &ResolvedConfig) -> Result<Discovery> {
    let volatile = Arc::new(VolatileCache::new(cfg.cache.memory_ttl()));
    let classifier = Arc::new(LicenseClassifier::new(cfg.license.clone()));
    let aggregator =
        SourceFanoutAggregator::new(classifier).with_timeout(cfg.fanout.source_timeout());

    let mut discovery = Discovery::new(volatile.clone(), aggregator)
        .with_per_source_limit(cfg.fanout.per_source_limit);

    if cfg.cache.persistent {
        let durable = DurableCache::open(&cfg.database, cfg.cache.persistent_ttl())
            .with_context(|| format!("Failed to open cache database: {}", cfg.database.display()))?;
        discovery = discovery.with_durable(Arc::new(durable));
    }

    let keys = &cfg.providers;
    if let Some(key) = &keys.youtube {
        discovery = discovery.with_adapter(Arc::new(
            YouTubeAdapter::new(key.clone(), volatile.clone())
                .with_batch_size(cfg.batch.max_batch_size),
        ));
    }
    if let Some(key) = &keys.unsplash {
        discovery = discovery.with_adapter(Arc::new(UnsplashAdapter::new(key.clone())));
    }
    if let Some(key) = &keys.pexels {
        discovery = discovery.with_adapter(Arc::new(PexelsAdapter::new(key.clone())));
    }
    if let Some(key) = &keys.pixabay {
        discovery = discovery.with_adapter(Arc::new(PixabayAdapter::new(key.clone())));
    }

    debug!(sources = ?discovery.source_names(), "Discovery ready");
    Ok(discovery)
}

async fn search(cfg: &ResolvedConfig, request: &SearchRequest, json: bool) -> Result<()> {
    let discovery = build_discovery(cfg)?;
    if discovery.source_names().is_empty() {
        anyhow::bail!(
            "No sources configured. Set at least one of YOUTUBE_API_KEY, PEXELS_API_KEY, \
             PIXABAY_API_KEY or UNSPLASH_API_KEY."
        );
    }

    let response = discovery.search(request).await;
    info!(
        total = response.total,
        cached = response.cached,
        "Search finished"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

/// Title for display; untitled items show their description instead
fn display_title(item: &SourceResult) -> &str {
    if !item.title.is_empty() {
        return &item.title;
    }
    item.description.as_deref().unwrap_or("Untitled")
}

fn print_response(response: &SearchResponse) {
    if let Some(message) = &response.message {
        eprintln!("{}", message);
    }
    if response.results.is_empty() {
        println!("No results found for: {}", response.query);
        return;
    }

    println!("{:<28} {:<16} {:<22} {:<50}", "ID", "SOURCE", "LICENSE", "TITLE");
    println!("{}", "-".repeat(118));
    for item in &response.results {
        let title: String = display_title(item).chars().take(50).collect();
        println!(
            "{:<28} {:<16} {:<22} {:<50}",
            item.id, item.source_name, item.license, title
        );
    }

    let tier = response
        .cache_type
        .map(|t| format!(" [cache: {:?}]", t).to_lowercase())
        .unwrap_or_default();
    println!(
        "\nPage {}/{} - {} result(s) from {}{}",
        response.page,
        response.total_pages,
        response.total,
        response.sources.join(", "),
        tier
    );
}

async fn cache_command(command: CacheCommands) -> Result<()> {
    let cfg = config::config()?;
    let discovery = build_discovery(cfg)?;

    match command {
        CacheCommands::Stats => {
            let stats = discovery.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        CacheCommands::Clear => {
            let report = discovery
                .clear_caches()
                .await
                .context("Failed to clear caches")?;
            println!(
                "Cleared {} memory and {} persistent entries",
                report.memory, report.persistent
            );
        }
        CacheCommands::Sweep => {
            let report = discovery.sweep().await.context("Failed to sweep caches")?;
            println!(
                "Removed {} expired memory and {} expired persistent entries",
                report.memory, report.persistent
            );
        }
    }
    Ok(())
}

fn classify_license(raw: &str, source: &str) -> Result<()> {
    let cfg = config::config()?;
    let classifier = LicenseClassifier::new(cfg.license.clone());

    let canonical = classifier.normalize(raw, source);
    println!("License:   {:?}", raw);
    println!("Source:    {:?}", source);
    println!("Usable:    {}", classifier.is_usable(raw, source));
    println!("Canonical: {}", canonical);
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Providers:   {}", {
        let configured = cfg.providers.configured();
        if configured.is_empty() {
            "(none)".to_string()
        } else {
            configured.join(", ")
        }
    });
    println!();
    print!("{}", serde_yaml::to_string(cfg)?);
    Ok(())
}
