//! Test harness for the search host.
//!
//! Loads a dataset and a search file, runs the search through the tick
//! scheduler and logs progress as it arrives.
//!
//! Usage: host [items.dat] [search.toml]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use data_loader::Dataset;
use host::{HostConfig, SearchHost};
use pipeline::SearchEngine;
use predicates::SearchFile;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,host=debug,pipeline=debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let data_path = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data/items.dat"));
    let search_path = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data/search.toml"));

    let dataset = Dataset::load_from_file(&data_path)
        .with_context(|| format!("Failed to load dataset from {}", data_path.display()))?;
    let file = SearchFile::from_file(&search_path)
        .with_context(|| format!("Failed to read search file {}", search_path.display()))?;
    let registry = file.registry().context("Failed to build predicate registry")?;

    let engine = SearchEngine::new(Arc::new(dataset), registry);
    let host = SearchHost::spawn(engine, HostConfig::default());

    let mut progress = host.progress();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = *progress.borrow_and_update();
            info!(job = ?snapshot.job, state = ?snapshot.state, "Progress {:.0}%", snapshot.fraction * 100.0);
        }
    });

    let outcome = host.search(file.config).await?.wait().await?;

    info!(
        "Job {} finished in {:?} with {} results:",
        outcome.job,
        outcome.stats.elapsed,
        outcome.results.len()
    );
    for (rank, item) in outcome.results.iter().enumerate() {
        info!("{}. item {} - score {:.3}", rank + 1, item.item, item.score);
    }
    if outcome.results.is_empty() {
        info!("{} near misses", outcome.near_misses.len());
    }

    host.shutdown().await?;
    watcher.await.context("Progress watcher panicked")?;
    Ok(())
}
