use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use data_loader::{Dataset, ItemRecord};
use host::{HostConfig, SearchHost, SearchOutcome};
use pipeline::{Candidate, RankedItem, SearchEngine, SelectivityBand, SelectivityReport};
use predicates::SearchFile;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// SiftRank - two-stage constraint ranking engine
#[derive(Parser)]
#[command(name = "siftrank")]
#[command(about = "Rank items against weighted constraints with incremental evaluation", long_about = None)]
struct Cli {
    /// Path to the item dataset (.dat)
    #[arg(short, long, default_value = "data/items.dat")]
    data: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic dataset and a matching search file
    Generate {
        /// Number of items to generate
        #[arg(long, default_value = "100000")]
        items: u32,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Also write a sample search file here
        #[arg(long)]
        search: Option<PathBuf>,
    },

    /// Run a search and print the ranked items
    Search {
        /// Search file with predicate catalog and snapshot
        #[arg(long, default_value = "data/search.toml")]
        config: PathBuf,

        /// Work budget per engine step
        #[arg(long, default_value = "256")]
        iterations: usize,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,

        /// Show the score breakdown of each result
        #[arg(long)]
        explain: bool,
    },

    /// Estimate how many items satisfy the hard constraints
    Estimate {
        /// Search file with predicate catalog and snapshot
        #[arg(long, default_value = "data/search.toml")]
        config: PathBuf,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Run repeated searches through the async host and report latency
    Benchmark {
        /// Search file with predicate catalog and snapshot
        #[arg(long, default_value = "data/search.toml")]
        config: PathBuf,

        /// Number of searches to run
        #[arg(long, default_value = "50")]
        requests: usize,

        /// Start every search with an empty heavy-predicate cache
        #[arg(long)]
        cold: bool,

        /// Host tick interval in milliseconds
        #[arg(long, default_value = "1")]
        tick_ms: u64,

        /// Work budget per engine step
        #[arg(long, default_value = "256")]
        iterations: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            items,
            seed,
            search,
        } => handle_generate(&cli.data, items, seed, search.as_deref())?,
        Commands::Search {
            config,
            iterations,
            json,
            explain,
        } => handle_search(&cli.data, &config, iterations, json, explain)?,
        Commands::Estimate { config, json } => handle_estimate(&cli.data, &config, json)?,
        Commands::Benchmark {
            config,
            requests,
            cold,
            tick_ms,
            iterations,
        } => handle_benchmark(&cli.data, &config, requests, cold, tick_ms, iterations).await?,
    }

    Ok(())
}

const BIOMES: [&str; 5] = ["forest", "desert", "tundra", "swamp", "plains"];
const TAGS: [(&str, f64); 4] = [("river", 0.3), ("village", 0.15), ("cave", 0.1), ("ruins", 0.05)];

const SAMPLE_SEARCH: &str = r#"[[predicate]]
id = "temperature"
kind = "range"
column = "temp"

[[predicate]]
id = "river"
kind = "tag"
tag = "river"

[[predicate]]
id = "biome"
kind = "group"
column = "biome"

[[predicate]]
id = "cave"
kind = "tag"
tag = "cave"
heavy = true

[[predicate]]
id = "ruins"
kind = "tag"
tag = "ruins"
heavy = true

[[predicate]]
id = "village"
kind = "tag"
tag = "village"

[params]
max_results = 10

[importance]
temperature = "must_have"
river = "must_have"
cave = "priority"
ruins = "preferred"
village = "must_not_have"

[ranges.temperature]
min = 12.0
max = 24.0

[groups.biome]
operator = "any"
members = { forest = "priority", swamp = "priority", desert = "ignored" }

[[fallback]]
importance = { river = "priority" }
"#;

/// Handle the 'generate' command
fn handle_generate(data: &Path, items: u32, seed: Option<u64>, search: Option<&Path>) -> Result<()> {
    info!(items, ?seed, "Generating synthetic dataset");
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let start = Instant::now();
    let records: Vec<ItemRecord> = (0..items)
        .map(|id| {
            let mut record = ItemRecord::new(id)
                .with_number("elevation", rng.random_range(0.0..3000.0_f32))
                .with_number("light", rng.random::<f32>())
                .with_text("biome", BIOMES[rng.random_range(0..BIOMES.len())]);
            record = if rng.random_bool(0.02) {
                record.with_missing("temp")
            } else {
                record.with_number("temp", rng.random_range(-10.0..40.0_f32))
            };
            for (tag, probability) in TAGS {
                if rng.random_bool(probability) {
                    record = record.with_tag(tag);
                }
            }
            if rng.random_bool(0.01) {
                record = record.excluded();
            }
            record
        })
        .collect();

    if let Some(parent) = data.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    data_loader::parser::write_items(data, &records)
        .with_context(|| format!("Failed to write {}", data.display()))?;
    println!(
        "{} Wrote {} items to {} in {:?}",
        "✓".green(),
        items,
        data.display(),
        start.elapsed()
    );

    if let Some(search) = search {
        std::fs::write(search, SAMPLE_SEARCH)
            .with_context(|| format!("Failed to write {}", search.display()))?;
        println!("{} Wrote sample search to {}", "✓".green(), search.display());
    }
    Ok(())
}

fn load(data: &Path, config: &Path) -> Result<(Arc<Dataset>, SearchFile)> {
    // Status goes to stderr so --json output stays parseable
    eprintln!("Loading dataset from {}...", data.display());
    let start = Instant::now();
    let dataset = Dataset::load_from_file(data).context("Failed to load item dataset")?;
    eprintln!(
        "{} Loaded {} items in {:?}",
        "✓".green(),
        dataset.len(),
        start.elapsed()
    );
    if !dataset.unresolved().is_empty() {
        eprintln!(
            "{} {} attributes could not be resolved",
            "!".yellow(),
            dataset.unresolved().len()
        );
    }
    let file = SearchFile::from_file(config)
        .with_context(|| format!("Failed to read search file {}", config.display()))?;
    Ok((Arc::new(dataset), file))
}

fn build_engine(dataset: Arc<Dataset>, file: &SearchFile) -> Result<SearchEngine> {
    let registry = file.registry().context("Failed to build predicate registry")?;
    if registry.is_empty() {
        bail!("Search file declares no predicates");
    }
    Ok(SearchEngine::new(dataset, registry))
}

/// Handle the 'search' command
fn handle_search(data: &Path, config: &Path, iterations: usize, json: bool, explain: bool) -> Result<()> {
    let (dataset, file) = load(data, config)?;
    let mut engine = build_engine(dataset, &file)?;

    let job = engine.create_job(file.config).context("Failed to start search")?;
    engine.run_to_completion(iterations.max(1));
    info!(job, state = ?engine.state(), "Search finished");

    let results = engine
        .results()
        .ok_or_else(|| anyhow!("Search did not complete"))?;
    let stats = engine.stats().ok_or_else(|| anyhow!("No job statistics"))?;

    if json {
        let output = json!({
            "results": results,
            "near_misses": engine.near_misses(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_results(results, explain);
    if results.is_empty() {
        print_near_misses(engine.near_misses());
    }

    println!();
    println!("{}", "Statistics:".bold());
    println!("  Elapsed: {:?} over {} steps", stats.elapsed, stats.steps);
    println!(
        "  Candidates: {} (processed {}, pruned {})",
        stats.candidates, stats.candidates_processed, stats.pruned
    );
    println!(
        "  Excluded by heavy MustNotHave: {}, below strictness: {}",
        stats.excluded, stats.below_strictness
    );
    println!(
        "  Heavy cache: {} hits, {} misses",
        stats.cache_hits, stats.cache_misses
    );
    if stats.relaxations > 0 {
        println!("  {} Strictness relaxed", "!".yellow());
    }
    if let Some(tier) = stats.fallback_tier {
        println!("  {} Used fallback tier {}", "!".yellow(), tier);
    }
    Ok(())
}

/// Handle the 'estimate' command
fn handle_estimate(data: &Path, config: &Path, json: bool) -> Result<()> {
    let (dataset, file) = load(data, config)?;
    let mut engine = build_engine(dataset, &file)?;
    let report = engine.estimate(&file.config).context("Failed to estimate selectivity")?;
    info!(band = %report.band, estimated = report.estimated_count, "Selectivity estimated");

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_estimate(&report);
    }
    Ok(())
}

/// Handle the 'benchmark' command
async fn handle_benchmark(
    data: &Path,
    config: &Path,
    requests: usize,
    cold: bool,
    tick_ms: u64,
    iterations: usize,
) -> Result<()> {
    if requests == 0 {
        bail!("Benchmark needs at least one request");
    }
    let (dataset, file) = load(data, config)?;
    let host_config = HostConfig {
        tick: Duration::from_millis(tick_ms.max(1)),
        iterations: iterations.max(1),
        ..HostConfig::default()
    };

    let mut host = SearchHost::spawn(build_engine(dataset.clone(), &file)?, host_config);
    let mut timings = Vec::with_capacity(requests);
    let mut last: Option<SearchOutcome> = None;

    for _ in 0..requests {
        if cold {
            host.shutdown().await?;
            host = SearchHost::spawn(build_engine(dataset.clone(), &file)?, host_config);
        }
        let start = Instant::now();
        let outcome = host.search(file.config.clone()).await?.wait().await?;
        let elapsed = start.elapsed();
        debug!(job = outcome.job, ?elapsed, results = outcome.results.len(), "Benchmark search done");
        timings.push(elapsed);
        last = Some(outcome);
    }
    host.shutdown().await?;

    let total_time: Duration = timings.iter().sum();
    let avg_latency = total_time / timings.len() as u32;
    timings.sort();
    let percentile = |p: f64| timings[((timings.len() as f64 * p) as usize).min(timings.len() - 1)];
    let throughput = requests as f64 / total_time.as_secs_f64();

    println!("{}", "Benchmark results:".bold().blue());
    println!("Requests: {} ({} cache)", requests, if cold { "cold" } else { "warm" });
    println!("Total time: {:?}", total_time);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", percentile(0.5));
    println!("P95 latency: {:?}", percentile(0.95));
    println!("P99 latency: {:?}", percentile(0.99));
    println!("Throughput: {:.2} searches/second", throughput);
    if let Some(outcome) = last {
        println!(
            "Last search: {} results, {} steps",
            outcome.results.len(),
            outcome.stats.steps
        );
    }
    Ok(())
}

/// Helper function to format and print ranked items
fn print_results(results: &[RankedItem], explain: bool) {
    println!("{}", "Ranked items:".bold().blue());
    if results.is_empty() {
        println!("  {}", "No item satisfies the constraints".yellow());
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. item {} - Score: {:.3}",
            (rank + 1).to_string().green(),
            result.item,
            result.score
        );
        if explain {
            let b = &result.breakdown;
            println!(
                "   hard {:.2} | critical {:.3} x {:.2} | scoring {:.3} x {:.2} | aux {:.3} x {:.2} | penalty {:.3}",
                b.hard_fraction,
                b.critical,
                b.critical_weight,
                b.scoring,
                b.scoring_weight,
                b.auxiliary,
                b.auxiliary_weight,
                b.penalty
            );
        }
    }
}

fn print_near_misses(near_misses: &[Candidate]) {
    if near_misses.is_empty() {
        return;
    }
    println!();
    println!(
        "{} items missed exactly one MustHave constraint:",
        near_misses.len().to_string().yellow()
    );
    for candidate in near_misses.iter().take(10) {
        println!(
            "  item {} (best possible score {:.3})",
            candidate.item, candidate.upper_bound
        );
    }
}

fn print_estimate(report: &SelectivityReport) {
    let band = match report.band {
        SelectivityBand::Impossible | SelectivityBand::VeryLow => report.band.to_string().red(),
        SelectivityBand::Low => report.band.to_string().yellow(),
        _ => report.band.to_string().green(),
    };
    println!("{}", "Selectivity estimate:".bold().blue());
    println!(
        "  ~{:.0} of {} items ({:.2}%) - {}",
        report.estimated_count,
        report.total_items,
        report.joint_ratio * 100.0,
        band
    );
    for predicate in &report.predicates {
        println!(
            "  {} {} [{:?}]: {} items ({:.2}%)",
            "•".cyan(),
            predicate.id,
            predicate.importance,
            predicate.matches,
            predicate.ratio * 100.0
        );
    }
    if !report.suggestions.is_empty() {
        println!("{}", "If fewer MustHave constraints had to match:".bold());
        for suggestion in &report.suggestions {
            println!(
                "  {} of {}: ~{:.0} items ({})",
                suggestion.required, suggestion.of, suggestion.estimated_count, suggestion.band
            );
        }
    }
}
