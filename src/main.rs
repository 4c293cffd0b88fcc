//! Loomcrawl main entry point
//!
//! Command-line interface: load a scrape model file, validate it, and
//! run it through the orchestrator.

use anyhow::Context;
use clap::Parser;
use loomcrawl::config::load_model_with_hash;
use loomcrawl::crawler::Orchestrator;
use loomcrawl::model::ScrapeModel;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Loomcrawl: a template-driven web extraction engine
///
/// Loomcrawl runs declarative scrape models: phases of seed requests
/// and record templates that extract structured data and discover
/// further requests from it.
#[derive(Parser, Debug)]
#[command(name = "loomcrawl")]
#[command(version)]
#[command(about = "A template-driven web extraction engine", long_about = None)]
struct Cli {
    /// Path to TOML model file
    #[arg(value_name = "MODEL")]
    model: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate the model and print the crawl plan without fetching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading model from: {}", cli.model.display());
    let (model, hash) = load_model_with_hash(&cli.model)
        .with_context(|| format!("failed to load model {}", cli.model.display()))?;
    tracing::info!("Model '{}' loaded (hash: {})", model.name, hash);

    if cli.dry_run {
        print_plan(&model);
        return Ok(());
    }

    let orchestrator = Orchestrator::new(model)?;
    let report = orchestrator.run().await?;

    println!("Crawl finished: {} phase runs", report.phases.len());
    for phase in &report.phases {
        println!(
            "  {}: {} documents, {} records, {} spawned, {} forwarded",
            phase.name, phase.documents, phase.records, phase.spawned, phase.forwarded
        );
    }

    Ok(())
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("loomcrawl=info,warn"),
            1 => EnvFilter::new("loomcrawl=debug,info"),
            2 => EnvFilter::new("loomcrawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Prints what a model would do, without fetching anything
fn print_plan(model: &ScrapeModel) {
    println!("=== Loomcrawl Dry Run ===\n");
    println!("Model: {}", model.name);
    println!("Domain: {}", model.domain);
    println!("Default workers: {}", model.num_workers);
    if let Some(path) = &model.database_path {
        println!("Database: {}", path);
    }

    println!("\nPhases ({}):", model.phases.len());
    for phase in &model.phases {
        let parser = phase
            .parser
            .map(|p| format!("{:?}", p).to_lowercase())
            .unwrap_or_else(|| "(inherited)".to_string());
        println!(
            "  - {} [{}{}] parser={} workers={}",
            phase.name,
            if phase.active { "active" } else { "inactive" },
            if phase.repeat > 0 {
                format!(", repeat {}", phase.repeat)
            } else {
                String::new()
            },
            parser,
            phase.n_workers.unwrap_or(model.num_workers),
        );
        for source in &phase.sources {
            match &source.from_db {
                Some(template) => println!("      seed: from stored '{}' records", template),
                None => println!("      seed: {}", source.url),
            }
        }
        for template in &phase.templates {
            let sink = template
                .sink
                .as_ref()
                .map(|s| format!("{:?}/{}", s.kind, s.collection).to_lowercase())
                .unwrap_or_else(|| "unstored".to_string());
            println!(
                "      template: {} ({} attrs) -> {}",
                template.name,
                template.attrs.len(),
                sink
            );
        }
    }

    println!("\n✓ Model is valid");
}
