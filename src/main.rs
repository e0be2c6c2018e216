//! Hexsite - data-center site evaluation over H3 hexagon metrics
//!
//! A CLI tool that asks an Ollama model how much grid connectivity,
//! network latency and temperature matter for a French location, then
//! scores every hexagon in the metric store and highlights the best ones.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (store, model, config, I/O)
//!   2 - Validation error (weights or agent payload rejected)

mod agent;
mod analysis;
mod cli;
mod config;
mod error;
mod geocode;
mod models;
mod report;
mod store;
#[cfg(test)]
mod testing;
mod validation;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{is_http_url, Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use error::SiteError;
use indicatif::{ProgressBar, ProgressStyle};
use models::{Dimension, Report, ReportMetadata};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

use agent::{AgentConfig, ResearchAgent, Researcher};
use analysis::pipeline::{information_from_agent, weights_from_agent};
use analysis::SiteEvaluator;
use geocode::{NominatimResolver, PlaceResolver};
use store::{FileStore, MetricStore, RestStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let format = args.format;

    // Configuration first: `general.verbose` decides the log level
    let config = match load_config(&args) {
        Ok(mut config) => {
            config.merge_with_args(&args);
            config
        }
        Err(e) => exit_with(e, format),
    };

    // Initialize logging
    init_logging(&args, &config);

    info!("Hexsite v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    if let Some(ref path) = args.config {
        info!("Loaded config from {}", path.display());
    }

    match run_evaluation(args, config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Evaluation failed: {:#}", e);
            exit_with(e, format)
        }
    }
}

/// Print the error (and its JSON body when asked) and exit with its code.
fn exit_with(e: anyhow::Error, format: OutputFormat) -> ! {
    let exit_code = match e.downcast_ref::<SiteError>() {
        Some(site_error) => {
            if format == OutputFormat::Json {
                println!("{}", site_error.to_body());
            }
            site_error.exit_code()
        }
        None => 1,
    };
    eprintln!("\n❌ Error: {:#}", e);
    std::process::exit(exit_code);
}

/// Handle --init-config: generate a default .hexsite.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the model, store tables and geocoder.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete evaluation workflow.
async fn run_evaluation(args: Args, config: Config) -> Result<()> {
    let start_time = Instant::now();

    let location = args.location().trim().to_string();

    // Step 1: Pick the metric store
    let store = build_store(&args, &config)?;
    let evaluator = SiteEvaluator::new(store.as_ref(), &config.store);

    // Handle --dry-run: fetch tables and exit
    if args.dry_run {
        return handle_dry_run(&evaluator, &config).await;
    }

    // Step 2: Weights, from the command line or from the agent
    let researcher = if args.manual_weights().is_none() || args.research {
        Some(build_researcher(&config)?)
    } else {
        None
    };

    let (weights, weights_source) = match (args.manual_weights(), researcher.as_ref()) {
        (Some(manual), _) => (manual.map_err(SiteError::from)?, "manual".to_string()),
        (None, researcher) => {
            let researcher = researcher
                .ok_or_else(|| SiteError::Config("no research agent available".to_string()))?;
            let spinner = spinner(&args, format!("Asking {} for weights...", researcher.model_name()));
            let weights = weights_from_agent(researcher, &location).await;
            spinner.finish_and_clear();
            (weights?, researcher.model_name().to_string())
        }
    };
    println!("⚖️  Weights: {}", weights);

    // Step 3: Optional risk briefing
    let information = match (args.research, researcher.as_ref()) {
        (true, Some(researcher)) => {
            let spinner = spinner(&args, format!("Researching risks around {}...", location));
            let information = information_from_agent(researcher, &location).await;
            spinner.finish_and_clear();
            Some(information?)
        }
        _ => None,
    };

    // Step 4: Score and select
    println!("🔬 Scoring hexagons...");
    let evaluation = evaluator
        .evaluate(&weights, config.general.top_k, args.full_data)
        .await?;

    // Step 5: Summary with place names
    let resolver = if config.geocoder.enabled {
        Some(NominatimResolver::new(&config.geocoder).context("Failed to create geocoder")?)
    } else {
        None
    };
    let summary = report::present(
        &evaluation.top,
        resolver.as_ref().map(|r| r as &dyn PlaceResolver),
    )
    .await;

    // Step 6: Build and save the report
    let metadata = ReportMetadata {
        location: location.clone(),
        evaluation_date: Utc::now(),
        weights_source,
        hexagons_scored: evaluation.scored,
        table_counts: evaluation.table_counts.clone(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    let ranking = evaluation.ranking();
    let body = evaluation.into_response(summary.text, &summary.places, weights, information);
    let report = Report {
        metadata,
        ranking,
        body,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output_path = Path::new(&config.general.output);
    std::fs::write(output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    // Print summary
    if !args.quiet {
        println!("\n{}", report.body.response);
    }
    println!(
        "\n✅ Evaluation complete in {:.1}s! Report saved to: {}",
        report.metadata.duration_seconds,
        output_path.display()
    );

    Ok(())
}

/// Handle --dry-run: fetch the tables, print their sizes, exit.
async fn handle_dry_run(evaluator: &SiteEvaluator<'_>, config: &Config) -> Result<()> {
    println!("\n🔍 Dry run: fetching metric tables (no model call)...\n");

    let (tables, counts) = evaluator.fetch_tables().await?;

    for dimension in Dimension::ALL {
        let table = &config.store.table(dimension).name;
        let with_id = tables
            .get(dimension)
            .iter()
            .filter(|r| r.hexagon_id.is_some())
            .count();
        println!(
            "   📄 {} ({}): {} rows, {} with a hexagon id",
            table,
            dimension,
            counts.get(table).map(String::as_str).unwrap_or("?"),
            with_id
        );
    }

    println!("\n✅ Dry run complete. No model calls were made.");
    Ok(())
}

/// Local directory store or REST store.
fn build_store(args: &Args, config: &Config) -> Result<Box<dyn MetricStore>> {
    if let Some(ref local) = args.local {
        info!("Using local metric tables in {}", local.display());
        return Ok(Box::new(FileStore::new(
            local.clone(),
            config.store.id_field.clone(),
        )));
    }

    let store = RestStore::new(&config.store).map_err(SiteError::from)?;
    Ok(Box::new(store))
}

fn build_researcher(config: &Config) -> Result<ResearchAgent> {
    let mode = if config.model.single_call_mode {
        "single-call"
    } else {
        "tool-calling"
    };

    println!("🤖 Initializing research agent...");
    println!("   Model: {}", config.model.name);
    println!("   Ollama: {}", config.model.ollama_url);
    println!("   Mode: {}", mode);
    println!("   Timeout: {}s", config.model.timeout_seconds);

    if !is_http_url(&config.model.ollama_url) {
        return Err(SiteError::Config(format!(
            "Ollama URL must start with 'http://' or 'https://' (got {})",
            config.model.ollama_url
        ))
        .into());
    }

    ResearchAgent::new(AgentConfig::from(&config.model))
        .map_err(|e| SiteError::Agent(e).into())
}

fn spinner(args: &Args, message: String) -> ProgressBar {
    if args.quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems go straight to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path).map_err(|e| SiteError::Config(format!("{:#}", e)).into());
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}. Using defaults.", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}
