//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

use crate::models::WeightVector;
use crate::validation::ValidationError;

/// Hexsite - rank French data-center sites over H3 hexagon metrics
///
/// Asks an LLM agent how much grid connectivity, network latency and
/// temperature matter for a location, then scores every hexagon in the
/// metric store and highlights the best candidates.
///
/// Examples:
///   hexsite --location Fresnay-sur-Sarthe
///   hexsite --location Lyon --weights 0.5,0.3,0.2 --top-k 10
///   hexsite --location Lyon --local ./fixtures --format json
///   hexsite --location Lyon --research
///   hexsite --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// French location the data center is planned for
    #[arg(short, long, value_name = "PLACE", required_unless_present = "init_config")]
    pub location: Option<String>,

    /// Ollama model used by the research agent [default: llama3.2:latest]
    #[arg(short, long, value_name = "NAME", env = "HEXSITE_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL [default: http://localhost:11434]
    #[arg(long, value_name = "URL", env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Use these weights (grid,network,temperature) instead of asking the agent
    ///
    /// Example: --weights 0.5,0.3,0.2
    #[arg(short, long, value_name = "G,N,T", value_delimiter = ',')]
    pub weights: Option<Vec<f64>>,

    /// Number of hexagons to highlight
    #[arg(short = 'k', long, value_name = "COUNT")]
    pub top_k: Option<usize>,

    /// Also ask the agent for a sourced risk briefing
    #[arg(long)]
    pub research: bool,

    /// Output file path for the report
    ///
    /// Defaults to the config file's `general.output` (hexsite_report.md)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .hexsite.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Metric store base URL
    #[arg(long, value_name = "URL", env = "SUPABASE_URL")]
    pub store_url: Option<String>,

    /// Metric store API key
    #[arg(long, value_name = "KEY", env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    pub store_key: Option<String>,

    /// Read metric tables from <DIR>/<table>.json instead of the store
    #[arg(long, value_name = "DIR")]
    pub local: Option<PathBuf>,

    /// Fetch full rows for the highlighted hexagons
    #[arg(long)]
    pub full_data: bool,

    /// Show raw hexagon ids instead of resolving place names
    #[arg(long)]
    pub no_geocode: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Temperature for LLM responses (0.0 - 1.0) [default: 0.1]
    #[arg(long, value_name = "TEMP")]
    pub temperature: Option<f32>,

    /// Model request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Ask the model for its answer in one request
    #[arg(long, conflicts_with = "no_single_call")]
    pub single_call: bool,

    /// Let the model submit its answer through validation tools
    #[arg(long, conflicts_with = "single_call")]
    pub no_single_call: bool,

    /// Dry run: fetch the metric tables and report row counts only
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .hexsite.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The requested location (empty when not set; validated first).
    pub fn location(&self) -> &str {
        self.location.as_deref().unwrap_or("")
    }

    /// Manual weights, validated like agent output.
    pub fn manual_weights(&self) -> Option<Result<WeightVector, ValidationError>> {
        self.weights.as_ref().map(|w| match w.as_slice() {
            [grid, network, temperature] => WeightVector::new(*grid, *network, *temperature),
            _ => Err(ValidationError::Schema(format!(
                "expected 3 weights, got {}",
                w.len()
            ))),
        })
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.location().trim().is_empty() {
            return Err("Location must not be empty".to_string());
        }

        // Only needed when the agent is actually asked
        if let Some(ref url) = self.ollama_url {
            if self.needs_agent() && !is_http_url(url) {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(Err(e)) = self.manual_weights() {
            return Err(format!("Invalid --weights: {}", e));
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref local_path) = self.local {
            if !local_path.is_dir() {
                return Err(format!(
                    "Local data directory does not exist: {}",
                    local_path.display()
                ));
            }
        } else if let Some(ref url) = self.store_url {
            if !is_http_url(url) {
                return Err("Store URL must start with 'http://' or 'https://'".to_string());
            }
        }

        Ok(())
    }

    /// Whether this run calls the research agent.
    pub fn needs_agent(&self) -> bool {
        (self.weights.is_none() || self.research) && !self.dry_run
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `--quiet` wins; otherwise `--verbose` or `general.verbose` turn on debug output.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
