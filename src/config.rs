//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.hexsite.toml` files. The resulting [`Config`] is built once at startup
//! and passed by reference to every collaborator.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::ScoreFields;
use crate::models::Dimension;

/// Default config file name.
pub const CONFIG_FILE: &str = ".hexsite.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Metric store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Reverse geocoding settings.
    #[serde(default)]
    pub geocoder: GeocoderConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of hexagons to highlight.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            top_k: default_top_k(),
        }
    }
}

fn default_output() -> String {
    "hexsite_report.md".to_string()
}

fn default_top_k() -> usize {
    5
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,

    /// Use single-call mode.
    /// If true: one request, JSON extracted from the reply.
    /// If false: the model submits its answer through validation tools.
    #[serde(default = "default_single_call")]
    pub single_call_mode: bool,

    /// Maximum tool-calling rounds before giving up.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_model_timeout(),
            single_call_mode: true,
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_model_timeout() -> u64 {
    600
}

fn default_single_call() -> bool {
    true
}

fn default_max_iterations() -> usize {
    8
}

/// One sourced metric table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table name in the store.
    pub name: String,
    /// Column holding the normalized score in [-1, 1].
    pub score_field: String,
}

/// Metric store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the REST endpoint (e.g. `https://abcd.supabase.co`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// API key; usually supplied through the environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_store_timeout")]
    pub timeout_seconds: u64,

    /// Rows requested per page; PostgREST caps responses at its max-rows.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Column holding the hexagon id in every table.
    #[serde(default = "default_id_field")]
    pub id_field: String,

    #[serde(default = "default_grid_table")]
    pub grid: TableConfig,

    #[serde(default = "default_network_table")]
    pub network: TableConfig,

    #[serde(default = "default_temperature_table")]
    pub temperature: TableConfig,

    /// Optional table with full per-hexagon rows for the top entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_data_table: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_seconds: default_store_timeout(),
            page_size: default_page_size(),
            id_field: default_id_field(),
            grid: default_grid_table(),
            network: default_network_table(),
            temperature: default_temperature_table(),
            full_data_table: None,
        }
    }
}

fn default_store_timeout() -> u64 {
    30
}

fn default_page_size() -> usize {
    1000
}

fn default_id_field() -> String {
    "hexagon_id".to_string()
}

fn default_grid_table() -> TableConfig {
    TableConfig {
        name: "grid_data".to_string(),
        score_field: "grid_score".to_string(),
    }
}

fn default_network_table() -> TableConfig {
    TableConfig {
        name: "network_data".to_string(),
        score_field: "network_score".to_string(),
    }
}

fn default_temperature_table() -> TableConfig {
    TableConfig {
        name: "temperature_data".to_string(),
        score_field: "temperature_score".to_string(),
    }
}

impl StoreConfig {
    /// Table settings for a dimension.
    pub fn table(&self, dimension: Dimension) -> &TableConfig {
        match dimension {
            Dimension::Grid => &self.grid,
            Dimension::Network => &self.network,
            Dimension::Temperature => &self.temperature,
        }
    }

    /// Normalized-score column names, in the shape the aggregator wants.
    pub fn score_fields(&self) -> ScoreFields {
        ScoreFields {
            grid: self.grid.score_field.clone(),
            network: self.network.score_field.clone(),
            temperature: self.temperature.score_field.clone(),
        }
    }
}

/// Reverse geocoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    /// Resolve hexagon ids to place names in the summary.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Nominatim reverse endpoint.
    #[serde(default = "default_geocoder_url")]
    pub url: String,

    /// User-Agent sent to the geocoder (required by Nominatim).
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_geocoder_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_geocoder_url(),
            user_agent: default_user_agent(),
            timeout_seconds: default_geocoder_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org/reverse".to_string()
}

fn default_user_agent() -> String {
    "GridAgent/1.0".to_string()
}

fn default_geocoder_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        // Model settings: flags and env vars win, the file fills the rest
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }

        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if args.single_call {
            self.model.single_call_mode = true;
        } else if args.no_single_call {
            self.model.single_call_mode = false;
        }

        // Store credentials usually arrive through the environment
        if let Some(ref url) = args.store_url {
            self.store.url = Some(url.clone());
        }
        if let Some(ref key) = args.store_key {
            self.store.api_key = Some(key.clone());
        }

        if let Some(top_k) = args.top_k {
            self.general.top_k = top_k;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if args.no_geocode {
            self.geocoder.enabled = false;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "llama3.2:latest");
        assert_eq!(config.general.top_k, 5);
        assert_eq!(config.store.timeout_seconds, 30);
        assert_eq!(config.store.grid.name, "grid_data");
        assert!(config.store.url.is_none());
        assert!(config.geocoder.enabled);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "custom_report.md"
top_k = 10

[model]
name = "qwen2.5:14b"
temperature = 0.2

[store]
url = "https://abcd1234.supabase.co"
id_field = "h3_index"
full_data_table = "full_data"

[store.network]
name = "latency_data"
score_field = "latency_norm"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "custom_report.md");
        assert_eq!(config.general.top_k, 10);
        assert_eq!(config.model.name, "qwen2.5:14b");
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.store.url.as_deref(), Some("https://abcd1234.supabase.co"));
        assert_eq!(config.store.id_field, "h3_index");
        assert_eq!(config.store.network.name, "latency_data");
        assert_eq!(config.store.grid.name, "grid_data");
        assert_eq!(config.store.full_data_table.as_deref(), Some("full_data"));

        let fields = config.store.score_fields();
        assert_eq!(fields.network, "latency_norm");
        assert_eq!(fields.temperature, "temperature_score");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[geocoder]\nenabled = false\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.geocoder.enabled);
        assert_eq!(config.geocoder.user_agent, "GridAgent/1.0");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Config::load(&dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[store"));
        assert!(!toml_str.contains("api_key"));
    }

    fn parse_args(extra: &[&str]) -> crate::cli::Args {
        use clap::Parser;
        let mut argv = vec!["hexsite", "--location", "Lyon"];
        argv.extend_from_slice(extra);
        crate::cli::Args::try_parse_from(argv).unwrap()
    }

    const GPU_BOX: &str = r#"
[general]
verbose = true

[model]
name = "qwen2.5:14b"
ollama_url = "http://gpu-box:11434"
temperature = 0.5
"#;

    #[test]
    fn test_merge_keeps_file_model_settings() {
        let mut config: Config = toml::from_str(GPU_BOX).unwrap();
        let mut args = parse_args(&[]);
        // Ignore HEXSITE_MODEL / OLLAMA_URL from the test environment
        args.model = None;
        args.ollama_url = None;

        config.merge_with_args(&args);

        assert_eq!(config.model.name, "qwen2.5:14b");
        assert_eq!(config.model.ollama_url, "http://gpu-box:11434");
        assert_eq!(config.model.temperature, 0.5);
        assert!(config.general.verbose);
    }

    #[test]
    fn test_merge_flags_override_file() {
        let mut config: Config = toml::from_str(GPU_BOX).unwrap();
        let args = parse_args(&[
            "--model",
            "mistral:7b",
            "--ollama-url",
            "http://localhost:11434",
            "--temperature",
            "0.2",
            "--top-k",
            "3",
        ]);

        config.merge_with_args(&args);

        assert_eq!(config.model.name, "mistral:7b");
        assert_eq!(config.model.ollama_url, "http://localhost:11434");
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.general.top_k, 3);
    }
}
