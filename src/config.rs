//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` has defaults, so the smallest useful file is:
//!
//! ```toml
//! [db]
//! path = "./data/logmine.sqlite"
//! ```

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use logmine_core::cluster::ClusterOptions;
use logmine_core::community::CommunityParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_path")]
    pub path: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: default_memory_path(),
        }
    }
}

fn default_memory_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".logmine").join("patterns.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            max_line_len: default_max_line_len(),
        }
    }
}

fn default_max_line_len() -> usize {
    512
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusterConfig {
    /// Human byte size, e.g. `"2MB"`.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: String,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_min_community_size")]
    pub min_community_size: usize,
    #[serde(default = "default_cluster_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_communities")]
    pub max_communities: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            threshold: default_threshold(),
            min_community_size: default_min_community_size(),
            batch_size: default_cluster_batch_size(),
            max_communities: default_max_communities(),
        }
    }
}

fn default_buffer_size() -> String {
    "2MB".to_string()
}
fn default_threshold() -> f32 {
    0.85
}
fn default_min_community_size() -> usize {
    3
}
fn default_cluster_batch_size() -> usize {
    1024
}
fn default_max_communities() -> usize {
    3
}

impl ClusterConfig {
    /// Buffer size in bytes.
    pub fn buffer_bytes(&self) -> Result<usize> {
        parse_size(&self.buffer_size)
    }

    /// Options for the core clusterer.
    pub fn options(&self) -> Result<ClusterOptions> {
        Ok(ClusterOptions {
            buffer_size: self.buffer_bytes()?,
            community: CommunityParams {
                threshold: self.threshold,
                min_community_size: self.min_community_size,
                batch_size: self.batch_size,
            },
            max_communities: self.max_communities,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL of a remote provider; defaults to the provider's public endpoint.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_provider")]
    pub provider: String,
    #[serde(default = "default_inference_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_inference_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: default_inference_provider(),
            model: default_inference_model(),
            api_base: default_api_base(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_inference_timeout_secs(),
        }
    }
}

fn default_inference_provider() -> String {
    "openai".to_string()
}
fn default_inference_model() -> String {
    "gpt-4".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_inference_timeout_secs() -> u64 {
    60
}

impl InferenceConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Maximum records written per run; 0 means unbounded.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

fn default_max_records() -> usize {
    4096
}

/// Command-line overrides applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub max_line_len: Option<usize>,
    pub buffer_size: Option<String>,
    pub threshold: Option<f32>,
    pub min_community_size: Option<usize>,
    pub max_records: Option<usize>,
    pub api_base: Option<String>,
}

impl Config {
    /// Apply overrides and re-validate.
    pub fn with_overrides(mut self, overrides: RunOverrides) -> Result<Self> {
        if let Some(v) = overrides.max_line_len {
            self.input.max_line_len = v;
        }
        if let Some(v) = overrides.buffer_size {
            self.cluster.buffer_size = v;
        }
        if let Some(v) = overrides.threshold {
            self.cluster.threshold = v;
        }
        if let Some(v) = overrides.min_community_size {
            self.cluster.min_community_size = v;
        }
        if let Some(v) = overrides.max_records {
            self.output.max_records = v;
        }
        if let Some(v) = overrides.api_base {
            self.inference.api_base = v;
        }
        validate(&self)?;
        Ok(self)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.input.max_line_len == 0 {
        bail!("input.max_line_len must be > 0");
    }

    let buffer = config
        .cluster
        .buffer_bytes()
        .with_context(|| format!("Invalid cluster.buffer_size: '{}'", config.cluster.buffer_size))?;
    if buffer == 0 {
        bail!("cluster.buffer_size must be > 0");
    }
    if !(-1.0..=1.0).contains(&config.cluster.threshold) {
        bail!("cluster.threshold must be in [-1.0, 1.0]");
    }
    if config.cluster.min_community_size == 0 {
        bail!("cluster.min_community_size must be >= 1");
    }
    if config.cluster.batch_size == 0 {
        bail!("cluster.batch_size must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }

    match config.inference.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown inference provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

/// Parse a human byte size such as `512`, `4KB`, `2MB` or `1.5 GB`.
///
/// Units are powers of 1024 and case-insensitive.
pub fn parse_size(size: &str) -> Result<usize> {
    let re = Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*([KMGT]?B)?\s*$")?;
    let upper = size.to_uppercase();
    let caps = re
        .captures(&upper)
        .ok_or_else(|| anyhow::anyhow!("Invalid size: '{}'", size))?;

    let number: f64 = caps[1].parse()?;
    let unit: u64 = match caps.get(2).map(|m| m.as_str()).unwrap_or("B") {
        "B" => 1,
        "KB" => 1 << 10,
        "MB" => 1 << 20,
        "GB" => 1 << 30,
        "TB" => 1 << 40,
        other => bail!("Unknown size unit: '{}'", other),
    };
    Ok((number * unit as f64) as usize)
}
