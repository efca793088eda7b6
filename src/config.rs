use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::constants::{DEFAULT_LINES_PER_CHUNK, DEFAULT_WORKERS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("log_dir is required")]
    MissingLogDir,
    #[error("log directory not found: {0}")]
    LogDirNotFound(PathBuf),
    #[error("log path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("{name} must be >= 1, got {value}")]
    NotPositive { name: &'static str, value: usize },
    #[error("unknown or unsupported encoding: {0}")]
    Encoding(String),
    #[error("invalid file pattern {pattern}: {message}")]
    FilePattern { pattern: String, message: String },
    #[error("invalid match pattern {name}: {message}")]
    MatchPattern { name: String, message: String },
}

/// What to do with bytes that do not decode under the configured encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Substitute U+FFFD for each invalid sequence.
    #[default]
    Replace,
    /// Treat the file as unreadable.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_lines_per_chunk")]
    pub lines_per_chunk: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default)]
    pub decode_errors: DecodePolicy,
    #[serde(default)]
    pub monitor: bool,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
    /// Named regexes counted per line by the default analyzer.
    #[serde(default)]
    pub match_patterns: BTreeMap<String, String>,
    #[serde(default = "default_info_dir")]
    pub info_dir: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

fn default_lines_per_chunk() -> usize {
    DEFAULT_LINES_PER_CHUNK
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_monitor_interval_ms() -> u64 {
    1000
}

fn default_patterns() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_info_dir() -> PathBuf {
    PathBuf::from("info")
}

fn default_output() -> PathBuf {
    PathBuf::from("info.json")
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            run_id: String::new(),
            log_dir: None,
            lines_per_chunk: default_lines_per_chunk(),
            workers: default_workers(),
            encoding: default_encoding(),
            decode_errors: DecodePolicy::default(),
            monitor: false,
            monitor_interval_ms: default_monitor_interval_ms(),
            patterns: default_patterns(),
            match_patterns: BTreeMap::new(),
            info_dir: default_info_dir(),
            output: default_output(),
        }
    }
}

impl AnalyzerConfig {
    /// Config with every default applied, pointed at `log_dir`.
    pub fn for_dir(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: Some(log_dir.into()),
            ..Self::default()
        }
    }

    /// Checks the values that must hold before any thread is started.
    pub fn validate(&self) -> Result<&Path, ConfigError> {
        if self.workers < 1 {
            return Err(ConfigError::NotPositive {
                name: "workers",
                value: self.workers,
            });
        }
        if self.lines_per_chunk < 1 {
            return Err(ConfigError::NotPositive {
                name: "lines_per_chunk",
                value: self.lines_per_chunk,
            });
        }
        let dir = self.log_dir.as_deref().ok_or(ConfigError::MissingLogDir)?;
        if !dir.exists() {
            return Err(ConfigError::LogDirNotFound(dir.to_path_buf()));
        }
        if !dir.is_dir() {
            return Err(ConfigError::NotADirectory(dir.to_path_buf()));
        }
        Ok(dir)
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AnalyzerConfig,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let mut config: AnalyzerConfig = serde_yaml::from_slice(&bytes)?;
    if config.run_id.trim().is_empty() {
        config.run_id = generate_run_id();
    }

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}

fn generate_run_id() -> String {
    let now = chrono::Utc::now();
    format!("{}_{}", now.format("%Y%m%dT%H%M%SZ"), rand_suffix())
}

fn rand_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{:08x}", nanos)
}
