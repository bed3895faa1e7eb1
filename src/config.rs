use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn ipfs_home() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".ipfs")
}
fn default_index_dir() -> PathBuf {
    ipfs_home().join("index")
}
fn default_preview_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_ipfs_bin")]
    pub ipfs_bin: String,
    #[serde(default = "default_blob_dir")]
    pub local_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            ipfs_bin: default_ipfs_bin(),
            local_dir: default_blob_dir(),
        }
    }
}

fn default_backend() -> String {
    "ipfs".to_string()
}
fn default_ipfs_bin() -> String {
    "ipfs".to_string()
}
fn default_blob_dir() -> PathBuf {
    ipfs_home().join("blobs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_key_dir")]
    pub key_dir: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Cleaned text is cut to this many characters before embedding.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            key_dir: default_key_dir(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_chars: default_max_chars(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000/v1".to_string()
}
fn default_model() -> String {
    "auto".to_string()
}
fn default_key_dir() -> PathBuf {
    ipfs_home().join("api_keys")
}
fn default_batch_size() -> usize {
    10
}
fn default_batch_delay_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Allow OCR, vision and transcription calls to the inference service.
    #[serde(default = "default_true")]
    pub remote: bool,
    #[serde(default = "default_pdftotext")]
    pub pdftotext_bin: String,
    #[serde(default = "default_pdfinfo")]
    pub pdfinfo_bin: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            remote: true,
            pdftotext_bin: default_pdftotext(),
            pdfinfo_bin: default_pdfinfo(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_pdftotext() -> String {
    "pdftotext".to_string()
}
fn default_pdfinfo() -> String {
    "pdfinfo".to_string()
}

/// Location used when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    ipfs_home().join("search.toml")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Loads the explicit config, or the default location if it exists, or
/// built-in defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None => {
            let path = default_config_path();
            if path.exists() {
                load_config(&path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.index.preview_chars == 0 {
            anyhow::bail!("index.preview_chars must be > 0");
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.max_chars == 0 {
            anyhow::bail!("embedding.max_chars must be > 0");
        }
        match self.store.backend.as_str() {
            "ipfs" | "local" => {}
            other => anyhow::bail!(
                "Unknown store backend: '{}'. Must be ipfs or local.",
                other
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.index.preview_chars, 200);
        assert_eq!(cfg.embedding.batch_size, 10);
        assert_eq!(cfg.embedding.model, "auto");
        assert_eq!(cfg.store.backend, "ipfs");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_backend() {
        let cfg: Config = toml::from_str("[store]\nbackend = \"s3\"\n").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_batch() {
        let cfg: Config = toml::from_str("[embedding]\nbatch_size = 0\n").unwrap();
        assert!(cfg.validate().is_err());
    }
}
