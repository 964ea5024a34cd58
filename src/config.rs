//! TOML configuration.
//!
//! ```toml
//! [index]
//! path = "./data/index.sqlite"
//!
//! [watch]
//! root = "./watched_folder"
//!
//! [chunking]
//! chunk_size = 800
//! chunk_overlap = 80
//!
//! [embedding]
//! profile = "ollama"
//!
//! [embedding.profiles.ollama]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//! url = "http://localhost:11434"
//! ```
//!
//! Every section except `[index]` and `[watch]` has defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use docsync_core::chunk::ChunkParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    pub watch: WatchConfig,
    #[serde(default)]
    pub chunking: ChunkParams,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    pub root: PathBuf,
    /// Reserved file name, inside `root`, holding the persisted hash map.
    #[serde(default = "default_hash_file")]
    pub hash_file: String,
    #[serde(default = "default_ignore_suffixes")]
    pub ignore_suffixes: Vec<String>,
    #[serde(default = "default_ignore_prefixes")]
    pub ignore_prefixes: Vec<String>,
    /// Globs matched against paths relative to `root`.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl WatchConfig {
    /// Watch settings with defaults for everything but the root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hash_file: default_hash_file(),
            ignore_suffixes: default_ignore_suffixes(),
            ignore_prefixes: default_ignore_prefixes(),
            exclude_globs: Vec::new(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_hash_file() -> String {
    "file_hashes.csv".to_string()
}
fn default_ignore_suffixes() -> Vec<String> {
    vec![".tmp".to_string()]
}
fn default_ignore_prefixes() -> Vec<String> {
    vec!["~$".to_string()]
}
fn default_queue_capacity() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Profile used when the CLI does not name one.
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            batch_size: default_batch_size(),
            profiles: BTreeMap::new(),
        }
    }
}

fn default_profile() -> String {
    "ollama".to_string()
}
fn default_batch_size() -> usize {
    64
}

/// A named embedding setup: which provider kind, which model.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProfileConfig {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProfileConfig {
    pub fn new(provider: &str, model: Option<&str>, dims: Option<usize>) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.map(str::to_string),
            dims,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Profiles available when the config file defines none.
fn builtin_profiles() -> BTreeMap<String, ProfileConfig> {
    let mut ollama = ProfileConfig::new("ollama", Some("nomic-embed-text"), Some(768));
    ollama.url = Some("http://localhost:11434".to_string());

    let mut profiles = BTreeMap::new();
    profiles.insert("ollama".to_string(), ollama);
    profiles.insert(
        "openai".to_string(),
        ProfileConfig::new("openai", Some("text-embedding-3-small"), Some(1536)),
    );
    profiles
}

impl EmbeddingConfig {
    /// Look up a profile by name, falling back to the default profile.
    pub fn resolve(&self, name: Option<&str>) -> Result<&ProfileConfig> {
        let name = name.unwrap_or(&self.profile);
        self.profiles.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
            anyhow::anyhow!(
                "Unknown embedding profile: '{}'. Known profiles: {}",
                name,
                known.join(", ")
            )
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.embedding.profiles.is_empty() {
        config.embedding.profiles = builtin_profiles();
    }

    // Validate chunking
    config.chunking.validate()?;

    // Validate watch
    if config.watch.queue_capacity == 0 {
        anyhow::bail!("watch.queue_capacity must be >= 1");
    }
    let hash_file = &config.watch.hash_file;
    if hash_file.is_empty() || hash_file.contains('/') || hash_file.contains('\\') {
        anyhow::bail!(
            "watch.hash_file must be a plain file name, got '{}'",
            hash_file
        );
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }
    config.embedding.resolve(None)?;
    for (name, profile) in &config.embedding.profiles {
        if profile.dims == Some(0) {
            anyhow::bail!("embedding.profiles.{}.dims must be > 0", name);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[index]
path = "./data/index.sqlite"

[watch]
root = "./watched_folder"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.watch.hash_file, "file_hashes.csv");
        assert_eq!(config.watch.ignore_suffixes, vec![".tmp"]);
        assert_eq!(config.watch.ignore_prefixes, vec!["~$"]);
        assert_eq!(config.watch.queue_capacity, 256);
        assert_eq!(config.chunking, ChunkParams::default());
        assert_eq!(config.embedding.batch_size, 64);

        let profile = config.embedding.resolve(None).unwrap();
        assert_eq!(profile.provider, "ollama");
        assert_eq!(profile.model.as_deref(), Some("nomic-embed-text"));
        assert!(config.embedding.resolve(Some("openai")).is_ok());
    }

    #[test]
    fn test_custom_profiles_replace_builtins() {
        let text = format!(
            "{}\n[embedding]\nprofile = \"offline\"\n\n[embedding.profiles.offline]\nprovider = \"noop\"\ndims = 8\n",
            MINIMAL
        );
        let config = parse_config(&text).unwrap();
        assert_eq!(config.embedding.resolve(None).unwrap().provider, "noop");
        assert!(config.embedding.resolve(Some("ollama")).is_err());
    }

    #[test]
    fn test_overlap_must_be_below_size() {
        let text = format!("{}\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n", MINIMAL);
        let err = parse_config(&text).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let text = format!("{}\n[chunking]\nchunk_size = 0\nchunk_overlap = 0\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_hash_file_must_be_plain_name() {
        let text = MINIMAL.replace(
            "root = \"./watched_folder\"",
            "root = \"./watched_folder\"\nhash_file = \"sub/hashes.csv\"",
        );
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_unknown_default_profile_rejected() {
        let text = format!("{}\n[embedding]\nprofile = \"missing\"\n", MINIMAL);
        let err = parse_config(&text).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let text = MINIMAL.replace(
            "root = \"./watched_folder\"",
            "root = \"./watched_folder\"\nqueue_capacity = 0",
        );
        assert!(parse_config(&text).is_err());
    }
}
