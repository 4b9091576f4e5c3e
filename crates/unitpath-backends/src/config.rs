//! Configuration and backend factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use unitpath_core::engine::EngineConfig;
use unitpath_core::parser::load_catalog;
use unitpath_core::policy::ProgressPolicy;
use unitpath_core::traits::{ContentSource, ProgressStore};

use crate::http_content::HttpContentSource;
use crate::json_file::JsonFileStore;
use crate::memory::MemoryStore;

/// Where progress is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory,
    Json {
        #[serde(default = "default_data_dir")]
        path: PathBuf,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Json {
            path: default_data_dir(),
        }
    }
}

/// Where exercises and tracks come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentConfig {
    /// A TOML catalog file or directory.
    Catalog {
        #[serde(default = "default_catalog_path")]
        path: PathBuf,
    },
    Http {
        base_url: String,
        #[serde(default = "default_content_timeout")]
        timeout_secs: u64,
    },
}

impl Default for ContentConfig {
    fn default() -> Self {
        ContentConfig::Catalog {
            path: default_catalog_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Top-level unitpath configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitpathConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub content: ContentConfig,
    /// Progression thresholds.
    #[serde(default)]
    pub policy: ProgressPolicy,
    #[serde(default)]
    pub server: ServerConfig,
    /// Timeout for each progress store call, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for UnitpathConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            content: ContentConfig::default(),
            policy: ProgressPolicy::default(),
            server: ServerConfig::default(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./unitpath-data")
}
fn default_catalog_path() -> PathBuf {
    PathBuf::from("./catalogs")
}
fn default_content_timeout() -> u64 {
    15
}
fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_store_timeout_ms() -> u64 {
    15_000
}

impl UnitpathConfig {
    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            policy: self.policy.clone(),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_path(p: &Path) -> PathBuf {
    PathBuf::from(resolve_env_vars(&p.to_string_lossy()))
}

fn resolve_references(config: &mut UnitpathConfig) {
    if let StoreConfig::Json { path } = &mut config.store {
        *path = resolve_path(path);
    }
    match &mut config.content {
        ContentConfig::Catalog { path } => *path = resolve_path(path),
        ContentConfig::Http { base_url, .. } => *base_url = resolve_env_vars(base_url),
    }
    config.server.bind = resolve_env_vars(&config.server.bind);
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `unitpath.toml` in the current directory
/// 2. `~/.config/unitpath/config.toml`
///
/// Environment variable overrides: `UNITPATH_DATA_DIR`, `UNITPATH_BIND`.
pub fn load_config() -> Result<UnitpathConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<UnitpathConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("unitpath.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => parse_config(&path)?,
        None => UnitpathConfig::default(),
    };

    resolve_references(&mut config);
    apply_env_overrides(&mut config);

    config.policy.validate().context("invalid [policy]")?;

    Ok(config)
}

fn parse_config(path: &Path) -> Result<UnitpathConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<UnitpathConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn apply_env_overrides(config: &mut UnitpathConfig) {
    if let Ok(dir) = std::env::var("UNITPATH_DATA_DIR") {
        config.store = StoreConfig::Json {
            path: PathBuf::from(dir),
        };
    }
    if let Ok(bind) = std::env::var("UNITPATH_BIND") {
        config.server.bind = bind;
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("unitpath"))
}

/// Create a progress store from its configuration.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn ProgressStore>> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreConfig::Json { path } => {
            let store = JsonFileStore::new(path)
                .await
                .with_context(|| format!("failed to open data directory: {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Create a content source from its configuration.
pub fn create_content(config: &ContentConfig) -> Result<Arc<dyn ContentSource>> {
    match config {
        ContentConfig::Catalog { path } => {
            let catalog = load_catalog(path)
                .with_context(|| format!("failed to load catalog: {}", path.display()))?;
            tracing::info!(
                tracks = catalog.tracks().len(),
                exercises = catalog.exercises().len(),
                "catalog loaded"
            );
            Ok(Arc::new(catalog))
        }
        ContentConfig::Http {
            base_url,
            timeout_secs,
        } => Ok(Arc::new(HttpContentSource::with_timeout(
            base_url,
            *timeout_secs,
        ))),
    }
}
