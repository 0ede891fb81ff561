//! Configuration module for the retrieval engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CDX_` and use double
//! underscores to separate nested levels:
//! - `CDX_INDEX__BACKEND=ivf` sets `index.backend`
//! - `CDX_SEARCH__DEFAULT_LIMIT=10` sets `search.default_limit`
//! - `CDX_STORAGE__PERSIST_PATH=/var/lib/chunkdex` sets `storage.persist_path`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::index::BackendKind;

/// Global debug flag, settable once at startup and readable from anywhere
/// without threading the settings struct through every call site.
static GLOBAL_DEBUG: AtomicBool = AtomicBool::new(false);

pub fn set_global_debug(enabled: bool) {
    GLOBAL_DEBUG.store(enabled, Ordering::Relaxed);
}

pub fn is_global_debug_enabled() -> bool {
    GLOBAL_DEBUG.load(Ordering::Relaxed)
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .chunkdex is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Index backend settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Search settings
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Directory where collection snapshots and index files live
    #[serde(default = "default_persist_path")]
    pub persist_path: PathBuf,

    /// Name of the default collection
    #[serde(default = "default_collection")]
    pub collection: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Which index backend to use for new collections
    #[serde(default)]
    pub backend: BackendKind,

    /// Number of IVF clusters; 0 selects sqrt(n) automatically
    #[serde(default)]
    pub nlist: usize,

    /// Number of clusters probed per IVF search
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Result count when the caller does not specify one
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Search deadline in milliseconds; 0 disables the deadline
    #[serde(default)]
    pub timeout_ms: u64,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_persist_path() -> PathBuf {
    PathBuf::from(".chunkdex/collections")
}
fn default_collection() -> String {
    "documents".to_string()
}
fn default_nprobe() -> usize {
    1
}
fn default_limit() -> usize {
    5
}
fn default_false() -> bool {
    false
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            debug: false,
            storage: StorageConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persist_path: default_persist_path(),
            collection: default_collection(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            nlist: 0,
            nprobe: default_nprobe(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            timeout_ms: 0,
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .chunkdex directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(".chunkdex/settings.toml"));

        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Layer in environment variables with CDX_ prefix
            // Use double underscore (__) to separate nested levels
            // Single underscore (_) remains as is within field names
            .merge(Env::prefixed("CDX_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".") // Double underscore becomes dot
                    .into()
            }))
            // Extract into Settings struct
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Find the workspace root by looking for .chunkdex directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".chunkdex");
            if config_dir.exists() && config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Get the workspace root directory (where .chunkdex is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".chunkdex");
            if config_dir.exists() && config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CDX_").split("_"))
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file
    pub fn save(
        &self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(".chunkdex/settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let current_dir = std::env::current_dir().unwrap_or_default();
        let template = format!(
            r#"# Chunkdex Configuration File

# Version of the configuration schema
version = 1

# Workspace root directory (automatically detected)
workspace_root = "{}"

# Global debug mode
debug = false

[storage]
# Directory where collection snapshots and index files are stored
persist_path = ".chunkdex/collections"

# Name of the default collection
collection = "documents"

[index]
# Index backend: "flat" (exact exhaustive search), "ivf" (inverted-file
# clustering, approximate), or "remote" (external index service)
backend = "flat"

# Number of IVF clusters. 0 chooses sqrt(document count) automatically.
nlist = 0

# Number of clusters probed per IVF search. Higher is slower but more accurate.
nprobe = 1

[search]
# Result count when the caller does not specify one
default_limit = 5

# Search deadline in milliseconds. 0 disables the deadline.
timeout_ms = 0
"#,
            current_dir.display()
        );

        std::fs::write(&config_path, template)?;

        if force {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
        }

        Ok(config_path)
    }
}
