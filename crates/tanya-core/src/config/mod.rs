use crate::error::{Result, TanyaError};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TanyaConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// Custom path for the SQLite database. Defaults to `~/.config/tanya/tanya.db`.
    #[serde(default)]
    pub path: Option<String>,
    /// Root directory of the JSON file store. Defaults to `~/.config/tanya/data`.
    #[serde(default)]
    pub data_dir: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
            data_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_web_host")]
    pub host: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_web_port(),
            host: default_web_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Characters of the latest message shown in a session summary.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            preview_chars: default_preview_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_title")]
    pub default_title: String,
    #[serde(default = "default_import_title")]
    pub import_title: String,
    /// Maximum characters of a title derived from the first message.
    #[serde(default = "default_title_chars")]
    pub title_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_title: default_title(),
            import_title: default_import_title(),
            title_chars: default_title_chars(),
        }
    }
}

// -- Defaults --

fn default_storage_backend() -> String {
    "sqlite".to_string()
}
fn default_web_port() -> u16 {
    3717
}
fn default_web_host() -> String {
    "127.0.0.1".to_string()
}
fn default_preview_chars() -> usize {
    100
}
fn default_title() -> String {
    "New Chat".to_string()
}
fn default_import_title() -> String {
    "Imported Chat".to_string()
}
fn default_title_chars() -> usize {
    50
}

/// Valid storage backend names.
pub const VALID_STORAGE_BACKENDS: &[&str] = &["sqlite", "json"];

impl TanyaConfig {
    /// Load configuration with three-layer TOML merge, then environment:
    /// 1. ~/.config/tanya/config.toml (global)
    /// 2. .tanya/config.toml (project)
    /// 3. .tanya/config.local.toml (local, gitignored)
    /// 4. `TANYA_*` environment variables, `__` between section and key
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        // Layer 1: Global config
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        // Layer 2: Project config
        if let Some(dir) = project_dir {
            let project_config = dir.join(".tanya").join("config.toml");
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }

            // Layer 3: Local config (gitignored)
            let local_config = dir.join(".tanya").join("config.local.toml");
            if local_config.exists() {
                builder = builder.add_source(File::from(local_config).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("TANYA")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = builder
            .build()
            .map_err(|e| TanyaError::Config(e.to_string()))?;

        let mut cfg: Self = config
            .try_deserialize()
            .map_err(|e| TanyaError::Config(e.to_string()))?;

        cfg.validate();
        Ok(cfg)
    }

    /// Load with defaults only (no files).
    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig::default(),
            web: WebConfig::default(),
            listing: ListingConfig::default(),
            chat: ChatConfig::default(),
        }
    }

    /// Validate config values, clamping out-of-range values and logging warnings.
    /// An unknown backend is only reported here; `create_backend` rejects it.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !VALID_STORAGE_BACKENDS.contains(&self.storage.backend.as_str()) {
            warnings.push(format!(
                "unknown storage backend '{}', valid: {}",
                self.storage.backend,
                VALID_STORAGE_BACKENDS.join(", ")
            ));
        }

        if self.listing.preview_chars == 0 {
            warnings.push("listing.preview_chars = 0, setting to 100".to_string());
            self.listing.preview_chars = default_preview_chars();
        }

        if self.chat.title_chars == 0 {
            warnings.push("chat.title_chars = 0, setting to 50".to_string());
            self.chat.title_chars = default_title_chars();
        }

        if self.chat.default_title.trim().is_empty() {
            warnings.push("chat.default_title is blank, using \"New Chat\"".to_string());
            self.chat.default_title = default_title();
        }

        if self.chat.import_title.trim().is_empty() {
            warnings.push("chat.import_title is blank, using \"Imported Chat\"".to_string());
            self.chat.import_title = default_import_title();
        }

        for w in &warnings {
            tracing::warn!("config: {}", w);
        }

        warnings
    }
}

fn global_config_path() -> Option<PathBuf> {
    config_root().map(|p| p.join("config.toml"))
}

/// `~/.config/tanya`
pub fn config_root() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tanya"))
}

/// Resolve the SQLite path from config, falling back to `~/.config/tanya/tanya.db`.
pub fn sqlite_path(config: &StorageConfig) -> Result<PathBuf> {
    match &config.path {
        Some(p) => Ok(PathBuf::from(p)),
        None => config_root()
            .map(|p| p.join("tanya.db"))
            .ok_or_else(|| TanyaError::Config("cannot determine config directory".to_string())),
    }
}

/// Resolve the JSON store root from config, falling back to `~/.config/tanya/data`.
pub fn data_dir(config: &StorageConfig) -> Result<PathBuf> {
    match &config.data_dir {
        Some(p) => Ok(PathBuf::from(p)),
        None => config_root()
            .map(|p| p.join("data"))
            .ok_or_else(|| TanyaError::Config("cannot determine config directory".to_string())),
    }
}
