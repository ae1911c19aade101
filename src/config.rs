use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GmailError, Result};

/// Environment variable naming the OAuth client secret file (may be a glob)
pub const ENV_CREDENTIALS_PATH: &str = "GMAIL_CREDENTIALS_PATH";
/// Environment variable naming the cached token file
pub const ENV_TOKEN_PATH: &str = "GMAIL_TOKEN_PATH";
/// Environment variable naming the CSV output directory
pub const ENV_OUTPUT_DIR: &str = "CSV_OUTPUT_DIR";
/// Environment variable holding the optional AI assistant key
pub const ENV_ASSISTANT_KEY: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    /// Explicit client secret file; when unset the directory is searched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: PathBuf,
    #[serde(default = "default_credentials_pattern")]
    pub credentials_pattern: String,
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
    #[serde(default)]
    pub consent_mode: ConsentMode,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            credentials_dir: default_credentials_dir(),
            credentials_pattern: default_credentials_pattern(),
            token_path: default_token_path(),
            consent_mode: ConsentMode::default(),
        }
    }
}

/// How the one-time authorization code is collected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsentMode {
    /// Open the consent page and catch the redirect on a loopback listener
    #[default]
    Browser,
    /// Print the consent URL and read the code from the terminal
    Console,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_results: default_max_results(),
        }
    }
}

/// Reserved for assistant features; the export path never reads it
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AssistantConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn default_credentials_dir() -> PathBuf {
    PathBuf::from("./private")
}

fn default_credentials_pattern() -> String {
    "client_secret_*.json".to_string()
}

fn default_token_path() -> PathBuf {
    PathBuf::from("./private/token.json")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./csv")
}

pub fn default_max_results() -> u32 {
    100
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GmailError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides from an arbitrary lookup
    ///
    /// A credentials value containing `*` is split into a search directory and
    /// a file-name pattern rather than used as a literal path.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CREDENTIALS_PATH).filter(|v| !v.is_empty()) {
            if value.contains('*') {
                let pattern_path = PathBuf::from(&value);
                if let Some(parent) = pattern_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    self.gmail.credentials_dir = parent.to_path_buf();
                }
                if let Some(name) = pattern_path.file_name() {
                    self.gmail.credentials_pattern = name.to_string_lossy().into_owned();
                }
                self.gmail.credentials_path = None;
            } else {
                self.gmail.credentials_path = Some(PathBuf::from(value));
            }
        }

        if let Some(value) = lookup(ENV_TOKEN_PATH).filter(|v| !v.is_empty()) {
            self.gmail.token_path = PathBuf::from(value);
        }

        if let Some(value) = lookup(ENV_OUTPUT_DIR).filter(|v| !v.is_empty()) {
            self.export.output_dir = PathBuf::from(value);
        }

        if let Some(value) = lookup(ENV_ASSISTANT_KEY).filter(|v| !v.is_empty()) {
            self.assistant.api_key = Some(value);
        }
    }

    /// Locate the OAuth client secret file
    ///
    /// An explicit path wins; otherwise the first file (in name order) inside
    /// `credentials_dir` matching `credentials_pattern` is used.
    pub fn resolve_credentials_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.gmail.credentials_path {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(GmailError::ConfigError(format!(
                "Gmail credentials file not found at {:?}. Download it from Google Cloud Console",
                path
            )));
        }

        let pattern = self
            .gmail
            .credentials_dir
            .join(&self.gmail.credentials_pattern);
        let pattern = pattern.to_string_lossy();

        let mut matches: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| {
                GmailError::ConfigError(format!("Invalid credentials pattern '{}': {}", pattern, e))
            })?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();
        matches.sort();

        matches.into_iter().next().ok_or_else(|| {
            GmailError::ConfigError(format!(
                "No Gmail credentials file matching '{}' found in {:?}. Download it from Google Cloud Console",
                self.gmail.credentials_pattern, self.gmail.credentials_dir
            ))
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.export.max_results == 0 {
            return Err(GmailError::ConfigError(
                "export.max_results must be at least 1".to_string(),
            ));
        }

        if self.export.output_dir.as_os_str().is_empty() {
            return Err(GmailError::ConfigError(
                "export.output_dir cannot be empty".to_string(),
            ));
        }

        if self.gmail.token_path.as_os_str().is_empty() {
            return Err(GmailError::ConfigError(
                "gmail.token_path cannot be empty".to_string(),
            ));
        }

        if self.gmail.credentials_pattern.trim().is_empty() {
            return Err(GmailError::ConfigError(
                "gmail.credentials_pattern cannot be empty".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
