//! Configuration loading and resolution
//!
//! Every loader setting is resolved field by field in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: the resolver logs a warning and
//! continues with defaults. A file that exists but fails to parse is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG_PATH: &str = "FRAGKIT_CONFIG";
pub const ENV_BASE_URL: &str = "FRAGKIT_BASE_URL";
pub const ENV_LINES_OF_CONTEXT: &str = "FRAGKIT_LINES_OF_CONTEXT";
pub const ENV_CACHE_TOKEN: &str = "FRAGKIT_CACHE_TOKEN";
pub const ENV_TIMEOUT_SECS: &str = "FRAGKIT_TIMEOUT_SECS";

/// What the batch dispatcher does with queued batches after one fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Report the failed batch and keep processing the queue
    Continue,
    /// Report the failed batch and reject every batch queued behind it
    #[default]
    RejectRemaining,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file (stdout when absent)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_file: None,
        }
    }
}

/// `[loader]` table of the TOML file; every field optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSection {
    pub base_url: Option<String>,
    pub lines_of_context: Option<String>,
    pub cache_token: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub failure_policy: Option<FailurePolicy>,
}

/// On-disk configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub loader: LoaderSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Fully resolved loader configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Endpoint prefix; always ends with `/`
    pub base_url: String,
    /// Value of the `lines_of_context` query parameter
    pub lines_of_context: Option<String>,
    /// Trailing cache-busting query token
    pub cache_token: Option<String>,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub failure_policy: FailurePolicy,
    pub logging: LoggingConfig,
}

/// Compiled fallback values
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub base_url: String,
    pub cache_token: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub failure_policy: FailurePolicy,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/fragments/".to_string(),
            cache_token: env!("CARGO_PKG_VERSION").to_string(),
            request_timeout_secs: 30,
            user_agent: format!("fragkit/{}", env!("CARGO_PKG_VERSION")),
            failure_policy: FailurePolicy::default(),
            log_level: default_log_level(),
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub base_url: Option<String>,
    pub lines_of_context: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// Default config file location for the platform
///
/// `<config_dir>/fragkit/config.toml`, falling back to
/// `/etc/fragkit/config.toml` on Linux when the user file is absent.
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("fragkit").join("config.toml"));

    if cfg!(target_os = "linux") {
        if let Some(path) = &user_config {
            if path.exists() {
                return user_config;
            }
        }
        let system_config = PathBuf::from("/etc/fragkit/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    user_config
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Resolves [`LoaderConfig`] from overrides, environment, file and defaults
pub struct ConfigResolver {
    defaults: CompiledDefaults,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self {
            defaults: CompiledDefaults::for_current_platform(),
        }
    }

    pub fn with_defaults(defaults: CompiledDefaults) -> Self {
        Self { defaults }
    }

    pub fn resolve(&self, overrides: &ConfigOverrides) -> Result<LoaderConfig> {
        let file = self.load_file(overrides)?;
        let section = file.loader;

        let base_url = overrides
            .base_url
            .clone()
            .or_else(|| env_string(ENV_BASE_URL))
            .or(section.base_url)
            .unwrap_or_else(|| self.defaults.base_url.clone());

        let lines_of_context = overrides
            .lines_of_context
            .clone()
            .or_else(|| env_string(ENV_LINES_OF_CONTEXT))
            .or(section.lines_of_context);

        let cache_token = env_string(ENV_CACHE_TOKEN)
            .or(section.cache_token)
            .unwrap_or_else(|| self.defaults.cache_token.clone());

        let request_timeout_secs = match overrides.request_timeout_secs {
            Some(secs) => secs,
            None => match env_string(ENV_TIMEOUT_SECS) {
                Some(raw) => raw.parse().map_err(|_| {
                    Error::Config(format!("{} is not a number: {:?}", ENV_TIMEOUT_SECS, raw))
                })?,
                None => section
                    .request_timeout_secs
                    .unwrap_or(self.defaults.request_timeout_secs),
            },
        };

        let config = LoaderConfig {
            base_url: normalize_base_url(&base_url)?,
            lines_of_context,
            cache_token: Some(cache_token).filter(|t| !t.is_empty()),
            request_timeout_secs,
            user_agent: section
                .user_agent
                .unwrap_or_else(|| self.defaults.user_agent.clone()),
            failure_policy: section
                .failure_policy
                .unwrap_or(self.defaults.failure_policy),
            logging: file.logging,
        };

        if config.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request timeout must be at least 1 second".to_string(),
            ));
        }

        debug!(?config, "Resolved loader configuration");
        Ok(config)
    }

    fn load_file(&self, overrides: &ConfigOverrides) -> Result<TomlConfig> {
        let explicit = overrides
            .config_path
            .clone()
            .or_else(|| env_string(ENV_CONFIG_PATH).map(PathBuf::from));

        let path = match explicit.or_else(default_config_path) {
            Some(path) => path,
            None => return Ok(self.default_file()),
        };

        if !path.exists() {
            warn!(
                "Config file {} not found, using compiled defaults",
                path.display()
            );
            return Ok(self.default_file());
        }

        debug!("Loading config file {}", path.display());
        load_toml_config(&path)
    }

    fn default_file(&self) -> TomlConfig {
        TomlConfig {
            loader: LoaderSection::default(),
            logging: LoggingConfig {
                level: self.defaults.log_level.clone(),
                log_file: None,
            },
        }
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Require an http(s) scheme and a trailing slash
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(Error::Config(format!(
            "base URL must start with http:// or https://: {:?}",
            raw
        )));
    }

    if trimmed.ends_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{}/", trimmed))
    }
}
