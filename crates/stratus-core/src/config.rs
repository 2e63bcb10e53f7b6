//! Configuration module for Stratus.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::Account;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Stratus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub domain: DomainConfig,
    pub account: Option<AccountConfig>,
    pub enumeration: EnumerationConfig,
    pub store: StoreConfig,
    pub transfers: TransfersConfig,
    pub backend: BackendConfig,
    pub companion: CompanionConfig,
    pub daemon: DaemonConfig,
    pub logging: LoggingConfig,
}

/// Synchronization domain identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Identifier used for the lane key and the database file name.
    pub identifier: String,
    /// Name shown by the host.
    pub display_name: String,
}

/// Established account. Absent means every operation fails `NotAuthenticated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub user: String,
    pub server: String,
}

/// How the enumerator traverses containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumerationMode {
    /// Direct children of the requested container only.
    #[default]
    Fast,
    /// The whole subtree, up front.
    Full,
}

impl std::fmt::Display for EnumerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnumerationMode::Fast => write!(f, "fast"),
            EnumerationMode::Full => write!(f, "full"),
        }
    }
}

impl std::str::FromStr for EnumerationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(EnumerationMode::Fast),
            "full" => Ok(EnumerationMode::Full),
            other => Err(format!("unknown enumeration mode: {other}")),
        }
    }
}

/// Enumeration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumerationConfig {
    pub mode: EnumerationMode,
    /// Maximum number of items per page.
    pub page_size: usize,
}

/// Metadata store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one database file per domain.
    pub database_dir: PathBuf,
}

/// Transfer staging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransfersConfig {
    /// Directory for downloaded content and empty upload sources.
    pub scratch_dir: PathBuf,
}

/// Directory-backed remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Root directory that plays the role of the backend.
    pub root: PathBuf,
}

/// Companion process channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub enabled: bool,
    /// Unix socket the companion process listens on.
    pub socket_path: PathBuf,
}

/// Daemon loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Seconds between root enumerations.
    pub poll_interval: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/stratus/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("stratus")
            .join("config.yaml")
    }

    /// Database file for the configured domain.
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_dir
            .join(format!("{}.db", self.domain.identifier))
    }

    /// The configured account, bound to the configured domain.
    pub fn account(&self) -> Option<Account> {
        self.account
            .as_ref()
            .map(|a| Account::new(&a.user, &a.server, &self.domain.identifier))
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("stratus")
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            identifier: "default".to_string(),
            display_name: "Stratus".to_string(),
        }
    }
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            mode: EnumerationMode::Fast,
            page_size: 100,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_dir: data_dir(),
        }
    }
}

impl Default for TransfersConfig {
    fn default() -> Self {
        Self {
            scratch_dir: data_dir().join("transfers"),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("StratusRemote"),
        }
    }
}

impl Default for CompanionConfig {
    fn default() -> Self {
        let base = dirs::runtime_dir()
            .or_else(dirs::cache_dir)
            .unwrap_or_else(|| PathBuf::from("/tmp"));
        Self {
            enabled: false,
            socket_path: base.join("stratus").join("companion.sock"),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { poll_interval: 30 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"daemon.poll_interval"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            });
        };

        // --- domain ---
        let id = &self.domain.identifier;
        if id.is_empty() {
            push("domain.identifier", "must not be empty".into());
        } else if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            push(
                "domain.identifier",
                format!("may only contain letters, digits, '-', '_' and '.': {id}"),
            );
        }

        // --- account ---
        if let Some(account) = &self.account {
            if account.user.is_empty() {
                push("account.user", "must not be empty".into());
            }
            if account.server.is_empty() {
                push("account.server", "must not be empty".into());
            }
        }

        // --- enumeration ---
        if self.enumeration.page_size == 0 {
            push("enumeration.page_size", "must be greater than 0".into());
        }

        // --- daemon ---
        if self.daemon.poll_interval == 0 {
            push("daemon.poll_interval", "must be greater than 0".into());
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            push(
                "logging.format",
                format!(
                    "invalid format '{}', expected one of: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// ```
/// use stratus_core::config::{ConfigBuilder, EnumerationMode};
///
/// let cfg = ConfigBuilder::new()
///     .domain_identifier("work")
///     .enumeration_mode(EnumerationMode::Full)
///     .account("alice", "cloud.example.com")
///     .build();
/// assert_eq!(cfg.domain.identifier, "work");
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- domain ---

    pub fn domain_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.config.domain.identifier = identifier.into();
        self
    }

    pub fn domain_display_name(mut self, name: impl Into<String>) -> Self {
        self.config.domain.display_name = name.into();
        self
    }

    // --- account ---

    pub fn account(mut self, user: impl Into<String>, server: impl Into<String>) -> Self {
        self.config.account = Some(AccountConfig {
            user: user.into(),
            server: server.into(),
        });
        self
    }

    // --- enumeration ---

    pub fn enumeration_mode(mut self, mode: EnumerationMode) -> Self {
        self.config.enumeration.mode = mode;
        self
    }

    pub fn enumeration_page_size(mut self, page_size: usize) -> Self {
        self.config.enumeration.page_size = page_size;
        self
    }

    // --- paths ---

    pub fn database_dir(mut self, dir: PathBuf) -> Self {
        self.config.store.database_dir = dir;
        self
    }

    pub fn scratch_dir(mut self, dir: PathBuf) -> Self {
        self.config.transfers.scratch_dir = dir;
        self
    }

    pub fn backend_root(mut self, root: PathBuf) -> Self {
        self.config.backend.root = root;
        self
    }

    // --- companion ---

    pub fn companion_socket(mut self, socket_path: PathBuf) -> Self {
        self.config.companion.enabled = true;
        self.config.companion.socket_path = socket_path;
        self
    }

    // --- daemon ---

    pub fn poll_interval(mut self, seconds: u64) -> Self {
        self.config.daemon.poll_interval = seconds;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
