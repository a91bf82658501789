//! Configuration module for Triad.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resolver::DEFAULT_CRITERION;

/// Upper bound for every configured delay, in milliseconds (one hour)
pub const MAX_DELAY_MS: u64 = 60 * 60 * 1000;

fn bounded(ms: u64) -> Duration {
    Duration::from_millis(ms.min(MAX_DELAY_MS))
}

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Triad.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
    pub persistence: PersistenceConfig,
}

/// Refresh and comparison settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Identifier of the comparison criterion selected at startup.
    pub comparison_criterion: String,
    /// Milliseconds a resource must be quiet before a local change triggers a refresh.
    pub refresh_debounce_ms: u64,
    /// Milliseconds between polls of the debounced change queue.
    pub poll_interval_ms: u64,
    /// Whether conflicting files are classified for mergeability right after refresh.
    pub classify_conflicts: bool,
}

/// Background event handler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Label dispatch delay while any node is busy.
    pub early_dispatch_ms: u64,
    /// Label dispatch delay when nothing is busy.
    pub dispatch_delay_ms: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

/// Descriptor cache persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Prefix of every qualified name written to the byte store.
    pub qualifier_prefix: String,
}

// ---------------------------------------------------------------------------
// Config::load()
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
    /// Typically `$XDG_CONFIG_HOME/triad/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("triad")
            .join("config.yaml")
    }
}

impl SyncConfig {
    pub fn refresh_debounce(&self) -> Duration {
        bounded(self.refresh_debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        bounded(self.poll_interval_ms)
    }
}

impl EventsConfig {
    pub fn early_dispatch(&self) -> Duration {
        bounded(self.early_dispatch_ms)
    }

    pub fn dispatch_delay(&self) -> Duration {
        bounded(self.dispatch_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            comparison_criterion: DEFAULT_CRITERION.to_string(),
            refresh_debounce_ms: 500,
            poll_interval_ms: 100,
            classify_conflicts: false,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            early_dispatch_ms: 250,
            dispatch_delay_ms: 1500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            qualifier_prefix: "triad".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"events.dispatch_delay_ms"`.
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
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

/// Valid values for `sync.comparison_criterion`.
const VALID_CRITERIA: &[&str] = &[DEFAULT_CRITERION, "content", "content-ignore-whitespace"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if !VALID_CRITERIA.contains(&self.sync.comparison_criterion.as_str()) {
            errors.push(ValidationError {
                field: "sync.comparison_criterion".into(),
                message: format!(
                    "invalid criterion '{}'; valid options: {}",
                    self.sync.comparison_criterion,
                    VALID_CRITERIA.join(", ")
                ),
            });
        }
        if self.sync.poll_interval_ms == 0 {
            errors.push(ValidationError {
                field: "sync.poll_interval_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- events ---
        if self.events.early_dispatch_ms == 0 {
            errors.push(ValidationError {
                field: "events.early_dispatch_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.events.early_dispatch_ms > self.events.dispatch_delay_ms {
            errors.push(ValidationError {
                field: "events.early_dispatch_ms".into(),
                message: format!(
                    "early_dispatch_ms ({}) must not exceed dispatch_delay_ms ({})",
                    self.events.early_dispatch_ms, self.events.dispatch_delay_ms
                ),
            });
        }

        for (field, value) in [
            ("sync.refresh_debounce_ms", self.sync.refresh_debounce_ms),
            ("sync.poll_interval_ms", self.sync.poll_interval_ms),
            ("events.early_dispatch_ms", self.events.early_dispatch_ms),
            ("events.dispatch_delay_ms", self.events.dispatch_delay_ms),
        ] {
            if value > MAX_DELAY_MS {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("must not exceed {MAX_DELAY_MS} ms"),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        // --- persistence ---
        let prefix = &self.persistence.qualifier_prefix;
        if prefix.is_empty() || prefix.contains(':') || prefix.chars().any(char::is_whitespace) {
            errors.push(ValidationError {
                field: "persistence.qualifier_prefix".into(),
                message: "must be non-empty without ':' or whitespace".into(),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use triad_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .sync_comparison_criterion("content")
///     .events_dispatch_delay_ms(2000)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_comparison_criterion(mut self, id: impl Into<String>) -> Self {
        self.config.sync.comparison_criterion = id.into();
        self
    }

    pub fn sync_refresh_debounce_ms(mut self, ms: u64) -> Self {
        self.config.sync.refresh_debounce_ms = ms;
        self
    }

    pub fn sync_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.sync.poll_interval_ms = ms;
        self
    }

    pub fn sync_classify_conflicts(mut self, enabled: bool) -> Self {
        self.config.sync.classify_conflicts = enabled;
        self
    }

    // --- events ---

    pub fn events_early_dispatch_ms(mut self, ms: u64) -> Self {
        self.config.events.early_dispatch_ms = ms;
        self
    }

    pub fn events_dispatch_delay_ms(mut self, ms: u64) -> Self {
        self.config.events.dispatch_delay_ms = ms;
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

    // --- persistence ---

    pub fn persistence_qualifier_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.persistence.qualifier_prefix = prefix.into();
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
