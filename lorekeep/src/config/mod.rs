//! Configuration system for Lorekeep.
//!
//! Configuration is layered with figment: built-in defaults, then a file
//! (TOML, YAML or JSON), then `LOREKEEP_` environment variables. Nested keys
//! use a double underscore, e.g. `LOREKEEP_RESOLUTION__FUZZY_THRESHOLD=0.9`.

mod builder;
mod loader;
mod models;
#[cfg(test)]
mod tests;
mod validation;

pub use builder::ConfigBuilder;
pub use loader::ConfigLoader;
pub use models::*;
pub use validation::validate_config;

/// Default configuration file names that the system will look for
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "lorekeep.toml",
    "lorekeep.yaml",
    "lorekeep.yml",
    "lorekeep.json",
    ".lorekeep/config.toml",
    ".lorekeep/config.yaml",
    ".lorekeep/config.yml",
    ".lorekeep/config.json",
];

/// Environment variable prefix for Lorekeep configuration
pub const ENV_PREFIX: &str = "LOREKEEP_";

/// Configuration error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Error occurred during file loading
    #[error("Failed to load configuration file: {0}")]
    FileLoadError(String),

    /// Error occurred during environment loading
    #[error("Failed to load environment variables: {0}")]
    EnvLoadError(String),

    /// Error occurred during validation
    #[error("Configuration validation error: {0}")]
    ValidationError(String),

    /// Error occurred during parsing
    #[error("Configuration parsing error: {0}")]
    ParseError(String),

    /// General error
    #[error("{0}")]
    Other(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
