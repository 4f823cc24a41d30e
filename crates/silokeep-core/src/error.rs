//! Error types for silokeep core types and configuration.

use thiserror::Error;

/// Errors raised while parsing or validating a `StoreConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse store config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid store config: {0}")]
    Invalid(String),
}

/// Errors raised while parsing a silo address string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("missing '@generation' suffix in {0:?}")]
    MissingGeneration(String),

    #[error("invalid endpoint in {0:?}")]
    Endpoint(String),

    #[error("invalid generation in {0:?}")]
    Generation(String),
}
