//! Loomcrawl: a template-driven web extraction engine
//!
//! This crate turns a declarative scrape model (phases, seed sources and
//! record templates) into a concurrent fetch/parse pipeline that emits
//! structured records to storage sinks and derives further requests from
//! the values it extracts.

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod model;
pub mod storage;

use thiserror::Error;

/// Main error type for loomcrawl operations
#[derive(Debug, Error)]
pub enum LoomError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Extraction error: {0}")]
    Extract(#[from] crawler::ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// These are fatal at phase start: they name the offending template,
/// function or selector and abort the phase before any fetch is issued.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in model: {0}")]
    InvalidUrl(String),

    #[error("Template '{template}': unknown transform function '{function}'")]
    UnknownTransform { template: String, function: String },

    #[error("Unknown parser kind: {0}")]
    UnknownParser(String),

    #[error("Unknown fetcher: {0}")]
    UnknownFetcher(String),

    #[error("Template '{template}': invalid selector '{selector}': {message}")]
    InvalidSelector {
        template: String,
        selector: String,
        message: String,
    },

    #[error("Template '{template}': invalid js-regex: {message}")]
    InvalidJsRegex { template: String, message: String },

    #[error("Template '{template}': sink kind and collection must be set together")]
    PartialSinkTarget { template: String },

    #[error("Phase '{0}' has no parser and no previous phase to inherit one from")]
    MissingParser(String),
}

/// Result type alias for loomcrawl operations
pub type Result<T> = std::result::Result<T, LoomError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::load_model;
pub use crawler::{Fetcher, HttpFetcher, Orchestrator};
pub use frontier::Frontier;
pub use model::{Attr, Phase, Record, ScrapeModel, SinkKind, Source, Template, Value};
pub use storage::{MemorySink, Sink, SqliteSink};
