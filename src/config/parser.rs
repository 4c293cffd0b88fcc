use crate::config::types::ModelFile;
use crate::config::validation::build_model;
use crate::model::ScrapeModel;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads, parses and validates a scrape model file
///
/// # Arguments
///
/// * `path` - Path to the TOML model file
///
/// # Returns
///
/// * `Ok(ScrapeModel)` - Successfully loaded and validated model
/// * `Err(ConfigError)` - Failed to load, parse, or validate the model
pub fn load_model(path: &Path) -> Result<ScrapeModel, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let raw: ModelFile = toml::from_str(&content)?;
    build_model(raw)
}

/// Computes a SHA-256 hash of the model file content
///
/// Logged at startup so differing runs of "the same" model are
/// distinguishable in retrospect.
pub fn compute_model_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a model and returns both the model and its file hash
pub fn load_model_with_hash(path: &Path) -> Result<(ScrapeModel, String), ConfigError> {
    let model = load_model(path)?;
    let hash = compute_model_hash(path)?;
    Ok((model, hash))
}
