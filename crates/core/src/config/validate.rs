use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Indexer and download client names are unique and non-empty
/// - Every indexer and client has an endpoint
/// - Quality profiles rank at least one format
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.search.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "search.timeout_secs cannot be 0".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for indexer in &config.indexers {
        if indexer.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "indexer name cannot be empty".to_string(),
            ));
        }
        if !seen.insert(indexer.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate indexer name: {}",
                indexer.name
            )));
        }
        if indexer.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "indexer '{}' has no url",
                indexer.name
            )));
        }
    }

    let mut seen = HashSet::new();
    for client in &config.download_clients {
        if client.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "download client name cannot be empty".to_string(),
            ));
        }
        if !seen.insert(client.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate download client name: {}",
                client.name
            )));
        }
        if client.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "download client '{}' has no url",
                client.name
            )));
        }
    }

    for profile in &config.quality_profiles {
        if profile.formats.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "quality profile '{}' must rank at least one format",
                profile.name
            )));
        }
    }

    Ok(())
}
