use super::{types::EngineConfig, ConfigError};

/// Validate configuration
/// Currently validates:
/// - HTTP timeout is not 0
/// - Rate limit delay is finite and non-negative
/// - Indexer entries carry unique, non-empty ids
pub fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.http.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "http.timeout_secs cannot be 0".to_string(),
        ));
    }

    let delay = config.rate_limit.min_delay_secs;
    if !delay.is_finite() || delay < 0.0 {
        return Err(ConfigError::ValidationError(format!(
            "rate_limit.min_delay_secs must be >= 0, got {delay}"
        )));
    }

    let mut seen = std::collections::BTreeSet::new();
    for entry in &config.indexers {
        if entry.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "indexer entry with empty id".to_string(),
            ));
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate indexer entry '{}'",
                entry.id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    #[test]
    fn test_validate_default_config() {
        let config = EngineConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let config = load_config_from_str("[http]\ntimeout_secs = 0").unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_negative_delay_fails() {
        let config = load_config_from_str("[rate_limit]\nmin_delay_secs = -1.0").unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_indexer_fails() {
        let toml = r#"
[[indexers]]
id = "demo"

[[indexers]]
id = "demo"
"#;
        let config = load_config_from_str(toml).unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
