// Configuration validation
//
// Validates that values are sensible before any builder is created

use super::EncoderConfig;
use crate::error::{Error, Result};
use tracing::warn;

const KNOWN_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &EncoderConfig) -> Result<()> {
    if config.max_id_delta == 0 {
        return Err(Error::config("max_id_delta must be greater than 0"));
    }

    if config.max_id_delta > 1 {
        warn!(
            max_id_delta = config.max_id_delta,
            "max_id_delta above 1 allows gaps between primary row ids"
        );
    }

    if config.log.level.trim().is_empty() {
        return Err(Error::config("log.level must not be empty"));
    }

    // Filter directives like "otlp2arrow_core=debug" are passed through untouched
    let level = config.log.level.to_lowercase();
    if !level.contains('=') && !KNOWN_LOG_LEVELS.contains(&level.as_str()) {
        warn!(
            level = %config.log.level,
            "log.level is not a known level; the subscriber may ignore it"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_delta_is_rejected() {
        let config = EncoderConfig {
            max_id_delta: 0,
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("max_id_delta"));
    }

    #[test]
    fn empty_log_level_is_rejected() {
        let mut config = EncoderConfig::default();
        config.log.level = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, Error::Config { ref message } if message.contains("log.level")));
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&EncoderConfig::default()).is_ok());
    }
}
