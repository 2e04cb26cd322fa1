use super::{EncoderConfig, LogFormat, LogsSort, MetricsSort, TracesSort};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "OTLP2ARROW_";

/// Abstraction over environment-variable lookups so embedders and tests can
/// supply their own source of overrides.
pub trait EnvSource {
    /// Look up `key` without the `OTLP2ARROW_` prefix
    fn get(&self, key: &str) -> Option<String>;
}

impl EnvSource for std::collections::HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        std::collections::HashMap::get(self, key).cloned()
    }
}

/// Apply environment-variable overrides (highest priority) to the config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut EncoderConfig, env: &E) -> Result<()> {
    if let Some(val) = get_env_u16(env, "MAX_ID_DELTA")? {
        config.max_id_delta = val;
    }

    // Optimizer sort keys
    if let Some(sort) = env.get("METRICS_SORT") {
        config.metrics.sort = sort
            .parse::<MetricsSort>()
            .context("Invalid OTLP2ARROW_METRICS_SORT value")?;
    }
    if let Some(sort) = env.get("LOGS_SORT") {
        config.logs.sort = sort
            .parse::<LogsSort>()
            .context("Invalid OTLP2ARROW_LOGS_SORT value")?;
    }
    if let Some(sort) = env.get("TRACES_SORT") {
        config.traces.sort = sort
            .parse::<TracesSort>()
            .context("Invalid OTLP2ARROW_TRACES_SORT value")?;
    }

    if let Some(val) = get_env_bool(env, "SCHEMA_STATS")? {
        config.stats.schema_stats = val;
    }

    // Logging
    if let Some(level) = env.get("LOG_LEVEL") {
        config.log.level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        config.log.format = format
            .parse::<LogFormat>()
            .context("Invalid OTLP2ARROW_LOG_FORMAT value")?;
    }

    Ok(())
}

fn get_env_u16<E: EnvSource>(env: &E, key: &str) -> Result<Option<u16>> {
    match env.get(key) {
        Some(val) => {
            let parsed = val
                .parse::<u16>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match env.get(key) {
        Some(val) => {
            let parsed = val.parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
