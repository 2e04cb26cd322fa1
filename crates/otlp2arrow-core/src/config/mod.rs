// Encoder configuration
//
// Sources, highest priority first:
// 1. Environment variables (OTLP2ARROW_* prefix)
// 2. Config file path from OTLP2ARROW_CONFIG
// 3. Config file contents from OTLP2ARROW_CONFIG_CONTENT
// 4. Default config file (./otlp2arrow.toml)
// 5. Built-in defaults

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

mod env_overrides;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

const DEFAULT_CONFIG_FILE: &str = "./otlp2arrow.toml";

/// Top-level configuration consumed by the signal builders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub logs: LogsConfig,

    #[serde(default)]
    pub traces: TracesConfig,

    /// Largest step allowed between consecutive primary row ids
    #[serde(default = "default_max_id_delta")]
    pub max_id_delta: u16,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub log: LogConfig,
}

fn default_max_id_delta() -> u16 {
    1
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            metrics: MetricsConfig::default(),
            logs: LogsConfig::default(),
            traces: TracesConfig::default(),
            max_id_delta: default_max_id_delta(),
            stats: StatsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub sort: MetricsSort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default)]
    pub sort: LogsSort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracesConfig {
    #[serde(default)]
    pub sort: TracesSort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Log per-batch distribution statistics after every build
    #[serde(default)]
    pub schema_stats: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Unsupported log format: {}. Supported: text, json", s),
        }
    }
}

/// Declares a sort-key enum with its config spelling
macro_rules! sort_key {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            /// Keep input order
            #[default]
            None,
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $name::None => "none",
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.to_lowercase().as_str() {
                    "none" => Ok($name::None),
                    $($text => Ok($name::$variant),)+
                    _ => anyhow::bail!(
                        "Unsupported {} value: {}. Supported: none, {}",
                        stringify!($name),
                        s,
                        [$($text),+].join(", ")
                    ),
                }
            }
        }
    };
}

sort_key!(
    /// Order of metrics within a scope
    MetricsSort { Name => "name", TypeName => "type_name" }
);
sort_key!(
    /// Order of log records within a scope
    LogsSort { Time => "time", Severity => "severity" }
);
sort_key!(
    /// Order of spans within a scope
    TracesSort { Name => "name", StartTime => "start_time" }
);

impl EncoderConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        let mut config = match load_from_file()? {
            Some(file_config) => file_config,
            None => EncoderConfig::default(),
        };
        config.apply_env_overrides_from(&StdEnvSource)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path (for the CLI `--config` flag)
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = read_config_file(path)?;
        config.apply_env_overrides_from(&StdEnvSource)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse inline TOML and layer overrides from a custom source
    pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<Self> {
        let mut config = match inline_config {
            Some(inline) => {
                toml::from_str(inline).context("Failed to parse inline config content")?
            }
            None => EncoderConfig::default(),
        };
        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_config(self)
    }
}

fn read_config_file(path: &Path) -> Result<EncoderConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn load_from_file() -> Result<Option<EncoderConfig>> {
    if let Ok(path) = env::var(format!("{ENV_PREFIX}CONFIG")) {
        return read_config_file(Path::new(&path)).map(Some);
    }

    if let Ok(content) = env::var(format!("{ENV_PREFIX}CONFIG_CONTENT")) {
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse inline config from {ENV_PREFIX}CONFIG_CONTENT"))?;
        return Ok(Some(config));
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return read_config_file(default_path).map(Some);
    }

    Ok(None)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EncoderConfig::default();
        assert_eq!(config.max_id_delta, 1);
        assert_eq!(config.metrics.sort, MetricsSort::None);
        assert!(!config.stats.schema_stats);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn parses_toml() {
        let config: EncoderConfig = toml::from_str(
            r#"
            max_id_delta = 4

            [metrics]
            sort = "type_name"

            [traces]
            sort = "start_time"

            [stats]
            schema_stats = true

            [log]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_id_delta, 4);
        assert_eq!(config.metrics.sort, MetricsSort::TypeName);
        assert_eq!(config.logs.sort, LogsSort::None);
        assert_eq!(config.traces.sort, TracesSort::StartTime);
        assert!(config.stats.schema_stats);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn sort_keys_parse() {
        assert_eq!("NAME".parse::<MetricsSort>().unwrap(), MetricsSort::Name);
        assert_eq!("severity".parse::<LogsSort>().unwrap(), LogsSort::Severity);
        let err = "duration".parse::<TracesSort>().unwrap_err();
        assert!(err.to_string().contains("none, name, start_time"));
        assert_eq!(MetricsSort::TypeName.to_string(), "type_name");
    }

    struct NoEnv;

    impl EnvSource for NoEnv {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn loaders_surface_invalid_values_as_config_errors() {
        let err = EncoderConfig::load_with_env(Some("max_id_delta = 0"), &NoEnv).unwrap_err();
        let source = err.downcast_ref::<crate::Error>().unwrap();
        assert!(matches!(source, crate::Error::Config { .. }));
        assert!(err.to_string().contains("max_id_delta must be greater than 0"));
    }

    #[test]
    fn read_config_file_parses_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otlp2arrow.toml");
        std::fs::write(&path, "[logs]\nsort = \"time\"\n").unwrap();

        let config = read_config_file(&path).unwrap();
        assert_eq!(config.logs.sort, LogsSort::Time);

        let missing = read_config_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read config file"));
    }
}
