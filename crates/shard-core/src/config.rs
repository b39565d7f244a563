//! shardd.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Direction;

pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_METRICS_PERIOD_SECS: i64 = 180;
pub const DEFAULT_HWM: f64 = 75.0;
pub const DEFAULT_LWM: f64 = 30.0;
/// 1 MiB per shard.
pub const DEFAULT_INPUT_PER_SHARD: u64 = 1024 * 1024;
/// 2 MiB per shard.
pub const DEFAULT_OUTPUT_PER_SHARD: u64 = 2 * 1024 * 1024;

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("stream name must not be empty")]
    EmptyStreamName,

    #[error("check interval must be at least one second")]
    ZeroInterval,

    #[error("{direction} thresholds out of range: lwm={lwm}, hwm={hwm} (need 0 <= lwm < hwm <= 100)")]
    Thresholds { direction: Direction, lwm: f64, hwm: f64 },

    #[error("{direction} per-shard capacity must be greater than zero")]
    ZeroCapacity { direction: Direction },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub stream: StreamConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub capacity: CapacityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Seconds to sleep between ticks.
    pub check_interval_secs: u64,
    /// Requested metric window; normalized to a multiple of 60 before use.
    pub metrics_period_secs: i64,
    /// Log actions instead of issuing them.
    pub dry_run: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            metrics_period_secs: DEFAULT_METRICS_PERIOD_SECS,
            dry_run: false,
        }
    }
}

/// High/low water marks, as utilization percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub input_hwm: f64,
    pub output_hwm: f64,
    pub input_lwm: f64,
    pub output_lwm: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            input_hwm: DEFAULT_HWM,
            output_hwm: DEFAULT_HWM,
            input_lwm: DEFAULT_LWM,
            output_lwm: DEFAULT_LWM,
        }
    }
}

impl ThresholdConfig {
    pub fn hwm(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Input => self.input_hwm,
            Direction::Output => self.output_hwm,
        }
    }

    pub fn lwm(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Input => self.input_lwm,
            Direction::Output => self.output_lwm,
        }
    }
}

/// Bytes per window a single shard can absorb, per direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub input_per_shard: u64,
    pub output_per_shard: u64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            input_per_shard: DEFAULT_INPUT_PER_SHARD,
            output_per_shard: DEFAULT_OUTPUT_PER_SHARD,
        }
    }
}

impl CapacityConfig {
    pub fn per_shard(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Input => self.input_per_shard,
            Direction::Output => self.output_per_shard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ShardConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ShardConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a config for the given stream with every default spelled out.
    pub fn scaffold(stream: &str, region: Option<&str>) -> Self {
        ShardConfig {
            stream: StreamConfig {
                name: stream.to_string(),
                region: region.map(str::to_string),
            },
            controller: ControllerConfig::default(),
            thresholds: ThresholdConfig::default(),
            capacity: CapacityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.name.trim().is_empty() {
            return Err(ConfigError::EmptyStreamName);
        }
        if self.controller.check_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        for direction in Direction::ALL {
            let lwm = self.thresholds.lwm(direction);
            let hwm = self.thresholds.hwm(direction);
            if !(0.0..=100.0).contains(&lwm) || !(0.0..=100.0).contains(&hwm) || lwm >= hwm {
                return Err(ConfigError::Thresholds { direction, lwm, hwm });
            }
            if self.capacity.per_shard(direction) == 0 {
                return Err(ConfigError::ZeroCapacity { direction });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_scaffold() {
        let config = ShardConfig::scaffold("events", Some("us-east-1"));
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("events"));
        assert!(toml_str.contains("us-east-1"));
        assert!(toml_str.contains("input_hwm = 75.0"));
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
[stream]
name = "events"
"#;
        let config: ShardConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.stream.name, "events");
        assert_eq!(config.controller.check_interval_secs, 60);
        assert_eq!(config.controller.metrics_period_secs, 180);
        assert_eq!(config.thresholds.hwm(Direction::Output), 75.0);
        assert_eq!(config.thresholds.lwm(Direction::Input), 30.0);
        assert_eq!(config.capacity.per_shard(Direction::Input), 1_048_576);
        assert_eq!(config.capacity.per_shard(Direction::Output), 2_097_152);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let toml_str = r#"
[stream]
name = "events"

[thresholds]
input_hwm = 80.0
"#;
        let config: ShardConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.thresholds.input_hwm, 80.0);
        assert_eq!(config.thresholds.output_hwm, 75.0);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = ShardConfig::scaffold("events", None);
        config.thresholds.output_lwm = 90.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Thresholds {
                direction: Direction::Output,
                lwm: 90.0,
                hwm: 75.0,
            })
        );
    }

    #[test]
    fn test_rejects_zero_capacity_and_interval() {
        let mut config = ShardConfig::scaffold("events", None);
        config.capacity.input_per_shard = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroCapacity {
                direction: Direction::Input
            })
        );

        let mut config = ShardConfig::scaffold("events", None);
        config.controller.check_interval_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[stream]\nname = \"clicks\"\n\n[controller]\ncheck_interval_secs = 300\ndry_run = true"
        )
        .unwrap();

        let config = ShardConfig::from_file(file.path()).unwrap();
        assert_eq!(config.stream.name, "clicks");
        assert_eq!(config.controller.check_interval_secs, 300);
        assert!(config.controller.dry_run);
    }

    #[test]
    fn test_from_file_rejects_empty_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[stream]\nname = \"\"").unwrap();
        assert!(ShardConfig::from_file(file.path()).is_err());
    }
}
