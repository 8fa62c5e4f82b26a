use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::problem::{Minutes, ModelError, SeparationRules, MINUTES_PER_DAY};

/// Keeps the weighted throughput term of the objective within solver integers.
pub const MAX_THROUGHPUT_WEIGHT: i32 = 1000;

/// Tunables of the section optimizer. Read-only during a solve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub min_headway_minutes: Minutes,
    pub reduced_headway_minutes: Minutes,
    pub platform_separation_minutes: Minutes,
    pub max_deviation_minutes: Minutes,
    pub time_budget_seconds: f64,
    pub weather_min_delay_minutes: Minutes,
    pub add_delay_minutes: Minutes,
    pub throughput_weight: i32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            min_headway_minutes: 5,
            reduced_headway_minutes: 3,
            platform_separation_minutes: 10,
            max_deviation_minutes: 120,
            time_budget_seconds: 30.0,
            weather_min_delay_minutes: 10,
            add_delay_minutes: 20,
            throughput_weight: 10,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ModelError),
}

impl OptimizerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: OptimizerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |msg: String| Err(ModelError::InvalidConfig(msg));
        if self.min_headway_minutes < 0 || self.reduced_headway_minutes < 0 {
            return invalid("headways must not be negative".to_string());
        }
        if self.platform_separation_minutes < 0 {
            return invalid("platform separation must not be negative".to_string());
        }
        if !(1..=MINUTES_PER_DAY).contains(&self.max_deviation_minutes) {
            return invalid(format!(
                "deviation bound must be between 1 and {} minutes, got {}",
                MINUTES_PER_DAY,
                self.max_deviation_minutes
            ));
        }
        if Duration::try_from_secs_f64(self.time_budget_seconds).is_err() {
            return invalid(format!(
                "time budget must be a non-negative number of seconds, got {}",
                self.time_budget_seconds
            ));
        }
        if !(0..=MAX_THROUGHPUT_WEIGHT).contains(&self.throughput_weight) {
            return invalid(format!(
                "throughput weight must be between 0 and {}, got {}",
                MAX_THROUGHPUT_WEIGHT, self.throughput_weight
            ));
        }
        Ok(())
    }

    /// The solver budget. Budgets too large for a [`Duration`] never run out.
    pub fn time_budget(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_budget_seconds.max(0.0))
            .unwrap_or(Duration::MAX)
    }

    pub fn separation_rules(&self, min_headway: Minutes) -> SeparationRules {
        SeparationRules {
            min_headway,
            platform_separation: self.platform_separation_minutes,
            max_deviation: self.max_deviation_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = OptimizerConfig::from_json_str(r#"{ "min_headway_minutes": 4 }"#).unwrap();
        assert_eq!(config.min_headway_minutes, 4);
        assert_eq!(config.platform_separation_minutes, 10);
        assert_eq!(config.max_deviation_minutes, 120);
        assert_eq!(config.time_budget(), Duration::from_secs(30));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = OptimizerConfig::from_json_str(r#"{ "max_deviation_minutes": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ModelError::InvalidConfig(_))));

        let config = OptimizerConfig {
            time_budget_seconds: f64::NAN,
            ..OptimizerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = OptimizerConfig {
            max_deviation_minutes: MINUTES_PER_DAY + 1,
            ..OptimizerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = OptimizerConfig {
            min_headway_minutes: -1,
            ..OptimizerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn budget_too_large_for_a_duration_is_rejected() {
        let err =
            OptimizerConfig::from_json_str(r#"{ "time_budget_seconds": 1e20 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ModelError::InvalidConfig(_))));

        let config = OptimizerConfig {
            time_budget_seconds: 1e20,
            ..OptimizerConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.time_budget(), Duration::MAX);

        let config = OptimizerConfig {
            time_budget_seconds: -1.0,
            ..OptimizerConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.time_budget(), Duration::ZERO);
    }

    #[test]
    fn throughput_weight_is_bounded() {
        let config = OptimizerConfig {
            throughput_weight: MAX_THROUGHPUT_WEIGHT + 1,
            ..OptimizerConfig::default()
        };
        assert!(config.validate().is_err());
        let config = OptimizerConfig {
            throughput_weight: MAX_THROUGHPUT_WEIGHT,
            ..OptimizerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = OptimizerConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = OptimizerConfig::from_json_file("/nonexistent/sectionopt.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
