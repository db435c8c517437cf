//! Application configuration.
//!
//! Values come from an optional YAML file and are then overridden field by
//! field from `PALLETIZER_*` environment variables. Invalid overrides are
//! reported and ignored, keeping the file or default value.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::PalletCapacity;
use crate::optimizer::{Heuristic, PackingConfig};
use crate::placement::WasteMetric;
use crate::scoring::StabilityPolicy;

pub const CONFIG_PATH_VAR: &str = "PALLETIZER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default_config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pallet: PalletCapacity,
    pub conveyor: ConveyorConfig,
    pub run: RunConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConveyorConfig {
    /// Seconds between two box arrivals.
    pub interval_seconds: f64,
    pub input_file: PathBuf,
}

impl ConveyorConfig {
    pub const DEFAULT_INTERVAL_SECONDS: f64 = 2.0;
    pub const DEFAULT_INPUT_FILE: &'static str = "data/boxes.csv";

    /// Pause between arrivals. Values a `Duration` cannot hold fall back
    /// to the default interval.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_seconds).unwrap_or_else(|_| {
            warn!(
                interval_seconds = self.interval_seconds,
                "unrepresentable conveyor interval, using default"
            );
            Duration::from_secs_f64(Self::DEFAULT_INTERVAL_SECONDS)
        })
    }
}

/// Non-negative and small enough for a `Duration`.
fn is_valid_interval(seconds: f64) -> bool {
    Duration::try_from_secs_f64(seconds).is_ok()
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: Self::DEFAULT_INTERVAL_SECONDS,
            input_file: PathBuf::from(Self::DEFAULT_INPUT_FILE),
        }
    }
}

/// Settings of a single run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Heuristic name, e.g. `first-fit` or `best-fit-lookahead`.
    pub heuristic: String,
    /// Boxes peeked by the lookahead heuristic.
    pub lookahead: usize,
    pub stability_policy: StabilityPolicy,
    pub waste_metric: WasteMetric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    /// Run every heuristic and print a comparison instead of the conveyor.
    pub compare: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            heuristic: Heuristic::default().name().to_string(),
            lookahead: Heuristic::DEFAULT_LOOKAHEAD,
            stability_policy: StabilityPolicy::default(),
            waste_metric: WasteMetric::default(),
            report_path: None,
            compare: false,
        }
    }
}

impl AppConfig {
    const PALLET_MAX_WIDTH_VAR: &'static str = "PALLETIZER_PALLET_MAX_WIDTH";
    const PALLET_MAX_LENGTH_VAR: &'static str = "PALLETIZER_PALLET_MAX_LENGTH";
    const PALLET_MAX_HEIGHT_VAR: &'static str = "PALLETIZER_PALLET_MAX_HEIGHT";
    const PALLET_MAX_WEIGHT_VAR: &'static str = "PALLETIZER_PALLET_MAX_WEIGHT";
    const INTERVAL_VAR: &'static str = "PALLETIZER_CONVEYOR_INTERVAL_SECONDS";
    const INPUT_FILE_VAR: &'static str = "PALLETIZER_INPUT_FILE";
    const HEURISTIC_VAR: &'static str = "PALLETIZER_HEURISTIC";
    const LOOKAHEAD_VAR: &'static str = "PALLETIZER_LOOKAHEAD";
    const STABILITY_POLICY_VAR: &'static str = "PALLETIZER_STABILITY_POLICY";
    const WASTE_METRIC_VAR: &'static str = "PALLETIZER_WASTE_METRIC";
    const REPORT_PATH_VAR: &'static str = "PALLETIZER_REPORT_PATH";
    const COMPARE_VAR: &'static str = "PALLETIZER_COMPARE";

    /// Loads the YAML file at `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(s)?)
    }

    /// Writes the configuration as YAML, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Loads the file named by `PALLETIZER_CONFIG` (or the default path),
    /// applies environment overrides and validates the result.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env_string(CONFIG_PATH_VAR).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(path)?;
        config.apply_env_overrides(env_string);
        config.validate()?;
        Ok(config)
    }

    /// Overrides single fields from `lookup`, normally the process
    /// environment.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let positive = |value: f64| value > 0.0 && value.is_finite();
        self.pallet.max_width = load_f64_with_warning(
            &lookup,
            Self::PALLET_MAX_WIDTH_VAR,
            self.pallet.max_width,
            positive,
            "must be greater than 0",
        );
        self.pallet.max_length = load_f64_with_warning(
            &lookup,
            Self::PALLET_MAX_LENGTH_VAR,
            self.pallet.max_length,
            positive,
            "must be greater than 0",
        );
        self.pallet.max_height = load_f64_with_warning(
            &lookup,
            Self::PALLET_MAX_HEIGHT_VAR,
            self.pallet.max_height,
            positive,
            "must be greater than 0",
        );
        self.pallet.max_weight = load_f64_with_warning(
            &lookup,
            Self::PALLET_MAX_WEIGHT_VAR,
            self.pallet.max_weight,
            positive,
            "must be greater than 0",
        );
        self.conveyor.interval_seconds = load_f64_with_warning(
            &lookup,
            Self::INTERVAL_VAR,
            self.conveyor.interval_seconds,
            is_valid_interval,
            "must be a non-negative number of seconds",
        );

        if let Some(path) = lookup(Self::INPUT_FILE_VAR) {
            self.conveyor.input_file = PathBuf::from(path);
        }
        if let Some(raw) = lookup(Self::HEURISTIC_VAR) {
            match raw.parse::<Heuristic>() {
                Ok(heuristic) => self.run.heuristic = heuristic.name().to_string(),
                Err(err) => warn!(var = Self::HEURISTIC_VAR, error = %err, "ignoring override"),
            }
        }
        if let Some(raw) = lookup(Self::LOOKAHEAD_VAR) {
            match raw.parse::<usize>() {
                Ok(value) => self.run.lookahead = value,
                Err(err) => warn!(
                    var = Self::LOOKAHEAD_VAR,
                    value = %raw,
                    error = %err,
                    "ignoring override"
                ),
            }
        }
        if let Some(raw) = lookup(Self::STABILITY_POLICY_VAR) {
            match raw.parse::<StabilityPolicy>() {
                Ok(policy) => self.run.stability_policy = policy,
                Err(err) => {
                    warn!(var = Self::STABILITY_POLICY_VAR, error = %err, "ignoring override")
                }
            }
        }
        if let Some(raw) = lookup(Self::WASTE_METRIC_VAR) {
            match raw.parse::<WasteMetric>() {
                Ok(metric) => self.run.waste_metric = metric,
                Err(err) => warn!(var = Self::WASTE_METRIC_VAR, error = %err, "ignoring override"),
            }
        }
        if let Some(path) = lookup(Self::REPORT_PATH_VAR) {
            self.run.report_path = Some(PathBuf::from(path));
        }
        if let Some(compare) = lookup(Self::COMPARE_VAR)
            .and_then(|raw| parse_bool(&raw, Self::COMPARE_VAR))
        {
            self.run.compare = compare;
        }
    }

    /// Checks pallet bounds, pacing and the heuristic name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pallet
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if !is_valid_interval(self.conveyor.interval_seconds) {
            return Err(ConfigError::Invalid(format!(
                "conveyor.interval_seconds must be a non-negative number of seconds, got: {}",
                self.conveyor.interval_seconds
            )));
        }
        self.heuristic()?;
        Ok(())
    }

    /// The configured heuristic with the configured lookahead count.
    pub fn heuristic(&self) -> Result<Heuristic, ConfigError> {
        self.run
            .heuristic
            .parse::<Heuristic>()
            .map(|h| h.with_lookahead(self.run.lookahead))
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Packing parameters for one run.
    pub fn packing_config(&self) -> PackingConfig {
        PackingConfig::builder()
            .capacity(self.pallet)
            .stability_policy(self.run.stability_policy)
            .waste_metric(self.run.waste_metric)
            .build()
    }
}

/// Reads a non-empty, trimmed environment variable.
pub fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(var = name, error = %err, "environment access failed, using default value");
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                var = var_name,
                value = other,
                "could not interpret as boolean, using default value"
            );
            None
        }
    }
}

fn load_f64_with_warning(
    lookup: impl Fn(&str) -> Option<String>,
    var_name: &str,
    current: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
) -> f64 {
    match lookup(var_name) {
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(value) if validator(value) => {
                if (value - current).abs() > current.abs().max(1.0) * 1e-9 {
                    info!(var = var_name, value, "configuration override");
                }
                value
            }
            Ok(_) => {
                warn!(
                    var = var_name,
                    value = %raw,
                    hint = invalid_hint,
                    fallback = current,
                    "invalid value"
                );
                current
            }
            Err(err) => {
                warn!(
                    var = var_name,
                    value = %raw,
                    error = %err,
                    fallback = current,
                    "could not parse number"
                );
                current
            }
        },
        None => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.pallet, PalletCapacity::new(120.0, 100.0, 200.0, 1000.0).unwrap());
        assert_eq!(config.conveyor.interval_seconds, 2.0);
        assert_eq!(config.conveyor.input_file, PathBuf::from("data/boxes.csv"));
        assert_eq!(config.run.heuristic, "first-fit");
        assert_eq!(config.run.lookahead, 3);
        assert_eq!(config.run.stability_policy, StabilityPolicy::Additive);
        assert_eq!(config.run.waste_metric, WasteMetric::Legacy);
        assert!(!config.run.compare);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "\
pallet:
  max_width: 100
  max_length: 100
  max_height: 150
  max_weight: 800
run:
  heuristic: best-fit-lookahead
  lookahead: 5
  waste_metric: corner-distance
";
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.pallet.max_weight, 800.0);
        assert_eq!(config.conveyor, ConveyorConfig::default());
        assert_eq!(config.run.waste_metric, WasteMetric::CornerDistance);
        assert_eq!(
            config.heuristic().unwrap(),
            Heuristic::BestFitLookahead { lookahead: 5 }
        );
        assert_eq!(config.packing_config().capacity.max_height, 150.0);
    }

    #[test]
    fn save_and_load_keep_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config").join("palletizer.yaml");
        let mut config = AppConfig::default();
        config.conveyor.interval_seconds = 0.5;
        config.run.heuristic = "guillotine".to_string();
        config.run.report_path = Some(PathBuf::from("out/report.json"));
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn oversized_interval_is_rejected() {
        let config = AppConfig::from_yaml_str("conveyor:\n  interval_seconds: 1.0e20").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(
            config.conveyor.interval(),
            Duration::from_secs_f64(ConveyorConfig::DEFAULT_INTERVAL_SECONDS)
        );

        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup_from(&[(
            "PALLETIZER_CONVEYOR_INTERVAL_SECONDS",
            "1e20",
        )]));
        assert_eq!(config.conveyor.interval_seconds, ConveyorConfig::DEFAULT_INTERVAL_SECONDS);
        assert!(config.validate().is_ok());

        let zero = AppConfig::from_yaml_str("conveyor:\n  interval_seconds: 0.0").unwrap();
        assert!(zero.validate().is_ok());
        assert_eq!(zero.conveyor.interval(), Duration::ZERO);
    }

    #[test]
    fn broken_yaml_is_an_error() {
        let err = AppConfig::from_yaml_str("pallet: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn env_overrides_replace_fields() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup_from(&[
            ("PALLETIZER_PALLET_MAX_WEIGHT", "750"),
            ("PALLETIZER_CONVEYOR_INTERVAL_SECONDS", "0"),
            ("PALLETIZER_HEURISTIC", "BFD"),
            ("PALLETIZER_STABILITY_POLICY", "multiplicative"),
            ("PALLETIZER_WASTE_METRIC", "corner_distance"),
            ("PALLETIZER_REPORT_PATH", "out/run.json"),
            ("PALLETIZER_COMPARE", "yes"),
            ("PALLETIZER_INPUT_FILE", "boxes.csv"),
        ]));

        assert_eq!(config.pallet.max_weight, 750.0);
        assert_eq!(config.conveyor.interval(), Duration::ZERO);
        assert_eq!(config.run.heuristic, "best-fit-decreasing");
        assert_eq!(config.run.stability_policy, StabilityPolicy::Multiplicative);
        assert_eq!(config.run.waste_metric, WasteMetric::CornerDistance);
        assert_eq!(config.run.report_path, Some(PathBuf::from("out/run.json")));
        assert!(config.run.compare);
        assert_eq!(config.conveyor.input_file, PathBuf::from("boxes.csv"));
    }

    #[test]
    fn invalid_env_overrides_keep_previous_values() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup_from(&[
            ("PALLETIZER_PALLET_MAX_WIDTH", "-1"),
            ("PALLETIZER_PALLET_MAX_HEIGHT", "tall"),
            ("PALLETIZER_HEURISTIC", "worst-fit"),
            ("PALLETIZER_LOOKAHEAD", "-2"),
            ("PALLETIZER_COMPARE", "maybe"),
        ]));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn validation_rejects_bad_file_values() {
        let config = AppConfig::from_yaml_str("run:\n  heuristic: worst-fit\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = AppConfig::from_yaml_str(
            "pallet:\n  max_width: 0\n  max_length: 1\n  max_height: 1\n  max_weight: 1\n",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_bool_values() {
        for raw in ["1", "true", "YES", " y ", "On"] {
            assert_eq!(parse_bool(raw, "TEST_VAR"), Some(true), "{raw}");
        }
        for raw in ["0", "false", "No", " n ", "OFF"] {
            assert_eq!(parse_bool(raw, "TEST_VAR"), Some(false), "{raw}");
        }
        for raw in ["invalid", "2", "", "  "] {
            assert_eq!(parse_bool(raw, "TEST_VAR"), None, "{raw}");
        }
    }
}
