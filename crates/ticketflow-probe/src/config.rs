//! Probing controller configuration.
//!
//! Parsed from the `[probing]` table of a TOML file. Every field has a
//! default, so an empty table (or no table at all) yields the stock
//! controller:
//!
//! ```toml
//! [probing]
//! interval = "1s"
//! min_concurrency = 5
//! max_concurrency = 128
//! step_fraction = 0.1
//! noise_tolerance = 0.05
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_MIN_CONCURRENCY: u32 = 5;
pub const DEFAULT_MAX_CONCURRENCY: u32 = 128;
pub const DEFAULT_STEP_FRACTION: f64 = 0.1;
pub const DEFAULT_NOISE_TOLERANCE: f64 = 0.05;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables for the throughput probing controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbingConfig {
    /// Time between controller cycles. Fixed once the driver starts.
    #[serde(with = "duration_str")]
    pub interval: Duration,
    /// Lowest concurrency the controller will ever set.
    pub min_concurrency: u32,
    /// Highest concurrency the controller will ever set.
    pub max_concurrency: u32,
    /// Probe step as a fraction of the current level (at least one ticket).
    pub step_fraction: f64,
    /// Relative throughput change below which a difference is treated as noise.
    pub noise_tolerance: f64,
}

impl Default for ProbingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            min_concurrency: DEFAULT_MIN_CONCURRENCY,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            step_fraction: DEFAULT_STEP_FRACTION,
            noise_tolerance: DEFAULT_NOISE_TOLERANCE,
        }
    }
}

/// On-disk layout: the probing settings live under `[probing]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub probing: ProbingConfig,
}

impl ProbingConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let file: ConfigFile = toml::from_str(s)?;
        file.probing.validate()?;
        Ok(file.probing)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        let file = ConfigFile {
            probing: self.clone(),
        };
        toml::to_string_pretty(&file).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Reject settings the controller cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("interval must be non-zero".into()));
        }
        if self.min_concurrency == 0 {
            return Err(ConfigError::Invalid("min_concurrency must be at least 1".into()));
        }
        if self.min_concurrency > self.max_concurrency {
            return Err(ConfigError::Invalid(format!(
                "min_concurrency ({}) exceeds max_concurrency ({})",
                self.min_concurrency, self.max_concurrency
            )));
        }
        if !(self.step_fraction > 0.0 && self.step_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "step_fraction must be in (0, 1], got {}",
                self.step_fraction
            )));
        }
        if !(self.noise_tolerance >= 0.0 && self.noise_tolerance < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "noise_tolerance must be in [0, 1), got {}",
                self.noise_tolerance
            )));
        }
        Ok(())
    }

    pub fn bounds(&self) -> ConcurrencyBounds {
        ConcurrencyBounds {
            min: self.min_concurrency,
            max: self.max_concurrency,
        }
    }

    /// Tickets one probe moves away from `level`.
    pub fn step_size(&self, level: u32) -> u32 {
        ((level as f64 * self.step_fraction).round() as u32).max(1)
    }
}

/// Inclusive range every concurrency level is kept within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyBounds {
    pub min: u32,
    pub max: u32,
}

impl ConcurrencyBounds {
    pub fn clamp(&self, level: u32) -> u32 {
        level.clamp(self.min, self.max)
    }

    pub fn contains(&self, level: u32) -> bool {
        (self.min..=self.max).contains(&level)
    }
}

/// Parse a duration string like "250ms", "30s", "5m". A bare number is seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let invalid = || ConfigError::Invalid(format!("invalid duration '{s}'"));

    let parse = |n: &str| n.trim().parse::<u64>().map_err(|_| invalid());

    if let Some(ms) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(parse(ms)?))
    } else if let Some(secs) = s.strip_suffix('s') {
        Ok(Duration::from_secs(parse(secs)?))
    } else if let Some(mins) = s.strip_suffix('m') {
        Ok(Duration::from_secs(parse(mins)? * 60))
    } else {
        Ok(Duration::from_secs(parse(s)?))
    }
}

/// Render a duration in the shortest unit `parse_duration` reads back exactly.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 60_000 == 0 && ms > 0 {
        format!("{}m", ms / 60_000)
    } else if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_matches_defaults() {
        let config = ProbingConfig::from_toml_str(include_str!("../../../ticketflow.toml")).unwrap();
        assert_eq!(config, ProbingConfig::default());
    }

    #[test]
    fn defaults_are_valid() {
        let config = ProbingConfig::default();
        config.validate().unwrap();
        assert_eq!(config.bounds(), ConcurrencyBounds { min: 5, max: 128 });
        assert_eq!(config.interval, Duration::from_secs(1));
    }

    #[test]
    fn parse_empty_uses_defaults() {
        let config = ProbingConfig::from_toml_str("").unwrap();
        assert_eq!(config, ProbingConfig::default());
    }

    #[test]
    fn parse_partial_table() {
        let toml_str = r#"
[probing]
interval = "500ms"
max_concurrency = 64
noise_tolerance = 0.02
"#;
        let config = ProbingConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.interval, Duration::from_millis(500));
        assert_eq!(config.max_concurrency, 64);
        assert_eq!(config.min_concurrency, DEFAULT_MIN_CONCURRENCY);
        assert_eq!(config.noise_tolerance, 0.02);
    }

    #[test]
    fn toml_round_trip_preserves_values() {
        let config = ProbingConfig {
            interval: Duration::from_millis(250),
            min_concurrency: 2,
            max_concurrency: 16,
            step_fraction: 0.25,
            noise_tolerance: 0.1,
        };
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("interval = \"250ms\""));
        assert_eq!(ProbingConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let config = ProbingConfig {
            min_concurrency: 50,
            max_concurrency: 10,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_bad_tunables() {
        let zero_min = ProbingConfig {
            min_concurrency: 0,
            ..Default::default()
        };
        let zero_step = ProbingConfig {
            step_fraction: 0.0,
            ..Default::default()
        };
        let huge_noise = ProbingConfig {
            noise_tolerance: 1.0,
            ..Default::default()
        };
        let nan_noise = ProbingConfig {
            noise_tolerance: f64::NAN,
            ..Default::default()
        };
        let zero_interval = ProbingConfig {
            interval: Duration::ZERO,
            ..Default::default()
        };

        for config in [zero_min, zero_step, huge_noise, nan_noise, zero_interval] {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }

    #[test]
    fn from_toml_str_rejects_invalid_values() {
        let toml_str = "[probing]\nmin_concurrency = 0\n";
        assert!(matches!(
            ProbingConfig::from_toml_str(toml_str),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ProbingConfig::from_toml_str("[probing]\ninterval = \"soon\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = ProbingConfig::from_file(Path::new("/nonexistent/ticketflow.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn step_size_is_fraction_of_level_with_floor() {
        let config = ProbingConfig::default();
        assert_eq!(config.step_size(5), 1);
        assert_eq!(config.step_size(20), 2);
        assert_eq!(config.step_size(35), 4);
        assert_eq!(config.step_size(128), 13);
    }

    #[test]
    fn bounds_clamp() {
        let bounds = ConcurrencyBounds { min: 5, max: 128 };
        assert_eq!(bounds.clamp(1), 5);
        assert_eq!(bounds.clamp(40), 40);
        assert_eq!(bounds.clamp(500), 128);
        assert!(!bounds.contains(129));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
        assert!(parse_duration("fast").is_err());
    }

    #[test]
    fn format_duration_values() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(1)), "1s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
    }
}
