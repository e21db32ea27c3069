use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::confidence::ConfidenceThresholds;
use crate::detection::TableLayout;
use crate::error::ConfigError;
use crate::metrics::AccuracyLimits;

/// Application directory name under the platform config dir
pub const APP_DIR: &str = "TableWatch";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Consecutive failures of one detector kind before degrading one level
    pub failure_threshold: u32,
    /// Time in the current mode before a success may promote one level
    pub recovery_timeout_ms: u64,
    /// Capture attempts per cycle before the failure counts against the pipeline
    pub capture_retry_limit: u32,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout_ms: 60_000,
            capture_retry_limit: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub interval_ms: u64,
    pub max_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            max_size: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 2000,
            capacity: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracyConfig {
    pub window_size: usize,
    pub min_success_rate: f64,
    pub min_avg_confidence: f64,
    pub min_samples: usize,
    pub alert_cooldown_ms: u64,
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        Self {
            window_size: 1000,
            min_success_rate: 0.90,
            min_avg_confidence: 0.70,
            min_samples: 20,
            alert_cooldown_ms: 30_000,
        }
    }
}

impl AccuracyConfig {
    pub fn limits(&self) -> AccuracyLimits {
        AccuracyLimits {
            window_size: self.window_size,
            min_success_rate: self.min_success_rate,
            min_avg_confidence: self.min_avg_confidence,
            min_samples: self.min_samples,
            alert_cooldown: Duration::from_millis(self.alert_cooldown_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Target time between capture cycles
    pub interval_ms: u64,
    /// Budget for one detector call
    pub detector_timeout_ms: u64,
    /// Publish a performance snapshot every N cycles (0 disables)
    pub performance_every_cycles: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            detector_timeout_ms: 500,
            performance_every_cycles: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Numeric changes at or below this are not changes
    pub numeric_tolerance: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            numeric_tolerance: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Batches buffered per channel subscriber
    pub buffer: usize,
    pub max_consecutive_failures: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            buffer: 64,
            max_consecutive_failures: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Extra title patterns to exclude (regex, matched against the normalized title)
    pub extra_exclusions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract data directory; system default when unset
    pub tessdata_path: Option<String>,
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tessdata_path: None,
            language: "eng".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub thresholds: ConfidenceThresholds,
    pub degradation: DegradationConfig,
    pub queue: QueueConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
    pub accuracy: AccuracyConfig,
    pub cycle: CycleConfig,
    pub tracker: TrackerConfig,
    pub subscriber: SubscriberConfig,
    pub classifier: ClassifierConfig,
    pub ocr: OcrConfig,
    pub layout: TableLayout,
}

impl Config {
    /// Load configuration from the platform-specific config directory.
    /// Creates default config if file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            tracing::info!("✓ Created default config at: {}", config_path.display());
            Ok(config)
        }
    }

    /// Load and validate a config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let load_failed = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source,
        };

        let content = fs::read_to_string(path).map_err(|e| load_failed(Box::new(e)))?;
        let config: Config = serde_json::from_str(&content).map_err(|e| load_failed(Box::new(e)))?;
        config.validate()?;

        tracing::info!("✓ Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::DirectoryCreationFailed {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let save_failed = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| save_failed(Box::new(e)))?;
        fs::write(path, json).map_err(|e| save_failed(Box::new(e)))
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    /// `<config dir>/TableWatch`
    pub fn app_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(ConfigError::NoConfigDirectory)
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::app_dir()?.join("config.json"))
    }

    pub fn log_dir() -> Result<PathBuf, ConfigError> {
        Ok(Self::app_dir()?.join("logs"))
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;

        let nonzero = [
            ("queue.capacity", self.queue.capacity as u64),
            ("batch.interval_ms", self.batch.interval_ms),
            ("batch.max_size", self.batch.max_size as u64),
            ("cache.ttl_ms", self.cache.ttl_ms),
            ("cache.capacity", self.cache.capacity as u64),
            ("accuracy.window_size", self.accuracy.window_size as u64),
            ("cycle.interval_ms", self.cycle.interval_ms),
            ("cycle.detector_timeout_ms", self.cycle.detector_timeout_ms),
            ("degradation.failure_threshold", u64::from(self.degradation.failure_threshold)),
            ("degradation.capture_retry_limit", u64::from(self.degradation.capture_retry_limit)),
            ("subscriber.buffer", self.subscriber.buffer as u64),
            (
                "subscriber.max_consecutive_failures",
                self.subscriber.max_consecutive_failures as u64,
            ),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
        }

        for (name, rate) in [
            ("accuracy.min_success_rate", self.accuracy.min_success_rate),
            ("accuracy.min_avg_confidence", self.accuracy.min_avg_confidence),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::Invalid(format!("{} must lie in [0, 1], got {}", name, rate)));
            }
        }

        if !self.tracker.numeric_tolerance.is_finite() || self.tracker.numeric_tolerance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "tracker.numeric_tolerance must be a non-negative number, got {}",
                self.tracker.numeric_tolerance
            )));
        }

        self.layout
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("layout: {}", e)))
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.degradation.recovery_timeout_ms)
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle.detector_timeout_ms)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle.interval_ms)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch.interval_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache.ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::Threshold;
    use crate::detection::DetectorKind;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("table-watch-config-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.degradation.failure_threshold, 3);
        assert_eq!(config.recovery_timeout(), Duration::from_secs(60));
        assert_eq!(config.queue.capacity, 256);
        assert_eq!(config.batch.max_size, 50);
        assert_eq!(config.cache_ttl(), Duration::from_secs(2));
        assert_eq!(config.accuracy.window_size, 1000);
        assert_eq!(config.tracker.numeric_tolerance, 0.01);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("config.json");
        let mut config = Config::default();
        config.queue.capacity = 512;
        config.thresholds.set(DetectorKind::Pot, Threshold::new(0.5, 0.8));

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        if let Some(dir) = path.parent() {
            fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{ "queue": { "capacity": 10 } }"#).unwrap();
        assert_eq!(config.queue.capacity, 10);
        assert_eq!(config.batch.interval_ms, 100);
        assert_eq!(config.thresholds, ConfidenceThresholds::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.queue.capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.thresholds.set(DetectorKind::Card, Threshold::new(0.9, 0.7));
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.accuracy.min_success_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_is_load_error() {
        let path = temp_path("broken.json");
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).unwrap();
        }
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));

        if let Some(dir) = path.parent() {
            fs::remove_dir_all(dir).ok();
        }
    }
}
