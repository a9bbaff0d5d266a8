use crate::utils::error::{EngineError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_min_latitude")]
    pub min_latitude: f64,
    #[serde(default = "default_max_latitude")]
    pub max_latitude: f64,
    #[serde(default = "default_min_longitude")]
    pub min_longitude: f64,
    #[serde(default = "default_max_longitude")]
    pub max_longitude: f64,
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    #[serde(default = "default_confidence_ceiling")]
    pub confidence_ceiling: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    pub api_key: Option<String>,
    pub instructions_path: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Minimum spacing between AI requests across all workers.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_cycle_deadline_seconds")]
    pub cycle_deadline_seconds: u64,
    #[serde(default = "default_dedup_window_minutes")]
    pub dedup_window_minutes: i64,
    /// Messages older than this are ignored before parsing.
    #[serde(default = "default_dedup_window_minutes")]
    pub message_window_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default = "default_output_filename")]
    pub filename: String,
}

fn default_database_url() -> String {
    "sqlite://db/cities_coordinates.db".to_string()
}
fn default_pool_size() -> u32 {
    5
}
fn default_acquire_timeout_seconds() -> u64 {
    10
}
fn default_min_latitude() -> f64 {
    44.0
}
fn default_max_latitude() -> f64 {
    52.5
}
fn default_min_longitude() -> f64 {
    22.0
}
fn default_max_longitude() -> f64 {
    40.5
}
fn default_confidence_floor() -> f64 {
    0.8
}
fn default_confidence_ceiling() -> f64 {
    0.99
}
fn default_ai_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_ai_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_request_timeout_seconds() -> u64 {
    30
}
fn default_min_interval_ms() -> u64 {
    2000
}
fn default_workers() -> usize {
    2
}
fn default_cycle_deadline_seconds() -> u64 {
    120
}
fn default_dedup_window_minutes() -> i64 {
    20
}
fn default_output_path() -> String {
    "./output".to_string()
}
fn default_output_filename() -> String {
    "cycle.json".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_pool_size(),
            acquire_timeout_seconds: default_acquire_timeout_seconds(),
        }
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_latitude: default_min_latitude(),
            max_latitude: default_max_latitude(),
            min_longitude: default_min_longitude(),
            max_longitude: default_max_longitude(),
            confidence_floor: default_confidence_floor(),
            confidence_ceiling: default_confidence_ceiling(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ai_endpoint(),
            model: default_ai_model(),
            api_key: None,
            instructions_path: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_seconds: default_request_timeout_seconds(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            cycle_deadline_seconds: default_cycle_deadline_seconds(),
            dedup_window_minutes: default_dedup_window_minutes(),
            message_window_minutes: default_dedup_window_minutes(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            filename: default_output_filename(),
        }
    }
}

impl StoreConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

impl AiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl ResolutionConfig {
    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs(self.cycle_deadline_seconds)
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.dedup_window_minutes)
    }

    pub fn message_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.message_window_minutes)
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EngineError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Parses TOML after `${VAR}` substitution.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EngineError::Config {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${API_KEY}` style references with environment values. Unset
    /// variables are left as written so validation can point at them.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EngineError::Config {
            message: format!("env substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_database_url("store.database_url", &self.store.database_url)?;
        validation::validate_positive_number("store.pool_size", self.store.pool_size as usize, 1)?;
        validation::validate_positive_number(
            "store.acquire_timeout_seconds",
            self.store.acquire_timeout_seconds as usize,
            1,
        )?;

        validation::validate_ordered(
            "validator.latitude",
            self.validator.min_latitude,
            self.validator.max_latitude,
        )?;
        validation::validate_ordered(
            "validator.longitude",
            self.validator.min_longitude,
            self.validator.max_longitude,
        )?;
        validation::validate_range(
            "validator.confidence_floor",
            self.validator.confidence_floor,
            0.0,
            1.0,
        )?;
        validation::validate_range(
            "validator.confidence_ceiling",
            self.validator.confidence_ceiling,
            self.validator.confidence_floor,
            1.0,
        )?;

        validation::validate_url("ai.endpoint", &self.ai.endpoint)?;
        validation::validate_non_empty_string("ai.model", &self.ai.model)?;
        let api_key = validation::validate_required_field("ai.api_key", &self.ai.api_key)?;
        if api_key.starts_with("${") {
            return Err(EngineError::MissingConfig {
                field: format!("ai.api_key (environment variable {} is not set)", api_key),
            });
        }
        validation::validate_range("ai.max_retries", self.ai.max_retries, 0, 10)?;

        validation::validate_positive_number("resolution.workers", self.resolution.workers, 1)?;
        validation::validate_positive_number(
            "resolution.cycle_deadline_seconds",
            self.resolution.cycle_deadline_seconds as usize,
            1,
        )?;
        validation::validate_range(
            "resolution.dedup_window_minutes",
            self.resolution.dedup_window_minutes,
            1,
            24 * 60,
        )?;
        validation::validate_range(
            "resolution.message_window_minutes",
            self.resolution.message_window_minutes,
            1,
            24 * 60,
        )?;

        validation::validate_path("output.output_path", &self.output.output_path)?;
        validation::validate_non_empty_string("output.filename", &self.output.filename)?;

        Ok(())
    }
}

impl Validate for EngineConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[ai]
api_key = "test-key"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = EngineConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.store.database_url, "sqlite://db/cities_coordinates.db");
        assert_eq!(config.store.pool_size, 5);
        assert_eq!(config.validator, ValidatorConfig::default());
        assert_eq!(config.validator.confidence_floor, 0.8);
        assert_eq!(config.ai.model, "gemini-2.0-flash-lite");
        assert_eq!(config.ai.max_retries, 2);
        assert_eq!(config.ai.min_interval(), Duration::from_secs(2));
        assert_eq!(config.resolution.workers, 2);
        assert_eq!(config.resolution.dedup_window(), chrono::Duration::minutes(20));
        assert_eq!(config.output.filename, "cycle.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[store]
database_url = "sqlite://coords.db"
pool_size = 3
acquire_timeout_seconds = 2

[validator]
confidence_floor = 0.85

[ai]
endpoint = "http://127.0.0.1:9000/v1beta"
model = "gemini-test"
api_key = "k"
max_retries = 1
retry_delay_ms = 10
min_interval_ms = 0

[resolution]
workers = 4
cycle_deadline_seconds = 30
dedup_window_minutes = 15

[output]
output_path = "./out"
"#;

        let config = EngineConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.store.pool_size, 3);
        assert_eq!(config.store.acquire_timeout(), Duration::from_secs(2));
        assert_eq!(config.validator.confidence_floor, 0.85);
        assert_eq!(config.validator.max_latitude, 52.5);
        assert_eq!(config.ai.retry_delay(), Duration::from_millis(10));
        assert!(config.ai.min_interval().is_zero());
        assert_eq!(config.resolution.workers, 4);
        assert_eq!(config.output.output_path, "./out");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("ALERT_GEOCODER_TEST_KEY", "secret-from-env");

        let toml_content = r#"
[ai]
api_key = "${ALERT_GEOCODER_TEST_KEY}"
"#;

        let config = EngineConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.ai.api_key.as_deref(), Some("secret-from-env"));

        std::env::remove_var("ALERT_GEOCODER_TEST_KEY");
    }

    #[test]
    fn test_unset_env_var_fails_validation() {
        let toml_content = r#"
[ai]
api_key = "${ALERT_GEOCODER_DEFINITELY_UNSET}"
"#;

        let config = EngineConfig::from_toml_str(toml_content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(EngineError::MissingConfig { .. })
        ));
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let bad_endpoint = r#"
[ai]
api_key = "k"
endpoint = "invalid-url"
"#;
        assert!(EngineConfig::from_toml_str(bad_endpoint).unwrap().validate().is_err());

        let bad_workers = r#"
[ai]
api_key = "k"

[resolution]
workers = 0
"#;
        assert!(EngineConfig::from_toml_str(bad_workers).unwrap().validate().is_err());

        let inverted_box = r#"
[ai]
api_key = "k"

[validator]
min_latitude = 53.0
"#;
        assert!(EngineConfig::from_toml_str(inverted_box).unwrap().validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = EngineConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.ai.api_key.as_deref(), Some("test-key"));
    }
}
