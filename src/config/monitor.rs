//! Scheduler, cache and monitor configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::ConfigError;

/// Environment variable prefix used by [`MonitorConfig::from_env`].
pub const ENV_PREFIX: &str = "SOURCE_POLLER_";

const fn default_cpu_percentage() -> u32 {
    60
}

const fn default_compaction_threshold() -> usize {
    100
}

const fn default_max_queue_depth() -> usize {
    10_000
}

const fn default_cache_capacity() -> usize {
    80
}

const fn default_low_water_mark() -> usize {
    20
}

const fn default_items_per_request() -> usize {
    100
}

const fn default_show_top_posts() -> usize {
    10
}

/// Parse `raw` when present, otherwise return `default`.
fn parse_or<T: std::str::FromStr>(
    name: &str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    raw.map_or(Ok(default), |v| {
        v.trim()
            .parse()
            .map_err(|_| ConfigError::Parse(format!("{ENV_PREFIX}{name}: `{v}`")))
    })
}

/// Task scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Share of available hardware parallelism used as the concurrency limit, in percent.
    #[serde(default = "default_cpu_percentage")]
    pub cpu_percentage: u32,
    /// Tracked-handle count that triggers compaction of finished handles.
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: usize,
    /// Maximum pending units before submissions are rejected.
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cpu_percentage: default_cpu_percentage(),
            compaction_threshold: default_compaction_threshold(),
            max_queue_depth: default_max_queue_depth(),
        }
    }
}

impl SchedulerConfig {
    /// Validate scheduler configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.cpu_percentage == 0 || self.cpu_percentage > 100 {
            return Err("cpu_percentage must be between 1 and 100".into());
        }
        if self.compaction_threshold == 0 {
            return Err("compaction_threshold must be greater than 0".into());
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        Ok(())
    }

    /// Concurrency limit for the given parallelism: `floor(parallelism * cpu_percentage / 100)`.
    #[must_use]
    pub fn concurrency_for(&self, parallelism: usize) -> usize {
        parallelism * self.cpu_percentage as usize / 100
    }
}

/// Result cache configuration.
///
/// When the entry count exceeds `capacity`, the cache trims the oldest entries
/// until `low_water_mark` remain. Setting `low_water_mark == capacity` trims
/// back to exactly the capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum live entries.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// Entries left after a batch eviction.
    #[serde(default = "default_low_water_mark")]
    pub low_water_mark: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            low_water_mark: default_low_water_mark(),
        }
    }
}

impl CacheConfig {
    /// Validate cache configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be greater than 0".into());
        }
        if self.low_water_mark > self.capacity {
            return Err(format!(
                "low_water_mark ({}) must not exceed capacity ({})",
                self.low_water_mark, self.capacity
            ));
        }
        Ok(())
    }
}

/// Per-cycle bounds handed to the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchLimits {
    /// Maximum records fetched per source per cycle.
    pub max_items: usize,
    /// Page size requested from the remote API.
    pub items_per_request: usize,
}

/// Root monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Application name reported to the remote API.
    #[serde(default)]
    pub app_name: Option<String>,
    /// Base URL the read endpoints are served under.
    #[serde(default)]
    pub stats_endpoint_base_url: String,
    /// API client identifier.
    pub client_id: String,
    /// API client secret.
    pub client_secret: String,
    /// Account user name.
    pub user_name: String,
    /// Account password.
    pub user_password: String,
    /// Sources to poll. Duplicates are ignored.
    pub sources: Vec<String>,
    /// Seconds to sleep between cycles.
    pub refresh_interval_secs: u64,
    /// Maximum records fetched per source per cycle.
    pub post_count: usize,
    /// Page size requested from the remote API.
    #[serde(default = "default_items_per_request")]
    pub items_per_request: usize,
    /// Rows shown in reports.
    #[serde(default = "default_show_top_posts")]
    pub show_top_posts: usize,
    /// Print a report to stdout after each successful fetch.
    #[serde(default)]
    pub show_in_console: bool,
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl MonitorConfig {
    /// Validate credentials, sources and nested sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("user_name", &self.user_name),
            ("user_password", &self.user_password),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }
        if self.sources.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::Invalid("at least one source must be defined".into()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_secs must be greater than 0".into(),
            ));
        }
        if self.post_count == 0 {
            return Err(ConfigError::Invalid("post_count must be greater than 0".into()));
        }
        if self.items_per_request == 0 {
            return Err(ConfigError::Invalid(
                "items_per_request must be greater than 0".into(),
            ));
        }
        if self.show_in_console && self.show_top_posts == 0 {
            return Err(ConfigError::Invalid(
                "show_top_posts must be greater than 0 when show_in_console is set".into(),
            ));
        }
        self.scheduler
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("scheduler: {e}")))?;
        self.cache
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("cache: {e}")))?;
        Ok(())
    }

    /// Parse monitor configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&input)
    }

    /// Load configuration from the process environment, after applying a
    /// `.env` file if one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from `SOURCE_POLLER_*` variables supplied by `lookup`.
    ///
    /// `SOURCES` is a comma-separated list. Nested scheduler and cache values
    /// fall back to their defaults when absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let required = |name: &str| {
            get(name).ok_or_else(|| ConfigError::Invalid(format!("{ENV_PREFIX}{name} is not set")))
        };

        let sources = required("SOURCES")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let cfg = Self {
            app_name: get("APP_NAME"),
            stats_endpoint_base_url: get("STATS_ENDPOINT_BASE_URL").unwrap_or_default(),
            client_id: required("CLIENT_ID")?,
            client_secret: required("CLIENT_SECRET")?,
            user_name: required("USER_NAME")?,
            user_password: required("USER_PASSWORD")?,
            sources,
            refresh_interval_secs: parse_or(
                "REFRESH_INTERVAL_SECS",
                get("REFRESH_INTERVAL_SECS"),
                60,
            )?,
            post_count: parse_or("POST_COUNT", get("POST_COUNT"), 100)?,
            items_per_request: parse_or(
                "ITEMS_PER_REQUEST",
                get("ITEMS_PER_REQUEST"),
                default_items_per_request(),
            )?,
            show_top_posts: parse_or(
                "SHOW_TOP_POSTS",
                get("SHOW_TOP_POSTS"),
                default_show_top_posts(),
            )?,
            show_in_console: parse_or("SHOW_IN_CONSOLE", get("SHOW_IN_CONSOLE"), false)?,
            scheduler: SchedulerConfig {
                cpu_percentage: parse_or(
                    "CPU_PERCENTAGE",
                    get("CPU_PERCENTAGE"),
                    default_cpu_percentage(),
                )?,
                compaction_threshold: parse_or(
                    "COMPACTION_THRESHOLD",
                    get("COMPACTION_THRESHOLD"),
                    default_compaction_threshold(),
                )?,
                max_queue_depth: parse_or(
                    "MAX_QUEUE_DEPTH",
                    get("MAX_QUEUE_DEPTH"),
                    default_max_queue_depth(),
                )?,
            },
            cache: CacheConfig {
                capacity: parse_or("CACHE_CAPACITY", get("CACHE_CAPACITY"), default_cache_capacity())?,
                low_water_mark: parse_or(
                    "CACHE_LOW_WATER_MARK",
                    get("CACHE_LOW_WATER_MARK"),
                    default_low_water_mark(),
                )?,
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Refresh interval as a duration.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Fetch bounds for one cycle.
    #[must_use]
    pub const fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            max_items: self.post_count,
            items_per_request: self.items_per_request,
        }
    }

    /// Sources with blanks and duplicates removed, first occurrence kept.
    #[must_use]
    pub fn distinct_sources(&self) -> Vec<String> {
        distinct_sources(&self.sources)
    }
}

/// Remove blank and duplicate names, preserving first-occurrence order.
#[must_use]
pub fn distinct_sources(sources: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    sources
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && seen.insert(*s))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const VALID_JSON: &str = r#"{
        "client_id": "id",
        "client_secret": "secret",
        "user_name": "user",
        "user_password": "pw",
        "sources": ["rust", "golang", "rust"],
        "refresh_interval_secs": 30,
        "post_count": 50
    }"#;

    #[test]
    fn test_from_json_applies_defaults() {
        let cfg = MonitorConfig::from_json_str(VALID_JSON).unwrap();
        assert_eq!(cfg.scheduler.cpu_percentage, 60);
        assert_eq!(cfg.cache.capacity, 80);
        assert_eq!(cfg.cache.low_water_mark, 20);
        assert_eq!(cfg.items_per_request, 100);
        assert_eq!(cfg.show_top_posts, 10);
        assert_eq!(cfg.distinct_sources(), vec!["rust", "golang"]);
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let json = VALID_JSON.replace("\"secret\"", "\"\"");
        let err = MonitorConfig::from_json_str(&json).unwrap_err();
        assert!(err.to_string().contains("client_secret"));
    }

    #[test]
    fn test_empty_sources_rejected() {
        let json = VALID_JSON.replace(r#"["rust", "golang", "rust"]"#, "[]");
        assert!(MonitorConfig::from_json_str(&json).is_err());
    }

    #[test]
    fn test_console_report_needs_rows() {
        let json = VALID_JSON.replace(
            "\"post_count\": 50",
            "\"post_count\": 50, \"show_in_console\": true, \"show_top_posts\": 0",
        );
        let err = MonitorConfig::from_json_str(&json).unwrap_err();
        assert!(err.to_string().contains("show_top_posts"));

        let json = VALID_JSON.replace(
            "\"post_count\": 50",
            "\"post_count\": 50, \"show_in_console\": true",
        );
        assert_eq!(MonitorConfig::from_json_str(&json).unwrap().show_top_posts, 10);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = MonitorConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_scheduler_config_bounds() {
        let mut cfg = SchedulerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.concurrency_for(10), 6);
        assert_eq!(cfg.concurrency_for(1), 0);
        cfg.cpu_percentage = 0;
        assert!(cfg.validate().is_err());
        cfg.cpu_percentage = 101;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_cache_low_water_mark_bound() {
        let cfg = CacheConfig {
            capacity: 10,
            low_water_mark: 11,
        };
        assert!(cfg.validate().is_err());
        let cfg = CacheConfig {
            capacity: 10,
            low_water_mark: 10,
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<String, String> = [
            ("SOURCE_POLLER_CLIENT_ID", "id"),
            ("SOURCE_POLLER_CLIENT_SECRET", "secret"),
            ("SOURCE_POLLER_USER_NAME", "user"),
            ("SOURCE_POLLER_USER_PASSWORD", "pw"),
            ("SOURCE_POLLER_SOURCES", "rust, golang,,zig"),
            ("SOURCE_POLLER_CACHE_CAPACITY", "40"),
            ("SOURCE_POLLER_SHOW_IN_CONSOLE", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let cfg = MonitorConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(cfg.sources, vec!["rust", "golang", "zig"]);
        assert_eq!(cfg.cache.capacity, 40);
        assert!(cfg.show_in_console);
        assert_eq!(cfg.refresh_interval_secs, 60);
        // Same default as a JSON file that omits the field.
        assert_eq!(cfg.show_top_posts, 10);
    }

    #[test]
    fn test_from_lookup_bad_number() {
        let cfg = MonitorConfig::from_lookup(|k| match k {
            "SOURCE_POLLER_POST_COUNT" => Some("many".into()),
            "SOURCE_POLLER_SOURCES" => Some("rust".into()),
            _ => Some("x".into()),
        });
        assert!(matches!(cfg, Err(ConfigError::Parse(_))));
    }
}
