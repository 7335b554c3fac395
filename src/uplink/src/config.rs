use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Default uplink name
pub const DEFAULT_UPLINK_NAME: &str = "npmjs";

/// Default uplink URL
pub const DEFAULT_UPLINK_URL: &str = "https://registry.npmjs.org/";

/// Default storage directory for local manifests
pub const DEFAULT_STORAGE_DIR: &str = "./storage";

/// Default cache max-age (2 minutes)
pub const DEFAULT_MAXAGE_MS: i64 = 2 * 60 * 1000;

/// Default per-uplink request timeout (30 seconds)
pub const DEFAULT_TIMEOUT_MS: i64 = 30 * 1000;

/// Default number of consecutive failures before an uplink is skipped
pub const DEFAULT_MAX_FAILS: u32 = 2;

/// Default time an uplink stays skipped after reaching `max_fails` (5 minutes)
pub const DEFAULT_FAIL_TIMEOUT_MS: i64 = 5 * 60 * 1000;

/// Upper bound for per-uplink retries
pub const MAX_RETRY: u32 = 5;

/// Parsed default configuration (built once at first access)
static DEFAULT_CONFIG: OnceLock<Config> = OnceLock::new();

/// A signed time interval in milliseconds.
///
/// Accepts plain numbers (seconds) or strings with a unit suffix: `500ms`,
/// `10s`, `2m`, `1h`, `1d`. Several components may be combined (`1m30s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval {
    millis: i64,
}

impl Interval {
    pub const fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// Positive intervals as a `Duration`; zero or negative yield `None`.
    pub fn as_duration(&self) -> Option<Duration> {
        if self.millis > 0 {
            Some(Duration::from_millis(self.millis as u64))
        } else {
            None
        }
    }
}

impl std::str::FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("empty interval".to_string());
        }

        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };
        if body.is_empty() {
            return Err(format!("invalid interval: {}", s));
        }

        // Bare number: seconds
        if let Ok(secs) = body.parse::<f64>() {
            let millis = to_millis(secs, 1000.0).ok_or_else(|| out_of_range(s))?;
            return Ok(Interval::from_millis(if negative { -millis } else { millis }));
        }

        let mut total: i64 = 0;
        let mut rest = body;
        while !rest.is_empty() {
            let digits_end = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .ok_or_else(|| format!("missing unit in interval: {}", s))?;
            if digits_end == 0 {
                return Err(format!("invalid interval: {}", s));
            }
            let value: f64 = rest[..digits_end]
                .parse()
                .map_err(|_| format!("invalid interval: {}", s))?;
            rest = rest[digits_end..].trim_start();

            let unit_end = rest
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(rest.len());
            let factor: f64 = match &rest[..unit_end] {
                "ms" => 1.0,
                "s" | "sec" => 1_000.0,
                "m" | "min" => 60_000.0,
                "h" => 3_600_000.0,
                "d" => 86_400_000.0,
                "w" => 604_800_000.0,
                "M" => 2_592_000_000.0,
                "y" => 31_536_000_000.0,
                unit => return Err(format!("unknown interval unit `{}` in {}", unit, s)),
            };
            total = to_millis(value, factor)
                .and_then(|millis| total.checked_add(millis))
                .ok_or_else(|| out_of_range(s))?;
            rest = rest[unit_end..].trim_start();
        }

        Ok(Interval::from_millis(if negative { -total } else { total }))
    }
}

fn to_millis(value: f64, factor: f64) -> Option<i64> {
    let millis = (value * factor).round();
    if millis.is_finite() && millis >= 0.0 && millis < i64::MAX as f64 {
        Some(millis as i64)
    } else {
        None
    }
}

fn out_of_range(s: &str) -> String {
    format!("interval out of range: {}", s)
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(secs) => secs
                .checked_mul(1000)
                .map(Interval::from_millis)
                .ok_or_else(|| serde::de::Error::custom(format!("interval out of range: {}", secs))),
            Raw::Float(secs) => {
                let millis = to_millis(secs.abs(), 1000.0).ok_or_else(|| {
                    serde::de::Error::custom(format!("interval out of range: {}", secs))
                })?;
                Ok(Interval::from_millis(if secs < 0.0 { -millis } else { millis }))
            }
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for Interval {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{}ms", self.millis))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    /// Ordered uplinks; the first configured uplink wins merge conflicts
    #[serde(default)]
    pub uplinks: Vec<UplinkConfig>,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub directory: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: DEFAULT_STORAGE_DIR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Bounds the whole fan-out of one sync call, regardless of uplink timeouts
    #[serde(default)]
    pub global_timeout: Option<Interval>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkConfig {
    /// Identity label ("upname")
    pub name: String,
    pub url: String,
    #[serde(default = "default_maxage")]
    pub maxage: Interval,
    #[serde(default = "default_timeout")]
    pub timeout: Interval,
    #[serde(default = "default_max_fails")]
    pub max_fails: u32,
    #[serde(default = "default_fail_timeout")]
    pub fail_timeout: Interval,
    /// Proxy URL already resolved against no_proxy rules; `None` means direct
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub retry: u32,
    /// Whether fetched metadata may be persisted locally
    #[serde(default = "default_true")]
    pub cache: bool,
}

fn default_maxage() -> Interval {
    Interval::from_millis(DEFAULT_MAXAGE_MS)
}

fn default_timeout() -> Interval {
    Interval::from_millis(DEFAULT_TIMEOUT_MS)
}

fn default_max_fails() -> u32 {
    DEFAULT_MAX_FAILS
}

fn default_fail_timeout() -> Interval {
    Interval::from_millis(DEFAULT_FAIL_TIMEOUT_MS)
}

fn default_true() -> bool {
    true
}

impl UplinkConfig {
    /// Uplink with default policy
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            maxage: default_maxage(),
            timeout: default_timeout(),
            max_fails: default_max_fails(),
            fail_timeout: default_fail_timeout(),
            proxy: None,
            retry: 0,
            cache: true,
        }
    }

    /// Per-attempt timeout; non-positive values fall back to the default
    pub fn request_timeout(&self) -> Duration {
        self.timeout
            .as_duration()
            .unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS as u64))
    }

    /// Configured retries, capped at `MAX_RETRY`
    pub fn retries(&self) -> u32 {
        self.retry.min(MAX_RETRY)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("uplink name must not be empty".to_string());
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(format!(
                "uplink `{}` url must be http or https: {}",
                self.name, self.url
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a YAML or TOML file, chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&raw)
                .map_err(|e| RegistryError::Config(format!("Invalid TOML config: {}", e)))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)
                .map_err(|e| RegistryError::Config(format!("Invalid YAML config: {}", e)))?,
            other => {
                return Err(RegistryError::Config(format!(
                    "Unsupported config extension: {:?}",
                    other
                )))
            }
        };

        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            uplinks = config.uplinks.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for uplink in &self.uplinks {
            uplink.validate().map_err(RegistryError::Config)?;
            if !seen.insert(uplink.name.as_str()) {
                return Err(RegistryError::Config(format!(
                    "duplicate uplink name: {}",
                    uplink.name
                )));
            }
        }
        Ok(())
    }

    pub fn uplink(&self, name: &str) -> Option<&UplinkConfig> {
        self.uplinks.iter().find(|u| u.name == name)
    }

    fn build_default() -> Config {
        Config {
            storage: StorageConfig::default(),
            uplinks: vec![UplinkConfig::new(DEFAULT_UPLINK_NAME, DEFAULT_UPLINK_URL)],
            sync: SyncConfig::default(),
        }
    }

    pub(crate) fn default_parsed() -> &'static Config {
        DEFAULT_CONFIG.get_or_init(Self::build_default)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_parsed().clone()
    }
}
