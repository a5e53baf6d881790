use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::calendar::CalendarZone;
use crate::credentials::TokenConfig;
use crate::cube::CubeId;
use crate::duration::{deserialize_duration, serialize_duration};

fn default_retry_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_retry_max_delay() -> Duration {
    Duration::from_secs(60)
}

/// Retry settings for valuation requests the service refuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total requests per call, including the first.
    pub max_attempts: u32,

    /// Wait before the first retry.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub delay: Duration,

    /// Multiplier applied to the wait after each retry. `1.0` keeps it fixed.
    pub backoff: f64,

    /// Upper bound on any single wait.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: default_retry_delay(),
            backoff: 2.0,
            max_delay: default_retry_max_delay(),
        }
    }
}

impl RetryConfig {
    /// Wait after the `attempt`-th failed request (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff.max(1.0).powi(exponent);
        let secs = (self.delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Settings of the per-cube client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Site root; only overridden in tests.
    pub base_url: Option<String>,

    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub request_timeout: Duration,

    /// A cube whose last valuation is more than this many days old is
    /// classified as closed.
    pub stale_after_days: u32,

    /// Cubes within this many days of `stale_after_days` are flagged for
    /// manual review. `0` disables the flag.
    pub review_margin_days: u32,

    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout: crate::cube::DEFAULT_REQUEST_TIMEOUT,
            stale_after_days: 10,
            review_margin_days: 1,
            retry: RetryConfig::default(),
        }
    }
}

/// Settings of one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Pause between consecutive cubes.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub cube_delay: Duration,

    /// Run the status check before reading each cube and skip inactive ones.
    pub check_status: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            cube_delay: Duration::from_secs(2),
            check_status: true,
        }
    }
}

fn deserialize_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_time(&s).map_err(de::Error::custom)
}

fn serialize_time<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&time.format("%H:%M"))
}

/// Parse `HH:MM` (or `HH:MM:SS`).
pub fn parse_time(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .with_context(|| format!("Invalid time {s:?}: expected HH:MM"))
}

/// When the daemon runs a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Wall-clock time in the configured zone.
    #[serde(deserialize_with = "deserialize_time", serialize_with = "serialize_time")]
    pub run_at: NaiveTime,

    /// Only run Monday through Friday.
    pub weekdays_only: bool,

    /// Run one cycle right after the daemon starts.
    pub run_on_start: bool,

    /// Random offset in `[0, jitter]` added to each scheduled run.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub jitter: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_at: NaiveTime::from_hms_opt(15, 0, 0).unwrap_or_default(),
            weekdays_only: true,
            run_on_start: false,
            jitter: Duration::ZERO,
        }
    }
}

/// Report delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory receiving one report file per cycle. Relative paths are
    /// resolved from the config file location.
    pub output_dir: Option<PathBuf>,

    /// Emit every report line through the log as well.
    pub log_lines: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            log_lines: true,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cubes listed inline.
    pub cubes: Vec<CubeId>,

    /// JSON watchlist file. If relative, resolved from config file location.
    pub watchlist: Option<PathBuf>,

    /// Zone for calendar days (`local`, `utc`, or an IANA name).
    pub timezone: CalendarZone,

    pub token: Option<TokenConfig>,

    pub client: ClientConfig,

    pub poll: PollConfig,

    pub schedule: ScheduleConfig,

    pub report: ReportConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Make every relative path absolute against `config_dir`.
    pub fn resolve_paths(mut self, config_dir: &Path) -> Self {
        let resolve = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                config_dir.join(path)
            }
        };
        self.watchlist = self.watchlist.map(resolve);
        self.report.output_dir = self.report.output_dir.map(resolve);
        self.token = self.token.map(|token| token.resolve_paths(config_dir));
        self
    }
}

/// Loaded configuration with every path resolved.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// File the configuration came from (it may not exist).
    pub path: PathBuf,

    pub config: Config,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./cubewatch.toml` if it exists in current directory
/// 2. `~/.local/share/cubewatch/cubewatch.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("cubewatch.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("cubewatch").join("cubewatch.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Load config, using defaults if the file doesn't exist.
    ///
    /// Relative paths resolve against the config file's directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?
            .to_path_buf();

        let config = Config::load_or_default(&config_path)?.resolve_paths(&config_dir);

        Ok(Self {
            path: config_path,
            config,
        })
    }

    /// The configured token source, falling back to `XUEQIU_TOKEN`.
    pub fn token_source(&self) -> TokenConfig {
        self.config.token.clone().unwrap_or_default()
    }
}
