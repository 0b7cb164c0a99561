use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from nanny.toml.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NannyConfig {
    pub paths: PathsConfig,
    pub timing: TimingConfig,
    pub detectors: DetectorConfig,
    pub reboot: RebootConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Worker stderr capture that the detectors scan.
    pub worker_log: PathBuf,
    /// Append-only log of the watchdog itself.
    pub log_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    pub startup_delay_secs: u64,
    pub poll_interval_secs: u64,
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Average hashrate (H/s) below which the worker counts as underperforming.
    pub expected_hashrate: f64,
    pub stuck_limit: usize,
    pub disconnect_sample_size: usize,
    pub disconnect_trigger_count: usize,
    pub hashrate_samples: usize,
    pub min_sample_duration_secs: f64,
    pub triggers: Vec<String>,
    /// Keep only the newest N lines of each snapshot. `None` scans the whole log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lines: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RebootConfig {
    pub command: String,
    pub args: Vec<String>,
}

// --- Default implementations ---

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            worker_log: PathBuf::from("~/nanny/error"),
            log_file: PathBuf::from("~/nanny.log"),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            startup_delay_secs: 25,
            poll_interval_secs: 15,
            retry_delay_secs: 10,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            expected_hashrate: 160_000_000.0,
            stuck_limit: 3,
            disconnect_sample_size: 50,
            disconnect_trigger_count: 20,
            hashrate_samples: 50,
            min_sample_duration_secs: 1.8,
            triggers: vec!["stratum connection error".to_string(), "killed".to_string()],
            max_lines: None,
        }
    }
}

impl Default for RebootConfig {
    fn default() -> Self {
        Self {
            command: "/sbin/reboot".to_string(),
            args: Vec::new(),
        }
    }
}

impl TimingConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// A value is out of range.
    Invalid(String),
    /// A `~/` path was configured but no home directory is known.
    NoHomeDir,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
            ConfigError::NoHomeDir => write!(f, "cannot determine home directory"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid(_) | ConfigError::NoHomeDir => None,
        }
    }
}

impl NannyConfig {
    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist. Paths are home-expanded and the result is validated.
    ///
    /// Nothing is logged here: logging is configured from the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })?;
            Self::from_toml(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?
        } else {
            Self::default()
        };

        config.paths.worker_log = expand_home(&config.paths.worker_log)?;
        config.paths.log_file = expand_home(&config.paths.log_file)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string. Missing sections take defaults.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Reject values that would make a detector meaningless or the loop spin.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detectors;
        if self.timing.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "timing.poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if d.disconnect_sample_size == 0 || d.hashrate_samples == 0 {
            return Err(ConfigError::Invalid(
                "detector sample sizes must be greater than 0".to_string(),
            ));
        }
        if d.disconnect_trigger_count > d.disconnect_sample_size {
            return Err(ConfigError::Invalid(format!(
                "detectors.disconnect_trigger_count ({}) exceeds disconnect_sample_size ({})",
                d.disconnect_trigger_count, d.disconnect_sample_size
            )));
        }
        if !d.min_sample_duration_secs.is_finite() || d.min_sample_duration_secs < 0.0 {
            return Err(ConfigError::Invalid(
                "detectors.min_sample_duration_secs must be a non-negative number".to_string(),
            ));
        }
        if d.triggers.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "detectors.triggers must not contain empty entries".to_string(),
            ));
        }
        if let Some(max) = d.max_lines {
            if max < d.disconnect_sample_size {
                return Err(ConfigError::Invalid(format!(
                    "detectors.max_lines ({max}) is below disconnect_sample_size ({})",
                    d.disconnect_sample_size
                )));
            }
        }
        if self.reboot.command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "reboot.command must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings that are valid but probably not what the operator wants.
    pub fn warnings(&self) -> Vec<String> {
        let d = &self.detectors;
        let mut warnings = Vec::new();
        if let Some(max) = d.max_lines {
            let wanted = d.hashrate_samples.saturating_mul(TAIL_LINES_PER_MINING_SAMPLE);
            if max < wanted {
                warnings.push(format!(
                    "detectors.max_lines ({max}) may hold fewer than hashrate_samples ({}) \
                     mining reports; the hashrate check will stay undetermined \
                     (suggest at least {wanted})",
                    d.hashrate_samples
                ));
            }
        }
        warnings
    }
}

/// Mining reports are interleaved with work-package chatter in the worker log.
const TAIL_LINES_PER_MINING_SAMPLE: usize = 4;

/// Default config location: `~/nanny.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    expand_home(Path::new("~/nanny.toml"))
}

/// Expand a leading `~` against the user's home directory.
pub fn expand_home(path: &Path) -> Result<PathBuf, ConfigError> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}
