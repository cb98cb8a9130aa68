use chrono::FixedOffset;
use eyre::{Context, Result, eyre};
use seatgrab::scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub grab: GrabConfig,
    pub storage: StorageConfig,
    pub acquirer: AcquirerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabConfig {
    pub interval_secs: f64,
    pub max_attempts: Option<u32>,
    pub stop_grace_secs: u64,
    pub trigger_poll_ms: u64,
    /// Offset of the wall clock `run --at` times are given in
    pub utc_offset_hours: i32,
}

impl Default for GrabConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1.0,
            max_attempts: None,
            stop_grace_secs: 5,
            trigger_poll_ms: 1000,
            utc_offset_hours: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub queue_file: PathBuf,
    pub catalog_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(env!("CARGO_PKG_NAME"));
        Self {
            queue_file: data_dir.join("queue.json"),
            catalog_file: data_dir.join("catalog.yml"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquirerConfig {
    /// Shell command run once per attempt; `{id}`, `{code}` and `{name}` are substituted
    pub command: String,
    /// Extra environment for the command, such as session cookies
    pub env: HashMap<String, String>,
    pub timeout_ms: u64,
}

impl Default for AcquirerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            env: HashMap::new(),
            timeout_ms: 10000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            grab: GrabConfig::default(),
            storage: StorageConfig::default(),
            acquirer: AcquirerConfig::default(),
        }
    }
}

impl GrabConfig {
    pub fn interval(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.interval_secs)
            .map_err(|e| eyre!("Invalid grab interval {}: {}", self.interval_secs, e))
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .ok_or_else(|| eyre!("Invalid UTC offset: {} hours", self.utc_offset_hours))
    }

    pub fn scheduler_config(&self) -> Result<SchedulerConfig> {
        if self.max_attempts == Some(0) {
            return Err(eyre!("grab.max_attempts must be at least 1, or omitted to retry forever"));
        }
        Ok(SchedulerConfig::default()
            .with_grab_interval(self.interval()?)
            .with_max_attempts(self.max_attempts)
            .with_stop_grace(Duration::from_secs(self.stop_grace_secs))
            .with_trigger_poll(Duration::from_millis(self.trigger_poll_ms.max(1))))
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.grab.interval_secs, 1.0);
        assert_eq!(config.grab.max_attempts, None);
        assert_eq!(config.acquirer.timeout_ms, 10000);
        assert!(config.storage.queue_file.ends_with("seatgrab/queue.json"));
    }

    #[test]
    fn test_explicit_file_with_partial_sections() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seatgrab.yml");
        fs::write(
            &path,
            r#"
grab:
  interval_secs: 0.5
  max_attempts: 20
acquirer:
  command: "curl -sf -b \"$COOKIE\" https://example.invalid/enroll/{id}"
  env:
    COOKIE: "session=abc"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.grab.interval_secs, 0.5);
        assert_eq!(config.grab.max_attempts, Some(20));
        assert_eq!(config.grab.stop_grace_secs, 5);
        assert_eq!(config.acquirer.timeout_ms, 10000);
        assert_eq!(config.acquirer.env.get("COOKIE").map(String::as_str), Some("session=abc"));

        let scheduler = config.grab.scheduler_config().unwrap();
        assert_eq!(scheduler.grab_interval, Duration::from_millis(500));
        assert_eq!(scheduler.max_attempts, Some(20));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nope.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_utc_offset() {
        let grab = GrabConfig::default();
        assert_eq!(grab.utc_offset().unwrap().local_minus_utc(), 8 * 3600);

        let grab = GrabConfig {
            utc_offset_hours: 30,
            ..GrabConfig::default()
        };
        assert!(grab.utc_offset().is_err());
    }

    #[test]
    fn test_zero_max_attempts_is_error() {
        let grab = GrabConfig {
            max_attempts: Some(0),
            ..GrabConfig::default()
        };
        assert!(grab.scheduler_config().is_err());

        let grab = GrabConfig {
            max_attempts: Some(1),
            ..GrabConfig::default()
        };
        assert_eq!(grab.scheduler_config().unwrap().max_attempts, Some(1));
    }

    #[test]
    fn test_negative_interval_is_error() {
        let grab = GrabConfig {
            interval_secs: -1.0,
            ..GrabConfig::default()
        };
        assert!(grab.interval().is_err());
    }
}
