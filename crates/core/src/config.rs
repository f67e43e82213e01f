//! Configuration types for upload sessions and the reaper.

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::Path;
use time::Duration;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "FORKLIFT_";

/// Upload session configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadConfig {
    /// Lifetime of a new file upload session in seconds.
    #[serde(default = "default_file_session_lifetime_secs")]
    pub file_session_lifetime_secs: u64,
    /// Lifetime of a new upload session in seconds.
    #[serde(default = "default_upload_session_lifetime_secs")]
    pub upload_session_lifetime_secs: u64,
    /// Upper bound for a single `extend` request in seconds.
    /// Larger requests are clamped to this value.
    #[serde(default = "default_max_extend_secs")]
    pub max_extend_secs: u64,
}

fn default_file_session_lifetime_secs() -> u64 {
    3600 // 1 hour
}

fn default_upload_session_lifetime_secs() -> u64 {
    86400 // 24 hours
}

fn default_max_extend_secs() -> u64 {
    86400
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            file_session_lifetime_secs: default_file_session_lifetime_secs(),
            upload_session_lifetime_secs: default_upload_session_lifetime_secs(),
            max_extend_secs: default_max_extend_secs(),
        }
    }
}

impl UploadConfig {
    /// Lifetime of a new file upload session.
    pub fn file_session_lifetime(&self) -> Duration {
        seconds(self.file_session_lifetime_secs)
    }

    /// Lifetime of a new upload session.
    pub fn upload_session_lifetime(&self) -> Duration {
        seconds(self.upload_session_lifetime_secs)
    }

    /// Clamp a requested extension to `max_extend_secs`.
    pub fn clamp_extend(&self, requested_secs: u64) -> Duration {
        seconds(requested_secs.min(self.max_extend_secs))
    }

    /// Validate upload configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.file_session_lifetime_secs == 0 {
            return Err("uploads.file_session_lifetime_secs cannot be 0".to_string());
        }
        if self.upload_session_lifetime_secs == 0 {
            return Err("uploads.upload_session_lifetime_secs cannot be 0".to_string());
        }
        for (name, value) in [
            ("file_session_lifetime_secs", self.file_session_lifetime_secs),
            (
                "upload_session_lifetime_secs",
                self.upload_session_lifetime_secs,
            ),
            ("max_extend_secs", self.max_extend_secs),
        ] {
            if value > i64::MAX as u64 {
                return Err(format!(
                    "uploads.{name} {value} exceeds maximum value {}",
                    i64::MAX
                ));
            }
        }
        let now = time::OffsetDateTime::now_utc();
        for (name, lifetime) in [
            ("file_session_lifetime_secs", self.file_session_lifetime()),
            ("upload_session_lifetime_secs", self.upload_session_lifetime()),
        ] {
            if now.checked_add(lifetime).is_none() {
                return Err(format!(
                    "uploads.{name} puts the expiration out of range"
                ));
            }
        }
        Ok(())
    }
}

/// Upload mechanism configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MechanismConfig {
    /// Names of the mechanisms offered to clients.
    #[serde(default = "default_enabled_mechanisms")]
    pub enabled: Vec<String>,
    /// Base URL the HTTP POST mechanism hands out for file uploads.
    #[serde(default = "default_upload_url_base")]
    pub upload_url_base: String,
}

fn default_enabled_mechanisms() -> Vec<String> {
    vec![crate::mechanism::HTTP_POST_APPLICATION_OCTET_STREAM.to_string()]
}

fn default_upload_url_base() -> String {
    "/_/upload/files".to_string()
}

impl Default for MechanismConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_mechanisms(),
            upload_url_base: default_upload_url_base(),
        }
    }
}

impl MechanismConfig {
    /// Validate mechanism configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled.is_empty() {
            return Err("mechanisms.enabled must name at least one mechanism".to_string());
        }
        for name in &self.enabled {
            if !crate::mechanism::BUILTIN_MECHANISMS.contains(&name.as_str()) {
                return Err(format!("mechanisms.enabled: unknown mechanism '{name}'"));
            }
        }
        Ok(())
    }
}

/// Expiration reaper configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReaperConfig {
    /// Interval in seconds between sweeps (default: 60).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Maximum number of expired sessions handled per sweep.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Evict expired sessions from the store after canceling them.
    #[serde(default = "default_evict_terminal")]
    pub evict_terminal: bool,
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    1000
}

fn default_evict_terminal() -> bool {
    true
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            batch_size: default_batch_size(),
            evict_terminal: default_evict_terminal(),
        }
    }
}

impl ReaperConfig {
    /// Get the sweep interval as a std::time::Duration.
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate reaper configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        // tokio::time::interval panics on a zero period
        if self.sweep_interval_secs == 0 {
            return Err("reaper.sweep_interval_secs cannot be 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("reaper.batch_size cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForkliftConfig {
    /// Upload session configuration.
    #[serde(default)]
    pub uploads: UploadConfig,
    /// Upload mechanism configuration.
    #[serde(default)]
    pub mechanisms: MechanismConfig,
    /// Expiration reaper configuration.
    #[serde(default)]
    pub reaper: ReaperConfig,
}

impl ForkliftConfig {
    /// Load configuration from defaults, an optional TOML file, and
    /// `FORKLIFT_`-prefixed environment variables (`__` separates sections),
    /// in that order of precedence.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(ForkliftConfig::default()));

        if let Some(path) = path {
            if path.exists() {
                tracing::info!(config_path = %path.display(), "Loading configuration from file");
                figment = figment.merge(Toml::file(path));
            } else {
                tracing::debug!("No config file found at {}", path.display());
            }
        }

        let config: ForkliftConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> crate::Result<()> {
        self.uploads.validate().map_err(crate::Error::Config)?;
        self.mechanisms.validate().map_err(crate::Error::Config)?;
        self.reaper.validate().map_err(crate::Error::Config)?;
        Ok(())
    }
}

// Saturate at i64::MAX to prevent overflow wrapping to negative
fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}
