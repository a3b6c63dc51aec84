//! Beacon configuration
//!
//! Loaded from TOML, then overlaid with `BEACON_*` environment variables, then
//! validated. A missing `device_api_url` is a legal state: it means the
//! remote registry is not configured and registration stays dormant.

use crate::channel::{ChannelCreateMethod, ChannelId};
use crate::{BeaconError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default dedupe/throttle window for unchanged payloads.
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "BEACON_";

/// Registration and remote-config settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Base URL of the channel registry; `None` disables registration
    pub device_api_url: Option<String>,
    /// Basic-auth user for the registry
    pub app_key: Option<String>,
    /// Basic-auth password for the registry
    pub app_secret: Option<String>,
    /// Platform reported as `device_type`
    pub platform: String,
    /// First-registration strategy
    pub channel_create_method: ChannelCreateMethod,
    /// Window within which an unchanged payload is not re-sent
    pub update_interval_secs: u64,
    /// Directory for on-disk state (CLI host only)
    pub storage_path: Option<PathBuf>,
    /// Host application version
    pub app_version: Option<String>,
    /// SDK version reported to remote services
    pub sdk_version: String,
    /// Locale language override
    pub locale_language: Option<String>,
    /// Locale country override
    pub locale_country: Option<String>,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            device_api_url: None,
            app_key: None,
            app_secret: None,
            platform: "linux".to_string(),
            channel_create_method: ChannelCreateMethod::Automatic,
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            storage_path: None,
            app_version: None,
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
            locale_language: None,
            locale_country: None,
        }
    }
}

impl BeaconConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a file. A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            BeaconError::configuration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Overlay `BEACON_*` variables from the process environment.
    pub fn merge_with_env(&mut self) {
        self.merge_with_vars(std::env::vars());
    }

    /// Overlay `BEACON_*` variables from an explicit source.
    pub fn merge_with_vars<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "DEVICE_API_URL" => self.device_api_url = Some(value),
                "APP_KEY" => self.app_key = Some(value),
                "APP_SECRET" => self.app_secret = Some(value),
                "PLATFORM" => self.platform = value,
                "RESTORE_CHANNEL_ID" => {
                    self.channel_create_method = ChannelCreateMethod::Restore(ChannelId::new(value));
                }
                _ => {}
            }
        }
    }

    /// Check the configuration for programmer errors.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.device_api_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(BeaconError::configuration(format!(
                    "device_api_url must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if self.update_interval_secs == 0 {
            return Err(BeaconError::configuration(
                "update_interval_secs cannot be zero",
            ));
        }
        if self.platform.trim().is_empty() {
            return Err(BeaconError::configuration("platform cannot be empty"));
        }
        if let ChannelCreateMethod::Restore(id) = &self.channel_create_method {
            if id.as_str().trim().is_empty() {
                return Err(BeaconError::configuration(
                    "restore channel id cannot be empty",
                ));
            }
        }
        if self.app_key.is_some() != self.app_secret.is_some() {
            return Err(BeaconError::configuration(
                "app_key and app_secret must be set together",
            ));
        }
        Ok(())
    }

    /// Whether a registry endpoint is configured.
    pub fn is_remote_configured(&self) -> bool {
        self.device_api_url.is_some()
    }

    /// Throttle window as a duration.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// Basic-auth credentials, when both halves are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.app_key, &self.app_secret) {
            (Some(key), Some(secret)) => Some((key.as_str(), secret.as_str())),
            _ => None,
        }
    }

    fn base_url(&self) -> Result<&str> {
        self.device_api_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .ok_or_else(|| BeaconError::configuration("device_api_url is not configured"))
    }

    /// Collection URL used for channel creation.
    pub fn channels_url(&self) -> Result<String> {
        Ok(format!("{}/api/channels/", self.base_url()?))
    }

    /// Resource URL of a channel.
    pub fn channel_location(&self, channel_id: &ChannelId) -> Result<String> {
        Ok(format!("{}/api/channels/{channel_id}", self.base_url()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_are_dormant() {
        let config = BeaconConfig::default();
        assert!(!config.is_remote_configured());
        assert_eq!(config.update_interval(), Duration::from_secs(86_400));
        assert!(config.validate().is_ok());
        assert_matches!(config.channels_url(), Err(BeaconError::Configuration { .. }));
    }

    #[test]
    fn parses_toml_with_restore() {
        let config = BeaconConfig::from_toml_str(
            r#"
            device_api_url = "https://device.example.com/"
            platform = "android"
            channel_create_method = { restore = "5f1c7d8e-3b0a-4c5e-9a8f-0123456789ab" }
            "#,
        )
        .unwrap();

        assert_eq!(config.platform, "android");
        assert_eq!(
            config.channel_create_method,
            ChannelCreateMethod::Restore("5f1c7d8e-3b0a-4c5e-9a8f-0123456789ab".into())
        );
        assert_eq!(
            config.channels_url().unwrap(),
            "https://device.example.com/api/channels/"
        );
        assert_eq!(
            config.channel_location(&"abc".into()).unwrap(),
            "https://device.example.com/api/channels/abc"
        );
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = BeaconConfig::default();
        config.merge_with_vars(vec![
            ("BEACON_DEVICE_API_URL".to_string(), "https://d/".to_string()),
            ("BEACON_PLATFORM".to_string(), "ios".to_string()),
            ("OTHER".to_string(), "ignored".to_string()),
        ]);
        assert_eq!(config.device_api_url.as_deref(), Some("https://d/"));
        assert_eq!(config.platform, "ios");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = BeaconConfig {
            device_api_url: Some("ftp://nope".into()),
            ..BeaconConfig::default()
        };
        assert_matches!(config.validate(), Err(BeaconError::Configuration { .. }));

        let config = BeaconConfig {
            update_interval_secs: 0,
            ..BeaconConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BeaconConfig {
            app_key: Some("key".into()),
            ..BeaconConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BeaconConfig::load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, BeaconConfig::default());
    }

    #[test]
    fn loads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "device_api_url = \"https://d.example.com\"\nupdate_interval_secs = 60\n")
            .unwrap();
        let config = BeaconConfig::load_from_file(&path).unwrap();
        assert!(config.is_remote_configured());
        assert_eq!(config.update_interval(), Duration::from_secs(60));
    }
}
