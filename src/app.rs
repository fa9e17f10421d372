use directories::BaseDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::chat::{EchoPolicy, SessionOptions, TransportConfig};
use crate::error::ConfigError;
use crate::utils::{normalize_url, push_url_for};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    /// Push endpoint; derived from `base_url` when unset.
    pub ws_url: Option<String>,
    pub reconnect_delay_secs: u64,
    pub echo_policy: EchoPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ws_url: None,
            reconnect_delay_secs: 3,
            echo_policy: EchoPolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("imtt.toml"))
    }

    /// Config from the default location, or defaults when it is missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::toml_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::toml_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn api_base(&self) -> String {
        normalize_url(&self.base_url)
    }

    pub fn push_endpoint(&self) -> Result<Url, ConfigError> {
        match &self.ws_url {
            Some(ws) => Ok(Url::parse(ws.trim())?),
            None => Ok(push_url_for(&self.base_url)?),
        }
    }

    pub fn session_options(&self) -> Result<SessionOptions, ConfigError> {
        Ok(SessionOptions {
            transport: TransportConfig {
                endpoint: self.push_endpoint()?,
                reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            },
            echo_policy: self.echo_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("imtt.toml");
        let config = AppConfig {
            base_url: "https://chat.example.com/api".into(),
            ws_url: None,
            reconnect_delay_secs: 5,
            echo_policy: EchoPolicy::DropOwnEcho,
        };
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: AppConfig = toml::from_str(r#"base_url = "http://10.0.0.2:8080/api""#).unwrap();
        assert_eq!(config.reconnect_delay_secs, 3);
        assert_eq!(config.echo_policy, EchoPolicy::KeepBoth);
        assert_eq!(config.push_endpoint().unwrap().as_str(), "ws://10.0.0.2:8080/api/ws");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let config: AppConfig = toml::from_str(
            r#"
            ws_url = "wss://push.example.com/socket"
            echo_policy = "drop_own_echo"
            "#,
        )
        .unwrap();
        let options = config.session_options().unwrap();
        assert_eq!(options.transport.endpoint.as_str(), "wss://push.example.com/socket");
        assert_eq!(options.echo_policy, EchoPolicy::DropOwnEcho);
    }
}
