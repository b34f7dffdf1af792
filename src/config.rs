//! Server Configuration
//!
//! Runtime settings plus the optional `portico/config.toml` file model.
//! Loading is tolerant: a missing or unreadable file falls back to
//! defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_MAX_FRAME_BYTES;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    /// Ceiling for a declared `Content-Length`.
    pub max_frame_bytes: usize,
    /// Session idle expiry in seconds; negative disables expiry.
    pub session_max_idle_secs: i64,
    /// How often the session store checks for expired sessions.
    pub session_sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".portico");

        Self {
            socket_path: base.join("portico.sock"),
            pid_path: base.join("portico.pid"),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            session_max_idle_secs: defaults::max_idle_secs(),
            session_sweep_interval: Duration::from_secs(defaults::sweep_interval_secs()),
        }
    }
}

impl ServerConfig {
    /// Resolve settings from `portico/config.toml`, defaulting wherever the
    /// file or a key is absent.
    pub fn load() -> Self {
        match Self::load_file() {
            Some(file) => Self::from_file_model(&file),
            None => Self::default(),
        }
    }

    pub fn from_file_model(file: &PorticoConfig) -> Self {
        let mut config = Self::default();
        if let Some(path) = &file.server.socket_path {
            config.socket_path = path.clone();
        }
        if let Some(path) = &file.server.pid_path {
            config.pid_path = path.clone();
        }
        config.max_frame_bytes = file.limits.max_frame_mb * 1024 * 1024;
        config.session_max_idle_secs = file.session.max_idle_secs;
        config.session_sweep_interval = Duration::from_secs(file.session.sweep_interval_secs);
        config
    }

    /// The session idle window; `None` when expiry is disabled.
    pub fn session_max_idle(&self) -> Option<Duration> {
        u64::try_from(self.session_max_idle_secs)
            .ok()
            .map(Duration::from_secs)
    }

    fn load_file() -> Option<PorticoConfig> {
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .map(|d| d.join("portico/config.toml"))
            .filter(|p| p.exists())
            .and_then(|p| std::fs::read_to_string(&p).ok())
            .and_then(|c| toml::from_str::<PorticoConfig>(&c).ok())
    }
}

/// On-disk configuration file model
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PorticoConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub limits: LimitSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerSettings {
    #[serde(default)]
    pub socket_path: Option<PathBuf>,

    #[serde(default)]
    pub pid_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "defaults::max_idle_secs")]
    pub max_idle_secs: i64,

    #[serde(default = "defaults::sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_idle_secs: defaults::max_idle_secs(),
            sweep_interval_secs: defaults::sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    #[serde(default = "defaults::max_frame_mb")]
    pub max_frame_mb: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_frame_mb: defaults::max_frame_mb(),
        }
    }
}

mod defaults {
    pub fn max_idle_secs() -> i64 {
        30 * 60
    }
    pub fn sweep_interval_secs() -> u64 {
        60
    }
    pub fn max_frame_mb() -> usize {
        16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.session_max_idle_secs, 1800);
        assert_eq!(config.session_sweep_interval, Duration::from_secs(60));
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
        assert_eq!(
            config.session_max_idle(),
            Some(Duration::from_secs(30 * 60))
        );
    }

    #[test]
    fn test_negative_idle_disables_expiry() {
        let config = ServerConfig {
            session_max_idle_secs: -1,
            ..ServerConfig::default()
        };
        assert_eq!(config.session_max_idle(), None);
    }

    #[test]
    fn test_file_model_parse() {
        let file: PorticoConfig = toml::from_str(
            r#"
            [server]
            socket_path = "/run/portico.sock"

            [session]
            max_idle_secs = 120

            [limits]
            max_frame_mb = 4
            "#,
        )
        .unwrap();
        let config = ServerConfig::from_file_model(&file);
        assert_eq!(config.socket_path, PathBuf::from("/run/portico.sock"));
        assert_eq!(config.session_max_idle_secs, 120);
        assert_eq!(config.max_frame_bytes, 4 * 1024 * 1024);
        assert_eq!(config.session_sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_file_model_uses_defaults() {
        let file: PorticoConfig = toml::from_str("").unwrap();
        let config = ServerConfig::from_file_model(&file);
        assert_eq!(config.session_max_idle_secs, 1800);
        assert_eq!(config.max_frame_bytes, 16 * 1024 * 1024);
    }
}
