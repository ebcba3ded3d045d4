// Application configuration: JSON file under the user's config dir + env overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const APP_DIR: &str = "playlist-downloader";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings for the yt-dlp engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit path to the yt-dlp executable
    pub binary: Option<String>,
    /// SOCKS5/HTTP proxy URL (e.g. "socks5h://127.0.0.1:1080")
    pub proxy: Option<String>,
    pub socket_timeout_secs: u32,
    pub retries: u32,
    pub fragment_retries: u32,
    pub extractor_retries: u32,
    /// Wall-clock limit for metadata-only calls
    pub info_timeout_secs: u64,
    pub user_agent: String,
    pub check_certificates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: None,
            proxy: None,
            socket_timeout_secs: 30,
            retries: 5,
            fragment_retries: 5,
            extractor_retries: 5,
            info_timeout_secs: 60,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            check_certificates: false,
        }
    }
}

/// Bounded retry applied around every engine download call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_secs: 2,
        }
    }
}

impl RetrySettings {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Output folder layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Folder used when downloading a hand-picked subset of a playlist
    pub subset_folder: String,
    /// Prefix whole-playlist files with their playlist position
    pub index_prefix: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            subset_folder: "Playlist_Download".to_string(),
            index_prefix: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub retry: RetrySettings,
    pub layout: LayoutConfig,
    pub default_destination: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            retry: RetrySettings::default(),
            layout: LayoutConfig::default(),
            default_destination: dirs::download_dir()
                .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

impl AppConfig {
    /// Default location: `<config_dir>/playlist-downloader/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Missing file means defaults; a malformed one is an error
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `YTDLP_PATH` and `YTDLP_PROXY` win over the file
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("YTDLP_PATH").filter(|v| !v.trim().is_empty()) {
            self.engine.binary = Some(path);
        }
        if let Some(proxy) = lookup("YTDLP_PROXY").filter(|v| !v.trim().is_empty()) {
            self.engine.proxy = Some(proxy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("nope.json")).unwrap();

        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.retry.delay(), Duration::from_secs(2));
        assert_eq!(config.layout.subset_folder, "Playlist_Download");
        assert_eq!(config.engine.socket_timeout_secs, 30);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "engine": {{ "proxy": "socks5h://127.0.0.1:7890" }}, "layout": {{ "index_prefix": true }} }}"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();

        assert_eq!(config.engine.proxy.as_deref(), Some("socks5h://127.0.0.1:7890"));
        assert_eq!(config.engine.retries, 5);
        assert!(config.layout.index_prefix);
        assert_eq!(config.layout.subset_folder, "Playlist_Download");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| match key {
            "YTDLP_PATH" => Some("/opt/bin/yt-dlp".to_string()),
            "YTDLP_PROXY" => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(config.engine.binary.as_deref(), Some("/opt/bin/yt-dlp"));
        assert_eq!(config.engine.proxy, None);
    }
}
