//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::hotkey::HotkeySettings;

/// Quiet period before a burst of settings edits is applied
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(40);

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Initial hotkey settings, read once at startup
    pub settings_path: PathBuf,

    /// Settings debounce window
    pub debounce: Duration,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let debounce = std::env::var("HOTKEY_DEBOUNCE_MS").ok();
        Self::from_parts(Path::new(&home), debounce.as_deref())
    }

    fn from_parts(home: &Path, debounce_ms: Option<&str>) -> Result<Self> {
        let data_dir = home.join(".local").join("share").join("hotkey-daemon");

        let debounce = match debounce_ms {
            Some(ms) => Duration::from_millis(
                ms.trim()
                    .parse()
                    .with_context(|| format!("invalid HOTKEY_DEBOUNCE_MS: {ms:?}"))?,
            ),
            None => DEFAULT_DEBOUNCE,
        };

        Ok(Self {
            socket_path: data_dir.join("daemon.sock"),
            settings_path: data_dir.join("hotkey.json"),
            data_dir,
            debounce,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }

    /// Read the startup hotkey settings, falling back to defaults
    pub fn load_hotkey_settings(&self) -> Result<HotkeySettings> {
        if !self.settings_path.exists() {
            debug!(path = ?self.settings_path, "no hotkey settings file, using defaults");
            return Ok(HotkeySettings::default());
        }

        let raw = std::fs::read_to_string(&self.settings_path)
            .with_context(|| format!("failed to read {}", self.settings_path.display()))?;
        let settings = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", self.settings_path.display()))?;
        info!(path = ?self.settings_path, "hotkey settings loaded");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_home(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hotkey-config-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.socket_path.to_string_lossy().contains("hotkey-daemon"));
    }

    #[test]
    fn test_debounce_override() {
        let home = Path::new("/home/user");
        let config = Config::from_parts(home, Some("15")).unwrap();
        assert_eq!(config.debounce, Duration::from_millis(15));
        assert_eq!(
            config.settings_path,
            PathBuf::from("/home/user/.local/share/hotkey-daemon/hotkey.json")
        );

        assert!(Config::from_parts(home, Some("soon")).is_err());
        let config = Config::from_parts(home, None).unwrap();
        assert_eq!(config.debounce, DEFAULT_DEBOUNCE);
    }

    #[test]
    fn test_missing_settings_file_uses_defaults() {
        let config = Config::from_parts(&temp_home("missing"), None).unwrap();
        assert_eq!(config.load_hotkey_settings().unwrap(), HotkeySettings::default());
    }

    #[test]
    fn test_settings_file() {
        let config = Config::from_parts(&temp_home("file"), None).unwrap();
        config.ensure_dirs().unwrap();
        std::fs::write(
            &config.settings_path,
            r#"{"enabled":true,"modifiers":{"command":true,"option":true},"key_code":49}"#,
        )
        .unwrap();

        let settings = config.load_hotkey_settings().unwrap();
        assert!(settings.modifiers.command && settings.modifiers.option);
        assert_eq!(settings.key_code.map(|k| k.0), Some(49));

        std::fs::write(&config.settings_path, "not json").unwrap();
        assert!(config.load_hotkey_settings().is_err());
    }
}
