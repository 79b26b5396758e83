//! TOML-based configuration persistence for a mentor-assist client.
//!
//! Reads and writes `AssistConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\MentorAssist\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/mentor-assist/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/MentorAssist/config.toml`
//!
//! Example file:
//!
//! ```toml
//! [session]
//! display_name = "Ms. Rivera"
//! role = "mentor"
//! room = "family"
//! log_level = "info"
//!
//! [mirror]
//! cursor_throttle_ms = 16
//! cursor_timeout_ms = 3000
//!
//! [desktop]
//! request_webcam = false
//! negotiation_timeout_ms = 15000
//! ```
//!
//! Every field has a `#[serde(default = "...")]`, so a missing file or a file
//! written by an older version still loads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mentor_core::Role;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::session_facade::SessionSettings;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AssistConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub desktop: DesktopConfig,
}

/// Identity of this client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Name shown to the other side (e.g. in the consent prompt).
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Fixed for the lifetime of a session.
    #[serde(default = "default_role")]
    pub role: Role,
    /// Signaling room both clients join.
    #[serde(default = "default_room")]
    pub room: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Input mirroring and ghost cursor timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MirrorConfig {
    /// Minimum spacing between two published cursor moves.
    #[serde(default = "default_cursor_throttle_ms")]
    pub cursor_throttle_ms: u64,
    /// Inactivity period after which the ghost cursor hides.
    #[serde(default = "default_cursor_timeout_ms")]
    pub cursor_timeout_ms: u64,
}

/// Remote desktop negotiation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesktopConfig {
    /// Also exchange webcam video in both directions.
    #[serde(default)]
    pub request_webcam: bool,
    #[serde(default = "default_negotiation_timeout_ms")]
    pub negotiation_timeout_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_display_name() -> String {
    "Mentor".to_string()
}
fn default_role() -> Role {
    Role::Mentor
}
fn default_room() -> String {
    "family".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cursor_throttle_ms() -> u64 {
    16
}
fn default_cursor_timeout_ms() -> u64 {
    3000
}
fn default_negotiation_timeout_ms() -> u64 {
    15_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            role: default_role(),
            room: default_room(),
            log_level: default_log_level(),
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            cursor_throttle_ms: default_cursor_throttle_ms(),
            cursor_timeout_ms: default_cursor_timeout_ms(),
        }
    }
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            request_webcam: false,
            negotiation_timeout_ms: default_negotiation_timeout_ms(),
        }
    }
}

impl AssistConfig {
    /// Converts the on-disk representation into runtime settings.
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            cursor_throttle: Duration::from_millis(self.mirror.cursor_throttle_ms),
            cursor_timeout: Duration::from_millis(self.mirror.cursor_timeout_ms),
            request_webcam: self.desktop.request_webcam,
            negotiation_timeout: Duration::from_millis(self.desktop.negotiation_timeout_ms),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `AssistConfig` from the platform path, or defaults if absent.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AssistConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AssistConfig` from `path`, returning defaults when the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AssistConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AssistConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AssistConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MentorAssist"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("mentor-assist"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MentorAssist")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("mentor-assist-test-{}", uuid::Uuid::new_v4()))
            .join("config.toml")
    }

    #[test]
    fn test_defaults_match_documented_timings() {
        // Arrange / Act
        let cfg = AssistConfig::default();

        // Assert
        assert_eq!(cfg.mirror.cursor_throttle_ms, 16);
        assert_eq!(cfg.mirror.cursor_timeout_ms, 3000);
        assert_eq!(cfg.desktop.negotiation_timeout_ms, 15_000);
        assert!(!cfg.desktop.request_webcam);
        assert_eq!(cfg.session.log_level, "info");
    }

    #[test]
    fn test_partial_file_fills_missing_fields_with_defaults() {
        let cfg: AssistConfig = toml::from_str(
            r#"
            [session]
            display_name = "Sam"
            role = "child"
            "#,
        )
        .expect("deserialize");

        assert_eq!(cfg.session.role, Role::Child);
        assert_eq!(cfg.session.room, "family");
        assert_eq!(cfg.mirror, MirrorConfig::default());
    }

    #[test]
    fn test_settings_convert_milliseconds() {
        let mut cfg = AssistConfig::default();
        cfg.mirror.cursor_timeout_ms = 1500;
        cfg.desktop.request_webcam = true;

        let settings = cfg.settings();

        assert_eq!(settings.cursor_timeout, Duration::from_millis(1500));
        assert_eq!(settings.cursor_throttle, Duration::from_millis(16));
        assert!(settings.request_webcam);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let cfg = load_config_from(&scratch_path()).expect("defaults");
        assert_eq!(cfg, AssistConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        // Arrange
        let path = scratch_path();
        let mut cfg = AssistConfig::default();
        cfg.session.display_name = "Grandpa Joe".into();
        cfg.session.role = Role::Mentor;
        cfg.desktop.request_webcam = true;

        // Act
        save_config_to(&cfg, &path).expect("save");
        let restored = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(restored, cfg);
        let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let path = scratch_path();
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "[session\nrole = ").expect("write");

        let result = load_config_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
    }
}
