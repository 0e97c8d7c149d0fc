//! Runtime configuration
//!
//! Loaded from JSON. Every field has a default, so an empty object is a
//! valid configuration. Durations are written the human way ("15s",
//! "2m 30s").

use std::path::Path;
use std::time::Duration;

use forma_core::{FormaError, FormaResult};
use forma_motion::{Mode, ProfileTable, ThresholdProfile};
use serde::{Deserialize, Serialize};

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// FORMA runtime configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Mode used when a session is opened without one
    pub default_mode: Mode,
    /// Maximum concurrently open sessions
    pub max_sessions: usize,
    /// Finished-session summaries kept in memory
    pub history_capacity: usize,
    /// Also keep summaries of sessions that counted no rep
    pub keep_empty_sessions: bool,
    /// Frame / report channel depth per session worker
    pub channel_capacity: usize,
    /// Sessions receiving no frame for this long are closed by the reaper
    #[serde(with = "human_duration")]
    pub idle_timeout: Duration,
    /// Logging
    pub log: LogConfig,
    /// Tuned profiles replacing the built-in ones
    pub profiles: Vec<ThresholdProfile>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            default_mode: Mode::Beginner,
            max_sessions: 64,
            history_capacity: 100,
            keep_empty_sessions: false,
            channel_capacity: 8,
            idle_timeout: Duration::from_secs(60),
            log: LogConfig::default(),
            profiles: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Parse from a JSON string and validate
    pub fn from_json(json: &str) -> FormaResult<Self> {
        let config: RuntimeConfig =
            serde_json::from_str(json).map_err(|e| FormaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file and validate
    pub fn load(path: impl AsRef<Path>) -> FormaResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FormaError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }

    pub fn to_json(&self) -> FormaResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| FormaError::Config(e.to_string()))
    }

    pub fn validate(&self) -> FormaResult<()> {
        if self.max_sessions == 0 {
            return Err(FormaError::Config("max_sessions must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(FormaError::Config("channel_capacity must be at least 1".into()));
        }
        if self.idle_timeout.is_zero() {
            return Err(FormaError::Config("idle_timeout must be positive".into()));
        }
        for profile in &self.profiles {
            profile.validate()?;
        }
        Ok(())
    }

    /// Built-in profiles with this configuration's overrides applied
    pub fn profile_table(&self) -> FormaResult<ProfileTable> {
        ProfileTable::with_overrides(self.profiles.iter().cloned())
    }
}

mod human_duration {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(d)?;
        humantime::parse_duration(&text).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        RuntimeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_parse_human_durations_and_mode() {
        let config = RuntimeConfig::from_json(
            r#"{ "default_mode": "pro", "idle_timeout": "2m 30s", "log": { "json": true } }"#,
        )
        .unwrap();
        assert_eq!(config.default_mode, Mode::Pro);
        assert_eq!(config.idle_timeout, Duration::from_secs(150));
        assert!(config.log.json);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            RuntimeConfig::from_json(r#"{ "max_sessions": 0 }"#),
            Err(FormaError::Config(_))
        ));
        assert!(RuntimeConfig::from_json(r#"{ "idle_timeout": "soon" }"#).is_err());
        assert!(RuntimeConfig::from_json(r#"{ "default_mode": "expert" }"#).is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = RuntimeConfig::default();
        config.profiles.push(ThresholdProfile::pro());
        let back = RuntimeConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_invalid_profile_override_rejected() {
        let mut config = RuntimeConfig::default();
        let mut broken = ThresholdProfile::beginner();
        broken.min_confidence = 2.0;
        config.profiles.push(broken);
        assert!(matches!(config.validate(), Err(FormaError::InvalidProfile(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forma.json");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{ "max_sessions": 4 }}"#).unwrap();

        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.max_sessions, 4);
        assert!(RuntimeConfig::load(dir.path().join("missing.json")).is_err());
    }
}
