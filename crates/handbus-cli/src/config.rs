//! Application configuration.
//!
//! Everything can come from a TOML file; every section is optional and
//! missing fields take their defaults. Command-line flags are applied on top.
//!
//! ```toml
//! [link]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! slave_id = 1
//!
//! [motion]
//! speed = 300
//! force = 300
//!
//! [dispatch]
//! retry_attempts = 2
//!
//! [poller]
//! sample_hz = 10.0
//! auto_clear = true
//!
//! [keys]
//! w = "wave"
//!
//! [[gestures]]
//! name = "wave"
//! steps = [{ targets = [{ finger = "index", value = 0 }] }]
//! ```

use anyhow::{Context, Result, bail};
use handbus_core::check_target;
use handbus_core::constants::{DEFAULT_DEBOUNCE_MS, DEFAULT_READ_TIMEOUT_MS};
use handbus_dispatch::{
    Gesture, GestureLibrary, KeyBindings, PollerConfig, RetryPolicy, WorkerConfig,
};
use handbus_hardware::LinkSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Speed and force limit applied to every finger at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub speed: u16,
    pub force: u16,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed: 300,
            force: 300,
        }
    }
}

/// Queue, worker and key handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long a caller waits for a read's reply.
    pub read_timeout_ms: u64,

    /// Attempts per transaction, including the first.
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,

    /// Pause after each write before the next transaction.
    pub write_cooldown_ms: u64,

    /// Minimum interval between two firings of the same key.
    pub debounce_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            retry_attempts: 1,
            retry_backoff_ms: 50,
            write_cooldown_ms: 0,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl DispatchConfig {
    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            retry: RetryPolicy {
                attempts: self.retry_attempts.max(1),
                backoff: Duration::from_millis(self.retry_backoff_ms),
            },
            write_cooldown: Duration::from_millis(self.write_cooldown_ms),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    pub enabled: bool,
    pub sample_hz: f64,
    pub auto_clear: bool,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_hz: 10.0,
            auto_clear: false,
        }
    }
}

impl PollerSettings {
    pub fn poller(&self) -> PollerConfig {
        PollerConfig::from_rate(self.sample_hz, self.auto_clear)
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkSettings,
    pub motion: MotionConfig,
    pub dispatch: DispatchConfig,
    pub poller: PollerSettings,

    /// Gestures added to, or replacing, the built-in set.
    pub gestures: Vec<Gesture>,

    /// Key to action overrides, e.g. `w = "wave"` or `z = "clear_errors"`.
    pub keys: BTreeMap<String, String>,
}

impl AppConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Load from `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<()> {
        check_target(self.motion.speed).context("motion.speed")?;
        check_target(self.motion.force).context("motion.force")?;
        if self.link.baud_rate == 0 {
            bail!("link.baud_rate must be positive");
        }
        if self.link.response_timeout_ms == 0 {
            bail!("link.response_timeout_ms must be positive");
        }
        if self.poller.enabled && !(self.poller.sample_hz.is_finite() && self.poller.sample_hz > 0.0)
        {
            bail!("poller.sample_hz must be a positive number");
        }
        Ok(())
    }

    /// Built-in gestures with the configured ones merged in.
    pub fn gesture_library(&self) -> Result<GestureLibrary> {
        let mut library = GestureLibrary::builtin();
        for gesture in &self.gestures {
            library
                .insert(gesture.clone())
                .with_context(|| format!("gesture '{}'", gesture.name))?;
        }
        Ok(library)
    }

    /// Default key layout with the configured overrides applied.
    ///
    /// Every gesture a key is bound to must exist in `library`.
    pub fn key_bindings(&self, library: &GestureLibrary) -> Result<KeyBindings> {
        let mut bindings = KeyBindings::default();
        bindings
            .apply_overrides(&self.keys)
            .map_err(anyhow::Error::msg)
            .context("[keys]")?;

        for name in bindings.gesture_names() {
            if !library.contains(name) {
                bail!("key bound to unknown gesture '{name}'");
            }
        }
        Ok(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handbus_core::SlaveId;
    use handbus_dispatch::{Action, Key};
    use std::io::Write;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.motion.speed, 300);
        assert_eq!(config.dispatch.worker().retry.attempts, 1);
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::parse(
            r#"
            [link]
            port = "COM8"
            slave_id = 2

            [dispatch]
            retry_attempts = 2
            retry_backoff_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.link.port, "COM8");
        assert_eq!(config.link.slave_id, SlaveId::new(2).unwrap());
        assert_eq!(config.link.baud_rate, 115_200);

        let worker = config.dispatch.worker();
        assert_eq!(worker.retry.attempts, 2);
        assert_eq!(worker.retry.backoff, Duration::from_millis(50));
        assert_eq!(config.dispatch.debounce(), Duration::from_millis(DEFAULT_DEBOUNCE_MS));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(AppConfig::parse("[motion]\nspeed = 1500").is_err());
        assert!(AppConfig::parse("[link]\nslave_id = 0").is_err());
        assert!(AppConfig::parse("[poller]\nsample_hz = 0.0").is_err());
        assert!(AppConfig::parse("[poller]\nenabled = false\nsample_hz = 0.0").is_ok());
    }

    #[test]
    fn test_custom_gesture_and_key() {
        let config = AppConfig::parse(
            r#"
            [keys]
            w = "wave"
            z = "clear_errors"

            [[gestures]]
            name = "wave"
            steps = [
                { targets = [{ finger = "index", value = 0 }], settle_ms = 200 },
                { targets = [{ finger = "index", value = 1000 }] },
            ]
            "#,
        )
        .unwrap();

        let library = config.gesture_library().unwrap();
        assert!(library.contains("wave"));
        assert!(library.contains("pinch"));

        let bindings = config.key_bindings(&library).unwrap();
        assert_eq!(
            bindings.action_for(Key::Char('w')),
            Some(&Action::Gesture("wave".to_string()))
        );
        assert_eq!(bindings.action_for(Key::Char('z')), Some(&Action::ClearErrors));
        assert_eq!(
            bindings.action_for(Key::Char('g')),
            Some(&Action::Gesture("grip".to_string()))
        );
    }

    #[test]
    fn test_key_for_missing_gesture_rejected() {
        let config = AppConfig::parse("[keys]\nw = \"moonwalk\"").unwrap();
        let library = config.gesture_library().unwrap();

        assert!(config.key_bindings(&library).is_err());
    }

    #[test]
    fn test_invalid_gesture_rejected() {
        let config = AppConfig::parse(
            r#"
            [[gestures]]
            name = "bad"
            steps = [{ targets = [{ finger = "ring", value = 2000 }] }]
            "#,
        )
        .unwrap();

        assert!(config.gesture_library().is_err());
    }

    #[test]
    fn test_gesture_with_empty_final_step_rejected() {
        let config = AppConfig::parse(
            r#"
            [[gestures]]
            name = "half"
            steps = [
                { targets = [{ finger = "little", value = 0 }], settle_ms = 100 },
                { targets = [] },
            ]
            "#,
        )
        .unwrap();

        assert!(config.gesture_library().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[poller]\nauto_clear = true\nsample_hz = 5.0").unwrap();

        let config = AppConfig::load(file.path()).unwrap();

        assert!(config.poller.auto_clear);
        assert_eq!(config.poller.poller().interval, Duration::from_millis(200));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let error = AppConfig::load(&path).unwrap_err();

        assert!(error.to_string().contains("absent.toml"));
        assert_eq!(AppConfig::load_or_default(None).unwrap(), AppConfig::default());
    }
}
