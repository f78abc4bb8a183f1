//! Link configuration shared by transport implementations.

use handbus_core::SlaveId;
use handbus_core::constants::{DEFAULT_BAUD_RATE, DEFAULT_RESPONSE_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serial link settings.
///
/// The frame format is fixed at 8 data bits, no parity, 1 stop bit; only the
/// values below are configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Serial device path (e.g. `/dev/ttyUSB0`, `COM8`).
    pub port: String,

    /// Baud rate in bits per second.
    pub baud_rate: u32,

    /// Modbus slave address of the hand.
    pub slave_id: SlaveId,

    /// Time allowed for one transaction to complete.
    pub response_timeout_ms: u64,
}

impl LinkSettings {
    /// Create settings for a port with the default link parameters.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            slave_id: SlaveId::default(),
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_settings_default() {
        let settings = LinkSettings::default();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.slave_id.as_u8(), 1);
        assert_eq!(settings.response_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_link_settings_new_keeps_defaults() {
        let settings = LinkSettings::new("COM8");
        assert_eq!(settings.port, "COM8");
        assert_eq!(settings.baud_rate, 115_200);
    }

    #[test]
    fn test_link_settings_partial_json() {
        let settings: LinkSettings = serde_json::from_str(r#"{"port": "COM5"}"#).unwrap();
        assert_eq!(settings.port, "COM5");
        assert_eq!(settings.slave_id, SlaveId::default());
    }

    #[test]
    fn test_link_settings_rejects_broadcast_slave() {
        let result = serde_json::from_str::<LinkSettings>(r#"{"slave_id": 0}"#);
        assert!(result.is_err());
    }
}
