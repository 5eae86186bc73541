use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Nordic UART service exposed by the remote.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);
/// Characteristic the app writes song lines to.
pub const WRITE_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E);
/// Characteristic the remote notifies control lines on.
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);

pub const DEVICE_NAME: &str = "JuiceBox Remote";
pub const PRIMARY_KEYWORD: &str = "juicebox";
pub const FALLBACK_KEYWORD: &str = "juice";

/// Smallest write every BLE link accepts (default ATT MTU minus header).
pub const MIN_WRITE_LENGTH: usize = 20;

/// Tunable timings and thresholds of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(with = "millis")]
    pub send_debounce: Duration,
    #[serde(with = "millis")]
    pub min_send_interval: Duration,
    #[serde(with = "millis")]
    pub scan_fallback: Duration,
    #[serde(with = "millis")]
    pub scan_coalesce: Duration,
    #[serde(with = "millis")]
    pub watchdog_timeout: Duration,
    /// Stalls after which a remembered identity is forgotten.
    pub stall_threshold: u32,
    /// Partial-progress watchdog extensions allowed per connection attempt.
    pub max_watchdog_extensions: u32,
    pub fallback_write_length: usize,
    pub primary_keyword: String,
    pub fallback_keyword: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            send_debounce: Duration::from_millis(150),
            min_send_interval: Duration::from_millis(500),
            scan_fallback: Duration::from_secs(5),
            scan_coalesce: Duration::from_secs(1),
            watchdog_timeout: Duration::from_secs(15),
            stall_threshold: 2,
            max_watchdog_extensions: 3,
            fallback_write_length: MIN_WRITE_LENGTH,
            primary_keyword: PRIMARY_KEYWORD.to_owned(),
            fallback_keyword: FALLBACK_KEYWORD.to_owned(),
        }
    }
}

impl Config {
    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", path.display(), e))?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
