use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde_derive::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub room: RoomConfig,
    pub poll: Option<PollConfig>,
    pub transport: Option<TransportConfig>,
    pub reader: Option<ReaderConfig>,
    pub mqtt: Option<MqttConfig>,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::de::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll
                .as_ref()
                .and_then(|p| p.interval_ms)
                .unwrap_or(500),
        )
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RoomConfig {
    pub id: String,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct PollConfig {
    pub interval_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct TransportConfig {
    /// Serial device or file the collector link is written to. Stdout if unset.
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReaderKind {
    /// MFRC522 on SPI
    Mfrc522,
    /// Recorded probe script
    Replay,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ReaderConfig {
    pub kind: Option<ReaderKind>,
    pub script: Option<PathBuf>,
    pub repeat: Option<bool>,
    pub spi_bus: Option<u8>,
    pub slave_select: Option<u8>,
    pub clock_hz: Option<u32>,
    /// BCM number of the pin wired to the chip's reset line
    pub reset_pin: Option<u8>,
}

impl ReaderConfig {
    /// Replay when a script is configured, the chip otherwise.
    pub fn kind(&self) -> ReaderKind {
        self.kind.unwrap_or(if self.script.is_some() {
            ReaderKind::Replay
        } else {
            ReaderKind::Mfrc522
        })
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    pub topic_path: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}
