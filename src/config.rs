use std::time::Duration;

use anyhow::bail;
use serde::Deserialize;

/// Everything the gateway needs, loaded from one YAML file. Timeouts and
/// cooldowns are plain seconds in the file; the accessor methods hand out
/// [Duration]s.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    /// identifier sent in the login frame; the server uses it to attribute
    /// everything on this connection
    pub device_id: String,
    #[serde(default)]
    pub keep_alive: KeepAliveConfig,
    pub position: PositionConfig,
    pub snapshot: SnapshotConfig,
    pub gpsd: GpsdConfig,
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// `host:port` of the tracking server
    pub address: String,
    /// wait between reconnect attempts
    #[serde(default = "default_reconnect_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,
    /// how long a consumer waits for the ack of one data frame before
    /// dropping the item
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeepAliveConfig {
    #[serde(default = "default_keep_alive_cooldown_secs")]
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionConfig {
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// filter: a fix is forwarded once this much time has passed since the
    /// last forwarded one, regardless of movement
    pub deadline_secs: f64,
    /// filter: a fix displaced by at least this many meters is forwarded
    /// immediately
    pub distance_meters: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// wait between camera captures
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GpsdConfig {
    /// `host:port` of the gpsd endpoint
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// RTSP url of the camera
    pub path: String,
    #[serde(default = "default_rtsp_transport")]
    pub transport: String,
}

fn default_reconnect_cooldown_secs() -> u64 { 10 }
fn default_login_timeout_secs() -> u64 { 60 }
fn default_ack_timeout_secs() -> u64 { 30 }
fn default_keep_alive_cooldown_secs() -> u64 { 30 }
fn default_queue_size() -> usize { 256 }
fn default_rtsp_transport() -> String { "tcp".to_string() }

impl Default for KeepAliveConfig {
    fn default() -> KeepAliveConfig {
        KeepAliveConfig {
            cooldown_secs: default_keep_alive_cooldown_secs(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.address.is_empty() {
            bail!("server address must not be empty");
        }
        if self.device_id.is_empty() {
            bail!("device id must not be empty");
        }
        if self.position.queue_size == 0 || self.snapshot.queue_size == 0 {
            bail!("queue sizes must be at least 1");
        }
        if self.position.deadline_secs < 0.0 || self.position.distance_meters < 0.0 {
            bail!("position filter thresholds must not be negative");
        }
        if self.gpsd.address.is_empty() {
            bail!("gpsd address must not be empty");
        }
        if self.camera.path.is_empty() {
            bail!("camera path must not be empty");
        }
        Ok(())
    }
}

impl ServerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

impl KeepAliveConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl PositionConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs_f64(self.deadline_secs)
    }
}

impl SnapshotConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}
