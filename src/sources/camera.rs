use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::debug;

use super::{Snapshot, SnapshotSource};

/// Grabs one still frame per call from an RTSP camera by running ffmpeg with
/// the JPEG written to its stdout.
pub struct FfmpegCamera {
    path: String,
    transport: String,
}

impl FfmpegCamera {
    pub fn new(path: String, transport: String) -> FfmpegCamera {
        FfmpegCamera { path, transport }
    }
}

#[async_trait]
impl SnapshotSource for FfmpegCamera {
    async fn next_snapshot(&mut self) -> anyhow::Result<Snapshot> {
        let output = Command::new("ffmpeg")
            .args([
                "-rtsp_transport", &self.transport,
                "-i", &self.path,
                "-vframes", "1",
                "-r", "1",
                "-f", "singlejpeg",
                "pipe:1",
            ])
            .output().await
            .context("failed to run ffmpeg")?;

        if !output.status.success() {
            bail!("ffmpeg exited with {}: {}", output.status, String::from_utf8_lossy(&output.stderr).trim());
        }

        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs_f64();
        debug!("captured a {} byte snapshot", output.stdout.len());

        Ok(Snapshot {
            timestamp,
            image: Bytes::from(output.stdout),
        })
    }
}
