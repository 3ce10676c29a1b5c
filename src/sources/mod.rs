pub mod camera;
pub mod gpsd;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;

use crate::protocol::frame::PositionFix;

/// One captured still image, stamped with its capture time (epoch seconds).
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub timestamp: f64,
    pub image: Bytes,
}

/// Opaque producer of position fixes. A call may block for as long as it
/// takes and may reconnect to its backend internally; an error means "no fix
/// this time", never "give up".
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PositionSource: Send {
    async fn next_fix(&mut self) -> anyhow::Result<PositionFix>;
}

/// Opaque producer of snapshots, same contract as [PositionSource].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SnapshotSource: Send {
    async fn next_snapshot(&mut self) -> anyhow::Result<Snapshot>;
}
