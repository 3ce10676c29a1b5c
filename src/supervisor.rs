use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::connection::Connection;
use crate::filter::PositionFilter;
use crate::protocol::frame::PositionFix;
use crate::queue::{FifoQueue, RecencyQueue, Taken};
use crate::sources::{PositionSource, Snapshot, SnapshotSource};

/// wait after a failed source call before trying again
const PRODUCER_ERROR_COOLDOWN: Duration = Duration::from_secs(3);

/// The three queues between producers and consumers. They are created once
/// and outlive any single connection: producers keep filling them while the
/// link is down, with the recency queues shedding their oldest entries.
pub struct Queues {
    pub keep_alives: Arc<FifoQueue<()>>,
    pub positions: Arc<RecencyQueue<PositionFix>>,
    pub snapshots: Arc<RecencyQueue<Snapshot>>,
}

impl Queues {
    pub fn new(config: &Config) -> Queues {
        Queues {
            keep_alives: Arc::new(FifoQueue::new(1)),
            positions: Arc::new(RecencyQueue::new(config.position.queue_size)),
            snapshots: Arc::new(RecencyQueue::new(config.snapshot.queue_size)),
        }
    }
}

/// The per-connection consumer tasks. `stop` must complete even with sends
/// mid-flight: interruption only affects queue consumption, never an
/// in-progress socket write.
pub struct Workers {
    keep_alives: Arc<FifoQueue<()>>,
    positions: Arc<RecencyQueue<PositionFix>>,
    snapshots: Arc<RecencyQueue<Snapshot>>,
    handles: Vec<JoinHandle<()>>,
}

pub fn start_workers(connection: &Arc<Connection>, queues: &Queues, config: &Config) -> Workers {
    let ack_timeout = config.server.ack_timeout();
    let filter = PositionFilter::new(config.position.deadline(), config.position.distance_meters);

    let handles = vec![
        tokio::spawn(keep_alive_consumer(queues.keep_alives.clone(), connection.clone())),
        tokio::spawn(position_consumer(queues.positions.clone(), connection.clone(), filter, ack_timeout)),
        tokio::spawn(snapshot_consumer(queues.snapshots.clone(), connection.clone(), ack_timeout)),
    ];

    Workers {
        keep_alives: queues.keep_alives.clone(),
        positions: queues.positions.clone(),
        snapshots: queues.snapshots.clone(),
        handles,
    }
}

impl Workers {
    pub async fn stop(self) {
        self.keep_alives.interrupt();
        self.positions.interrupt();
        self.snapshots.interrupt();

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("consumer task failed: {}", e);
            }
        }
        debug!("all consumers stopped");
    }
}

async fn keep_alive_consumer(queue: Arc<FifoQueue<()>>, connection: Arc<Connection>) {
    loop {
        match queue.take().await {
            Taken::Interrupted => return,
            Taken::Value(()) => {
                if let Err(e) = connection.send_keep_alive().await {
                    debug!("keep-alive send failed: {:#}", e);
                }
            }
        }
    }
}

async fn position_consumer(
    queue: Arc<RecencyQueue<PositionFix>>,
    connection: Arc<Connection>,
    mut filter: PositionFilter,
    ack_timeout: Duration,
) {
    loop {
        match queue.take().await {
            Taken::Interrupted => return,
            Taken::Value(entry) => {
                let fix = entry.value();
                if filter.admit(fix) {
                    if let Err(e) = send_position(&connection, fix, ack_timeout).await {
                        // no retry: the entry is gone once the borrow ends
                        warn!("position fix dropped: {:#}", e);
                    }
                }
            }
        }
    }
}

async fn snapshot_consumer(
    queue: Arc<RecencyQueue<Snapshot>>,
    connection: Arc<Connection>,
    ack_timeout: Duration,
) {
    loop {
        match queue.take().await {
            Taken::Interrupted => return,
            Taken::Value(entry) => {
                let snapshot = entry.value();
                if let Err(e) = send_snapshot(&connection, snapshot, ack_timeout).await {
                    warn!("snapshot dropped: {:#}", e);
                }
            }
        }
    }
}

async fn send_position(connection: &Connection, fix: &PositionFix, ack_timeout: Duration) -> anyhow::Result<()> {
    let future = connection.send_position(fix.timestamp as u32, fix).await?;
    future.wait(ack_timeout).await?;
    Ok(())
}

async fn send_snapshot(connection: &Connection, snapshot: &Snapshot, ack_timeout: Duration) -> anyhow::Result<()> {
    let future = connection.send_snapshot(snapshot.timestamp as u32, &snapshot.image).await?;
    future.wait(ack_timeout).await?;
    Ok(())
}

/// Ticks the keep-alive queue. The queue's capacity of one gives natural
/// backpressure: while nobody consumes, the ticker simply blocks.
pub async fn produce_keep_alives(queue: Arc<FifoQueue<()>>, cooldown: Duration) {
    loop {
        queue.put(()).await;
        sleep(cooldown).await;
    }
}

pub async fn produce_positions(queue: Arc<RecencyQueue<PositionFix>>, mut source: impl PositionSource) {
    loop {
        match source.next_fix().await {
            Ok(fix) => queue.put(fix),
            Err(e) => {
                error!("position source failure: {:#}", e);
                sleep(PRODUCER_ERROR_COOLDOWN).await;
            }
        }
    }
}

pub async fn produce_snapshots(queue: Arc<RecencyQueue<Snapshot>>, mut source: impl SnapshotSource, cooldown: Duration) {
    loop {
        match source.next_snapshot().await {
            Ok(snapshot) => queue.put(snapshot),
            Err(e) => error!("snapshot source failure: {:#}", e),
        }
        sleep(cooldown).await;
    }
}
