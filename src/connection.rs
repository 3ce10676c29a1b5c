use std::sync::{Arc, Mutex};

use anyhow::bail;
use bytes::{BufMut, BytesMut};
use rustc_hash::FxHashMap;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::ack::{ack_channel, AckFuture, AckPromise};
use crate::error::SendError;
use crate::protocol::checksum::Checksum;
use crate::protocol::frame::{self, PositionFix};
use crate::protocol::varint;

/// One TCP connection to the tracking server.
///
/// Constructed on a successful connect, at which point a background reader
/// task starts demultiplexing server replies; `closed` is terminal and fails
/// every outstanding ack future. There is no resurrection - reconnecting
/// means constructing a new `Connection`.
///
/// Sequence numbers cycle through the full u16 range; they are unique as long
/// as fewer than 65536 acks are outstanding at once, which is accepted as a
/// design bound rather than enforced. A pending entry whose caller stopped
/// waiting is reaped when the matching ack arrives or at close, never on the
/// timeout itself.
pub struct Connection {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Mutex<PendingAcks>,
    closed: CancellationToken,
}

struct PendingAcks {
    next_seq: u16,
    by_seq: FxHashMap<u16, AckPromise>,
}

impl Connection {
    pub async fn connect(addr: &str) -> anyhow::Result<Arc<Connection>> {
        let stream = TcpStream::connect(addr).await?;
        info!("connected to {}", addr);

        let (read_half, write_half) = stream.into_split();
        let connection = Arc::new(Connection {
            writer: tokio::sync::Mutex::new(write_half),
            pending: Mutex::new(PendingAcks {
                next_seq: 0,
                by_seq: FxHashMap::default(),
            }),
            closed: CancellationToken::new(),
        });

        tokio::spawn(run_reader(connection.clone(), BufReader::new(read_half)));
        Ok(connection)
    }

    pub fn is_active(&self) -> bool {
        !self.closed.is_cancelled()
    }

    pub async fn wait_for_close(&self) {
        self.closed.cancelled().await
    }

    /// Idempotent and safe to call from any task, any number of times,
    /// concurrently with sends and reads in flight. Fails every outstanding
    /// ack future with [SendError::Closed].
    pub fn close(&self) {
        self.closed.cancel();

        let pending = {
            let mut pending = self.pending.lock().unwrap();
            pending.by_seq.drain().collect::<Vec<_>>()
        };
        for (_, promise) in pending {
            promise.fail(SendError::Closed);
        }
    }

    pub async fn send_login(&self, device_id: &str) -> anyhow::Result<AckFuture> {
        let seq = self.next_seq();
        let frame = frame::login_frame(seq, device_id)?;
        let future = self.register_ack(seq);
        self.write_frame(&frame).await?;
        Ok(future)
    }

    pub async fn send_position(&self, timestamp: u32, fix: &PositionFix) -> anyhow::Result<AckFuture> {
        let seq = self.next_seq();
        let frame = frame::position_frame(seq, timestamp, fix)?;
        let future = self.register_ack(seq);
        trace!("sending position fix, seq {}", seq);
        self.write_frame(&frame).await?;
        Ok(future)
    }

    pub async fn send_snapshot(&self, timestamp: u32, image: &[u8]) -> anyhow::Result<AckFuture> {
        let seq = self.next_seq();
        let frame = frame::snapshot_frame(seq, timestamp, image)?;
        let future = self.register_ack(seq);
        trace!("sending snapshot of {} bytes, seq {}", image.len(), seq);
        self.write_frame(&frame).await?;
        Ok(future)
    }

    /// Keep-alives go through the regular write path with a sequence number
    /// of their own, but no pending ack is registered for them: the server's
    /// generic ack is discarded by the unmatched-sequence rule.
    pub async fn send_keep_alive(&self) -> anyhow::Result<()> {
        let seq = self.next_seq();
        let frame = frame::keep_alive_frame(seq)?;
        self.write_frame(&frame).await?;
        Ok(())
    }

    fn next_seq(&self) -> u16 {
        let mut pending = self.pending.lock().unwrap();
        let seq = pending.next_seq;
        pending.next_seq = pending.next_seq.wrapping_add(1);
        seq
    }

    fn register_ack(&self, seq: u16) -> AckFuture {
        let (promise, future) = ack_channel();
        let mut pending = self.pending.lock().unwrap();
        if self.closed.is_cancelled() {
            // close() has already drained the table; an entry added now would
            // never be reaped
            promise.fail(SendError::Closed);
        }
        else {
            pending.by_seq.insert(seq, promise);
        }
        future
    }

    fn resolve_ack(&self, seq: u16, code: u8) {
        let promise = self.pending.lock().unwrap().by_seq.remove(&seq);
        match promise {
            Some(promise) if code == 0 => promise.resolve(),
            Some(promise) => promise.fail(SendError::Rejected(code)),
            // the caller timed out and walked away, or this acks a keep-alive
            None => trace!("ack for unmatched sequence {} - discarding", seq),
        }
    }

    /// Serializes concurrent writers onto the one socket so frames never
    /// interleave. A write failure is fatal to the connection.
    async fn write_frame(&self, frame: &[u8]) -> Result<(), SendError> {
        if self.closed.is_cancelled() {
            return Err(SendError::Closed);
        }
        let mut writer = self.writer.lock().await;
        if self.closed.is_cancelled() {
            return Err(SendError::Closed);
        }
        if let Err(e) = writer.write_all(frame).await {
            drop(writer);
            debug!("socket write failed: {}", e);
            self.close();
            return Err(SendError::Closed);
        }
        Ok(())
    }
}

async fn run_reader(connection: Arc<Connection>, mut reader: BufReader<OwnedReadHalf>) {
    let result = select! {
        _ = connection.closed.cancelled() => Ok(()),
        result = read_loop(&connection, &mut reader) => result,
    };
    if let Err(e) = result {
        if connection.is_active() {
            warn!("connection failure: {:#}", e);
        }
    }
    connection.close();
}

async fn read_loop(connection: &Connection, reader: &mut BufReader<OwnedReadHalf>) -> anyhow::Result<()> {
    loop {
        let mut header = [0u8; 3];
        reader.read_exact(&mut header).await?;

        let magic = u16::from_be_bytes([header[0], header[1]]);
        if magic != frame::SERVER_MAGIC {
            bail!("unexpected frame magic {:#06x}", magic);
        }

        let code = header[2];
        if code == frame::COMMAND_CODE {
            read_command(reader, &header).await?;
        }
        else if code <= frame::MAX_ACK_CODE {
            let seq = reader.read_u16().await?;
            connection.resolve_ack(seq, code);
        }
        else {
            bail!("unrecognized reply code {}", code);
        }
    }
}

/// Sideband command from the server. The client has no use for its content,
/// but it is integrity-checked: a malformed or corrupted command frame is
/// fatal to the connection.
async fn read_command(reader: &mut BufReader<OwnedReadHalf>, header: &[u8; 3]) -> anyhow::Result<()> {
    let mut checked = BytesMut::from(&header[..]);

    let _body_len = read_var(reader, 2, &mut checked).await?;

    // shape-checked only: four bytes must be there, the value is not used
    let mut timestamp = [0u8; 4];
    reader.read_exact(&mut timestamp).await?;
    checked.put_slice(&timestamp);

    let sub_type = read_var(reader, 1, &mut checked).await?;
    if sub_type != frame::COMMAND_SUB_TYPE {
        bail!("unexpected command sub-type {}", sub_type);
    }

    let mut data = Vec::new();
    if reader.read_until(b'\n', &mut data).await? == 0 {
        bail!("connection closed inside a command frame");
    }
    checked.put_slice(&data);

    let received = reader.read_u16().await?;
    let computed = Checksum::of(&checked);
    if received != computed.0 {
        bail!("command checksum mismatch: received {:04x?}, computed {:?}", received, computed);
    }

    debug!("sideband command of {} bytes received - nothing to do", data.len());
    Ok(())
}

/// Reads one two-width varint off the socket, appending its raw bytes to
/// `checked` so the caller can checksum the exact wire representation.
async fn read_var(reader: &mut BufReader<OwnedReadHalf>, width: usize, checked: &mut BytesMut) -> anyhow::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf[..width]).await?;

    let len = if varint::is_extended(buf[0]) {
        reader.read_exact(&mut buf[width..2 * width]).await?;
        2 * width
    }
    else {
        width
    };

    checked.put_slice(&buf[..len]);
    varint::try_get_var(&mut &buf[..len], width)
}
