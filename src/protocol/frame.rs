use bytes::{BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use uuid::Uuid;

use crate::protocol::checksum::Checksum;
use crate::protocol::varint::put_var;

/// first two bytes of every client-origin frame
pub const CLIENT_MAGIC: u16 = 0x2424;
/// first two bytes of every server-origin frame
pub const SERVER_MAGIC: u16 = 0x4040;

/// server reply code marking a sideband command frame rather than an ack
pub const COMMAND_CODE: u8 = 255;
/// highest ack code the server may send: 0 is success, 1..=4 are distinct
/// rejection reasons
pub const MAX_ACK_CODE: u8 = 4;
/// the only command sub-type the client recognizes; anything else is a
/// protocol violation
pub const COMMAND_SUB_TYPE: u64 = 0;

#[derive(Debug, Clone, Copy, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FrameKind {
    Login = 0,
    Data = 1,
    KeepAlive = 2,
}

const LOGIN_PROTOCOL_VERSION: u8 = 1;
const LOGIN_FLAGS: u8 = 0x40;

/// every data frame carries exactly one record
const RECORD_COUNT: u8 = 1;
const RECORD_POSITION: u64 = 1;
const RECORD_SNAPSHOT: u64 = 3;

/// One GPS fix as it comes out of the position source. Latitude / longitude
/// are degrees, speed is m/s, course is degrees clockwise from north,
/// altitude is meters, timestamp is epoch seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub course: f64,
    pub altitude: f64,
    pub satellites_used: u8,
    pub hdop: f64,
}

pub fn login_frame(seq: u16, device_id: &str) -> anyhow::Result<BytesMut> {
    let mut payload = BytesMut::with_capacity(device_id.len() + 5);
    put_var(&mut payload, (2 + device_id.len() + 1) as u64, 2)?;
    payload.put_u8(LOGIN_PROTOCOL_VERSION);
    payload.put_u8(LOGIN_FLAGS);
    payload.put_slice(device_id.as_bytes());
    payload.put_u8(0);
    message_frame(FrameKind::Login, seq, &payload)
}

pub fn position_frame(seq: u16, timestamp: u32, fix: &PositionFix) -> anyhow::Result<BytesMut> {
    let mut record = BytesMut::with_capacity(18);
    put_var(&mut record, RECORD_POSITION, 1)?;
    record.put_i32((fix.latitude * 1_000_000.0) as i32);
    record.put_i32((fix.longitude * 1_000_000.0) as i32);
    record.put_u16(fix.speed as u16);
    record.put_u16(fix.course as u16);
    record.put_u16(fix.altitude as u16);
    record.put_u8(fix.satellites_used);
    record.put_u16(fix.hdop as u16);
    data_frame(seq, timestamp, &record)
}

/// The unique token makes retransmitted snapshots distinguishable on the
/// server side; it is generated here, at frame-build time.
pub fn snapshot_frame(seq: u16, timestamp: u32, image: &[u8]) -> anyhow::Result<BytesMut> {
    let token = Uuid::new_v4().simple().to_string();

    let mut record = BytesMut::with_capacity(image.len() + token.len() + 8);
    put_var(&mut record, RECORD_SNAPSHOT, 1)?;
    put_var(&mut record, 0, 1)?; // frame index: single-frame snapshots only
    put_var(&mut record, image.len() as u64, 2)?;
    put_var(&mut record, 0, 1)?;
    record.put_slice(token.as_bytes());
    record.put_u8(0);
    record.put_slice(image);
    data_frame(seq, timestamp, &record)
}

pub fn keep_alive_frame(seq: u16) -> anyhow::Result<BytesMut> {
    message_frame(FrameKind::KeepAlive, seq, &[])
}

fn data_frame(seq: u16, timestamp: u32, record: &[u8]) -> anyhow::Result<BytesMut> {
    let mut payload = BytesMut::with_capacity(record.len() + 7);
    put_var(&mut payload, (4 + 1 + record.len()) as u64, 2)?;
    payload.put_u32(timestamp);
    payload.put_u8(RECORD_COUNT);
    payload.put_slice(record);
    message_frame(FrameKind::Data, seq, &payload)
}

fn message_frame(kind: FrameKind, seq: u16, payload: &[u8]) -> anyhow::Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(payload.len() + 7);
    buf.put_u16(CLIENT_MAGIC);
    put_var(&mut buf, u8::from(kind) as u64, 1)?;
    buf.put_u16(seq);
    buf.put_slice(payload);
    if kind != FrameKind::KeepAlive {
        let checksum = Checksum::of(&buf);
        buf.put_u16(checksum.0);
    }
    Ok(buf)
}
