use std::fmt::{Debug, Formatter};

use crc::Crc;

/// 16-bit CRC trailing every frame except the bare keep-alive. The server
/// computes it over the exact bytes starting at the frame header, so any
/// corruption in header, length prefix or payload is caught.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Checksum(pub u16);

impl Debug for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x?}", self.0)
    }
}

impl Checksum {
    pub fn of(data: &[u8]) -> Checksum {
        let hasher = Crc::<u16>::new(&crc::CRC_16_ARC);
        let mut digest = hasher.digest();
        digest.update(data);
        Checksum(digest.finalize())
    }
}
