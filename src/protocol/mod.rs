pub mod checksum;
pub mod frame;
pub mod varint;
