use anyhow::bail;
use bytes::{Buf, BufMut};
use bytes_varint::try_get_fixed::TryGetFixedSupport;

/// Two-width variable-length unsigned integers, parameterized by a base width
/// of 1, 2 or 4 bytes.
///
/// A value that fits in `8n-1` bits is written as `n` big-endian bytes with
/// the top bit clear. Anything larger (up to `16n-1` bits) is written as `2n`
/// big-endian bytes with the top bit set. The top bit of the first byte is
/// all a reader needs to tell the two forms apart.
pub fn put_var(buf: &mut impl BufMut, value: u64, width: usize) -> anyhow::Result<()> {
    check_width(width)?;

    let short_limit = 1u64 << (8 * width - 1);
    let extension_flag = 1u64 << (16 * width - 1);

    if value < short_limit {
        put_uint(buf, value, width)
    }
    else if value < extension_flag {
        put_uint(buf, extension_flag | value, 2 * width)
    }
    else {
        bail!("value {} does not fit in a varint of base width {}", value, width);
    }
}

pub fn try_get_var(buf: &mut impl Buf, width: usize) -> anyhow::Result<u64> {
    check_width(width)?;

    let short = try_get_uint(buf, width)?;
    if short & (1u64 << (8 * width - 1)) == 0 {
        return Ok(short);
    }

    // the short form's flag bit ends up at position 16n-1 after shifting
    let tail = try_get_uint(buf, width)?;
    let combined = (short << (8 * width)) | tail;
    Ok(combined ^ (1u64 << (16 * width - 1)))
}

/// Whether the first byte of an encoded varint announces the extended form.
pub fn is_extended(first_byte: u8) -> bool {
    first_byte & 0x80 != 0
}

fn check_width(width: usize) -> anyhow::Result<()> {
    match width {
        1 | 2 | 4 => Ok(()),
        _ => bail!("unsupported varint base width {}", width),
    }
}

fn put_uint(buf: &mut impl BufMut, value: u64, len: usize) -> anyhow::Result<()> {
    match len {
        1 => buf.put_u8(value as u8),
        2 => buf.put_u16(value as u16),
        4 => buf.put_u32(value as u32),
        8 => buf.put_u64(value),
        _ => bail!("unsupported integer width {}", len),
    }
    Ok(())
}

fn try_get_uint(buf: &mut impl Buf, len: usize) -> anyhow::Result<u64> {
    let value = match len {
        1 => buf.try_get_u8()? as u64,
        2 => buf.try_get_u16()? as u64,
        4 => buf.try_get_u32()? as u64,
        _ => bail!("unsupported integer width {}", len),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::w1_zero(0, 1, Some(vec![0x00]))]
    #[case::w1_short_max(0x7f, 1, Some(vec![0x7f]))]
    #[case::w1_extended_min(0x80, 1, Some(vec![0x80, 0x80]))]
    #[case::w1_extended(0x1234, 1, Some(vec![0x92, 0x34]))]
    #[case::w1_extended_max(0x7fff, 1, Some(vec![0xff, 0xff]))]
    #[case::w1_too_big(0x8000, 1, None)]
    #[case::w2_short(0x00a5, 2, Some(vec![0x00, 0xa5]))]
    #[case::w2_short_max(0x7fff, 2, Some(vec![0x7f, 0xff]))]
    #[case::w2_extended(0x8000, 2, Some(vec![0x80, 0x00, 0x80, 0x00]))]
    #[case::w2_extended_max(0x7fff_ffff, 2, Some(vec![0xff, 0xff, 0xff, 0xff]))]
    #[case::w2_too_big(0x8000_0000, 2, None)]
    #[case::w4_short(3, 4, Some(vec![0x00, 0x00, 0x00, 0x03]))]
    #[case::w4_extended(0x8000_0000, 4, Some(vec![0x80, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00]))]
    fn test_put_var(#[case] value: u64, #[case] width: usize, #[case] expected: Option<Vec<u8>>) {
        let mut buf = BytesMut::new();
        match put_var(&mut buf, value, width) {
            Ok(()) => assert_eq!(buf.as_ref(), expected.unwrap().as_slice()),
            Err(e) => {
                println!("{}", e);
                assert!(expected.is_none());
            }
        }
    }

    #[rstest]
    #[case::w1_short(vec![0x7f], 1, Some(0x7f), 0)]
    #[case::w1_extended(vec![0x92, 0x34], 1, Some(0x1234), 0)]
    #[case::w1_remainder(vec![0x05, 0xaa], 1, Some(0x05), 1)]
    #[case::w2_short(vec![0x7f, 0xff, 0x01], 2, Some(0x7fff), 1)]
    #[case::w2_extended(vec![0x80, 0x00, 0x80, 0x00], 2, Some(0x8000), 0)]
    #[case::w2_truncated(vec![0x80, 0x00, 0x80], 2, None, 0)]
    #[case::w1_truncated(vec![], 1, None, 0)]
    fn test_try_get_var(#[case] bytes: Vec<u8>, #[case] width: usize, #[case] expected: Option<u64>, #[case] remaining: usize) {
        let mut buf = bytes.as_slice();
        match try_get_var(&mut buf, width) {
            Ok(actual) => {
                assert_eq!(actual, expected.unwrap());
                assert_eq!(buf.len(), remaining);
            }
            Err(e) => {
                println!("{}", e);
                assert!(expected.is_none());
            }
        }
    }

    #[rstest]
    #[case::w1(1)]
    #[case::w2(2)]
    #[case::w4(4)]
    fn test_round_trip_boundaries(#[case] width: usize) {
        let short_limit = 1u64 << (8 * width - 1);
        let extended_limit = 1u64 << (16 * width - 1);

        for value in [0, 1, short_limit - 1, short_limit, extended_limit - 1] {
            let mut buf = BytesMut::new();
            put_var(&mut buf, value, width).unwrap();
            assert_eq!(try_get_var(&mut buf.freeze(), width).unwrap(), value);
        }

        let mut buf = BytesMut::new();
        assert!(put_var(&mut buf, extended_limit, width).is_err());
    }

    #[rstest]
    #[case::short(vec![0x42], false)]
    #[case::extended(vec![0x80], true)]
    #[case::extended_high(vec![0xff], true)]
    fn test_is_extended(#[case] bytes: Vec<u8>, #[case] expected: bool) {
        assert_eq!(is_extended(bytes[0]), expected);
    }

    #[rstest]
    #[case::w3(3)]
    #[case::w8(8)]
    #[case::w0(0)]
    fn test_unsupported_width(#[case] width: usize) {
        let mut buf = BytesMut::new();
        assert!(put_var(&mut buf, 1, width).is_err());
        assert!(try_get_var(&mut &[0u8; 16][..], width).is_err());
    }
}
