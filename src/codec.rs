//! Field types that don't map onto a plain integer read.
//!
//! Both sondes pack some of their values into 24 bits, and the LMS6-403 uses a
//! 17/7 bit fraction for its sensor channels.

use byteorder::{
    BigEndian,
    ByteOrder,
    LittleEndian,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected} bytes, but got {actual}")]
pub struct LengthMismatch {
    pub expected: usize,
    pub actual: usize,
}

fn exactly<const N: usize>(bytes: &[u8]) -> Result<&[u8], LengthMismatch> {
    if bytes.len() == N {
        Ok(bytes)
    }
    else {
        Err(LengthMismatch {
            expected: N,
            actual: bytes.len(),
        })
    }
}

/// Signed 24-bit big-endian integer.
pub fn int24_be(bytes: &[u8]) -> Result<i32, LengthMismatch> {
    // pad a low byte and shift it back out, so the sign bit ends up in place
    let bytes = exactly::<3>(bytes)?;
    Ok(BigEndian::read_i32(&[bytes[0], bytes[1], bytes[2], 0]) >> 8)
}

/// Unsigned 24-bit little-endian integer.
pub fn uint24_le(bytes: &[u8]) -> Result<u32, LengthMismatch> {
    let bytes = exactly::<3>(bytes)?;
    Ok(LittleEndian::read_u24(bytes))
}

/// 24-bit big-endian fraction: the low 17 bits are the numerator, the high 7
/// bits the denominator.
///
/// A zero denominator yields `0.0`. This happens for channels that don't carry
/// data, and isn't treated as an error.
pub fn fraction17_7(bytes: &[u8]) -> Result<f64, LengthMismatch> {
    let word = BigEndian::read_u24(exactly::<3>(bytes)?);
    let numerator = word & 0x1ffff;
    let denominator = word >> 17;

    if denominator == 0 {
        Ok(0.0)
    }
    else {
        Ok(f64::from(numerator) / f64::from(denominator))
    }
}
