//! CRC16 checksums used by both sonde families.
//!
//! Both sondes use the CCITT polynomial `0x1021` without reflection, stored in
//! the last two bytes of the checked data:
//!
//! - RS41 sub-blocks: CRC-16/CCITT-FALSE (init `0xffff`), little-endian
//! - LMS6-403 frames: CRC-16/XMODEM (init `0x0000`), big-endian

use byteorder::{
    ByteOrder,
    LittleEndian,
};

/// CRC-16/CCITT-FALSE, also known as CRC-16/IBM-3740.
pub const CRC_16_CCITT_FALSE: crc::Algorithm<u16> = crc::CRC_16_IBM_3740;

/// Checksum of RS41 sub-blocks
pub const RS41: crc::Crc<u16> = crc::Crc::<u16>::new(&CRC_16_CCITT_FALSE);

/// Checksum of LMS6-403 frames
pub const LMS6: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);

/// Length of the trailing checksum.
pub const CHECKSUM_LENGTH: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("need at least 3 bytes to verify a CRC16, but got {length}")]
pub struct InvalidInput {
    pub length: usize,
}

/// Calculates the CRC-16/CCITT-FALSE of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    RS41.checksum(data)
}

/// Verifies the CRC16 in the last two bytes of `data`, stored with byte order
/// `E`, against the checksum of the preceding bytes.
///
/// Returns `false` if the buffer is too short to hold any data.
pub fn verify_trailing<E: ByteOrder>(crc: &crc::Crc<u16>, data: &[u8]) -> bool {
    if data.len() <= CHECKSUM_LENGTH {
        return false;
    }

    let (payload, checksum) = data.split_at(data.len() - CHECKSUM_LENGTH);
    let expected = E::read_u16(checksum);
    let calculated = crc.checksum(payload);

    if calculated != expected {
        tracing::debug!(
            calculated = format_args!("{calculated:#06x}"),
            expected = format_args!("{expected:#06x}"),
            "checksum mismatch"
        );
    }

    calculated == expected
}

/// Verifies a buffer with a little-endian CRC-16/CCITT-FALSE trailer.
pub fn verify(data: &[u8]) -> bool {
    verify_trailing::<LittleEndian>(&RS41, data)
}

/// Like [`verify`], but fails on buffers that are too short to contain a
/// checksum and at least one byte of data.
pub fn check(data: &[u8]) -> Result<bool, InvalidInput> {
    if data.len() < CHECKSUM_LENGTH + 1 {
        return Err(InvalidInput { length: data.len() });
    }
    Ok(verify(data))
}
