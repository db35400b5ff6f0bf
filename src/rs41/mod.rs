//! Vaisala RS41 frame decoder
//!
//! A frame starts with a fixed header, followed by 48 bytes of Reed-Solomon
//! parity and a frame type byte. The rest of the frame is a sequence of
//! sub-blocks:
//!
//! ```plain
//! type: u8 | length: u8 | payload: [u8; length] | crc16: u16 (le)
//! ```
//!
//! Each sub-block carries its own checksum, so a corrupted block is skipped
//! without dropping the rest of the frame.
//!
//! The frame must already be descrambled and error-corrected.
//!
//! - [bazjo/RS41_Decoding][1]
//! - [rs1729/RS][2]
//!
//! [1]: https://github.com/bazjo/RS41_Decoding
//! [2]: https://github.com/rs1729/RS/blob/master/demod/mod/rs41mod.c

pub mod block;
pub mod subframe;

use crate::{
    DecodeError,
    checksum::{
        self,
        CHECKSUM_LENGTH,
    },
    record::Record,
    rs41::{
        block::{
            Block,
            BlockType,
            Status,
        },
        subframe::{
            DEFAULT_MAX_SUBFRAME,
            Subframe,
        },
    },
    session::Sonde,
};

pub const HEADER: [u8; 8] = [0x86, 0x35, 0xf4, 0x40, 0x93, 0xdf, 0x1a, 0x60];

/// Length of the Reed-Solomon parity following the header
pub const ECC_LENGTH: usize = 48;

pub const FRAME_TYPE_OFFSET: usize = HEADER.len() + ECC_LENGTH;

pub const BLOCKS_OFFSET: usize = FRAME_TYPE_OFFSET + 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameType {
    /// 320 bytes
    Regular,
    /// 518 bytes, with XDATA
    Extended,
}

impl FrameType {
    pub fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            0x0f => Ok(Self::Regular),
            0xf0 => Ok(Self::Extended),
            _ => Err(DecodeError::UnknownFrameType { value }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Regular => "Regular",
            FrameType::Extended => "Extended",
        }
    }
}

/// Reason a single sub-block was dropped.
#[derive(Debug, thiserror::Error)]
pub enum SkippedBlock {
    #[error("checksum mismatch")]
    Checksum,

    #[error("unknown block type {value:#04x}")]
    UnknownType { value: u8 },

    #[error("{block_type:?} block has length {length}, but expected {expected}")]
    UnexpectedLength {
        block_type: BlockType,
        length: usize,
        expected: usize,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub frame_type: FrameType,
    /// Sub-blocks that were decoded successfully, in frame order.
    pub blocks: Vec<Block>,
}

impl Frame {
    pub fn status(&self) -> Option<&Status> {
        self.blocks.iter().find_map(|block| {
            match block {
                Block::Status(status) => Some(status),
                _ => None,
            }
        })
    }

    pub fn block(&self, block_type: BlockType) -> Option<&Block> {
        self.blocks
            .iter()
            .find(|block| block.block_type() == block_type)
    }
}

impl From<Frame> for Record {
    fn from(frame: Frame) -> Self {
        let blocks: Record = frame
            .blocks
            .iter()
            .map(|block| (block.block_type().name(), block.to_record()))
            .collect();

        let mut record = Record::new();
        record.insert("type", Rs41::NAME);
        record.insert("frame_type", frame.frame_type.name());
        record.insert("blocks", blocks);
        record
    }
}

/// A sub-block as it appears in the frame.
#[derive(Clone, Copy, Debug)]
struct RawBlock<'a> {
    offset: usize,
    block_type: u8,
    payload: &'a [u8],
    /// Payload plus trailing CRC
    checked: &'a [u8],
}

impl<'a> RawBlock<'a> {
    fn read(frame: &'a [u8], offset: usize) -> Result<Self, DecodeError> {
        let truncated = || DecodeError::Truncated { offset };

        let header = frame.get(offset..offset + 2).ok_or_else(truncated)?;
        let block_type = header[0];
        let length = usize::from(header[1]);

        let start = offset + 2;
        let checked = frame
            .get(start..start + length + CHECKSUM_LENGTH)
            .ok_or_else(truncated)?;

        Ok(Self {
            offset,
            block_type,
            payload: &checked[..length],
            checked,
        })
    }

    fn end(&self) -> usize {
        self.offset + 2 + self.checked.len()
    }

    fn decode(&self, subframe: Option<&Subframe>) -> Result<Block, SkippedBlock> {
        if !checksum::verify(self.checked) {
            return Err(SkippedBlock::Checksum);
        }

        let block_type = BlockType::from_u8(self.block_type).ok_or(SkippedBlock::UnknownType {
            value: self.block_type,
        })?;

        let expected = block_type.expected_length();
        if self.payload.len() != expected {
            return Err(SkippedBlock::UnexpectedLength {
                block_type,
                length: self.payload.len(),
                expected,
            });
        }

        Ok(Block::decode(block_type, self.payload, subframe)?)
    }
}

/// Decodes an RS41 frame.
///
/// Only a missing header or an unknown frame type fail the whole frame. Bad
/// sub-blocks are logged and skipped, and a block that runs past the end of
/// the frame ends the scan, keeping everything decoded up to that point.
pub fn decode(frame: &[u8], subframe: Option<&Subframe>) -> Result<Frame, DecodeError> {
    if frame.len() < BLOCKS_OFFSET {
        return Err(DecodeError::TooShort {
            length: frame.len(),
            expected: BLOCKS_OFFSET,
        });
    }

    if frame[..HEADER.len()] != HEADER {
        return Err(DecodeError::HeaderMismatch {
            header: hex::encode(&frame[..HEADER.len()]),
        });
    }

    let frame_type = FrameType::from_u8(frame[FRAME_TYPE_OFFSET])?;

    let mut blocks = vec![];
    let mut offset = BLOCKS_OFFSET;

    while offset < frame.len() {
        let raw = match RawBlock::read(frame, offset) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(%error, "aborting block scan");
                break;
            }
        };
        offset = raw.end();

        tracing::debug!(
            offset = raw.offset,
            block_type = format_args!("{:#04x}", raw.block_type),
            length = raw.payload.len(),
            "block"
        );

        match raw.decode(subframe) {
            Ok(block) => blocks.push(block),
            Err(SkippedBlock::UnknownType { value }) => {
                tracing::debug!(
                    offset = raw.offset,
                    block_type = format_args!("{value:#04x}"),
                    "skipping unknown block"
                );
            }
            Err(SkippedBlock::Decode(error)) => {
                tracing::warn!(offset = raw.offset, %error, "aborting block scan");
                break;
            }
            Err(error) => {
                tracing::warn!(offset = raw.offset, %error, "skipping block");
            }
        }
    }

    Ok(Frame { frame_type, blocks })
}

/// Marker for [`Session`][crate::Session]s tracking an RS41.
#[derive(Clone, Copy, Debug)]
pub struct Rs41;

impl Sonde for Rs41 {
    const NAME: &'static str = "RS41";
    const SNAPSHOT_KEY: &'static str = "subframe";

    type Frame = Frame;
    type Calibration = Subframe;

    fn decode(raw: &[u8], calibration: Option<&Subframe>) -> Result<Frame, DecodeError> {
        decode(raw, calibration)
    }

    fn serial(frame: &Frame) -> Option<&str> {
        frame
            .status()
            .map(|status| status.serial.as_str())
            .filter(|serial| !serial.is_empty())
    }

    fn update_calibration(calibration: &mut Option<Subframe>, frame: &Frame) {
        let Some(status) = frame.status()
        else {
            return;
        };

        let subframe = calibration.get_or_insert_with(|| {
            let max_subframe = if status.max_subframe == 0 {
                DEFAULT_MAX_SUBFRAME
            }
            else {
                status.max_subframe
            };
            Subframe::new(max_subframe)
        });

        if let Err(error) =
            subframe.add_segment(status.subframe_count.into(), &status.subframe_data)
        {
            tracing::warn!(%error, "dropping subframe segment");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_abs_diff_eq;

    use crate::{
        DecodeError,
        checksum::crc16,
        record::Record,
        rs41::{
            BLOCKS_OFFSET,
            FrameType,
            HEADER,
            block::{
                Block,
                BlockType,
            },
            decode,
            subframe::Subframe,
        },
        session::CalibrationStore,
    };

    pub fn block(block_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut block = vec![block_type, payload.len() as u8];
        block.extend_from_slice(payload);
        block.extend_from_slice(&crc16(payload).to_le_bytes());
        block
    }

    pub fn corrupted(mut block: Vec<u8>) -> Vec<u8> {
        block[3] ^= 0xff;
        block
    }

    pub fn build_frame(blocks: &[Vec<u8>]) -> Vec<u8> {
        let mut frame = HEADER.to_vec();
        frame.extend_from_slice(&[0; 48]);
        frame.push(0x0f);
        for block in blocks {
            frame.extend_from_slice(block);
        }
        frame
    }

    pub fn status_payload(
        serial: &str,
        frame_count: u16,
        subframe_count: u8,
        subframe_data: [u8; 16],
    ) -> Vec<u8> {
        let mut payload = vec![];
        payload.extend_from_slice(&frame_count.to_le_bytes());
        let mut serial_bytes = [0u8; 8];
        serial_bytes[..serial.len()].copy_from_slice(serial.as_bytes());
        payload.extend_from_slice(&serial_bytes);
        payload.extend_from_slice(&[
            29, 0, 0, 0, 0, 0, 21, 0, 0, 0, 0, 7, 50, subframe_count,
        ]);
        payload.extend_from_slice(&subframe_data);
        payload
    }

    fn gps_info_payload() -> Vec<u8> {
        let mut payload = vec![];
        payload.extend_from_slice(&2183u16.to_le_bytes());
        payload.extend_from_slice(&514_436_000u32.to_le_bytes());
        payload.extend_from_slice(&[0; 24]);
        payload
    }

    fn gps_position_payload() -> Vec<u8> {
        let mut payload = vec![];
        for cm in [-392090006i32, 346639067, -363350663] {
            payload.extend_from_slice(&cm.to_le_bytes());
        }
        payload.extend_from_slice(&[0; 6]);
        payload.extend_from_slice(&[9, 3, 15]);
        payload
    }

    fn good_blocks() -> Vec<Vec<u8>> {
        vec![
            block(0x79, &status_payload("S4610487", 313, 0, [0; 16])),
            block(0x7a, &[0x10; 42]),
            block(0x7b, &gps_position_payload()),
            block(0x7c, &gps_info_payload()),
        ]
    }

    fn block_types(blocks: &[Block]) -> Vec<BlockType> {
        blocks.iter().map(|block| block.block_type()).collect()
    }

    #[test]
    fn it_decodes_all_blocks_of_a_clean_frame() {
        let frame = decode(&build_frame(&good_blocks()), None).unwrap();
        assert_eq!(frame.frame_type, FrameType::Regular);
        assert_eq!(
            block_types(&frame.blocks),
            vec![
                BlockType::Status,
                BlockType::Measurements,
                BlockType::GpsPosition,
                BlockType::GpsInfo,
            ]
        );
        assert_eq!(frame.status().unwrap().serial, "S4610487");
    }

    #[test]
    fn it_skips_corrupted_blocks_wherever_they_are() {
        let good = good_blocks();
        let bad: Vec<Vec<u8>> = good.iter().cloned().map(corrupted).collect();

        let orders = [
            vec![
                &bad[0], &good[0], &bad[1], &good[1], &good[2], &bad[2], &good[3], &bad[3],
            ],
            vec![
                &good[0], &good[1], &good[2], &good[3], &bad[0], &bad[1], &bad[2], &bad[3],
            ],
            vec![
                &bad[3], &bad[2], &bad[1], &bad[0], &good[0], &good[1], &good[2], &good[3],
            ],
        ];

        for order in orders {
            let blocks: Vec<Vec<u8>> = order.into_iter().cloned().collect();
            let frame = decode(&build_frame(&blocks), None).unwrap();
            assert_eq!(frame.blocks.len(), 4);
            assert!(frame.block(BlockType::GpsInfo).is_some());
        }
    }

    #[test]
    fn it_skips_unknown_blocks() {
        let mut blocks = good_blocks();
        blocks.insert(1, block(0x7e, &[1, 2, 3, 4, 5]));
        blocks.push(block(0x76, &[0; 17]));

        let frame = decode(&build_frame(&blocks), None).unwrap();
        assert_eq!(frame.blocks.len(), 4);
    }

    #[test]
    fn it_skips_blocks_with_unexpected_length() {
        let mut blocks = good_blocks();
        // a status block that's one byte short, but with a valid checksum
        blocks[0] = block(0x79, &status_payload("S4610487", 313, 0, [0; 16])[..39]);

        let frame = decode(&build_frame(&blocks), None).unwrap();
        assert_eq!(
            block_types(&frame.blocks),
            vec![
                BlockType::Measurements,
                BlockType::GpsPosition,
                BlockType::GpsInfo,
            ]
        );
        assert!(frame.status().is_none());
    }

    #[test]
    fn it_keeps_blocks_before_a_truncated_one() {
        let blocks = good_blocks();
        let mut raw = build_frame(&blocks[..2]);
        raw.extend_from_slice(&blocks[2][..10]);

        let frame = decode(&raw, None).unwrap();
        assert_eq!(
            block_types(&frame.blocks),
            vec![BlockType::Status, BlockType::Measurements]
        );

        // a single dangling byte
        let mut raw = build_frame(&blocks[..1]);
        raw.push(0x7a);
        assert_eq!(decode(&raw, None).unwrap().blocks.len(), 1);
    }

    #[test]
    fn it_accepts_a_frame_without_blocks() {
        let raw = build_frame(&[]);
        assert_eq!(raw.len(), BLOCKS_OFFSET);
        assert!(decode(&raw, None).unwrap().blocks.is_empty());
    }

    #[test]
    fn it_rejects_short_frames() {
        let raw = build_frame(&[]);
        assert!(matches!(
            decode(&raw[..BLOCKS_OFFSET - 1], None),
            Err(DecodeError::TooShort {
                length: 56,
                expected: 57
            })
        ));
        assert!(matches!(decode(&[], None), Err(DecodeError::TooShort { .. })));
    }

    #[test]
    fn it_rejects_a_wrong_header() {
        let mut raw = build_frame(&good_blocks());
        raw[0] = 0x87;
        assert!(matches!(
            decode(&raw, None),
            Err(DecodeError::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn it_rejects_unknown_frame_types() {
        let mut raw = build_frame(&good_blocks());
        raw[56] = 0x55;
        assert!(matches!(
            decode(&raw, None),
            Err(DecodeError::UnknownFrameType { value: 0x55 })
        ));

        raw[56] = 0xf0;
        assert_eq!(decode(&raw, None).unwrap().frame_type, FrameType::Extended);
    }

    #[test]
    fn it_computes_temperature_from_the_subframe() {
        let mut subframe = Subframe::default();
        let mut data = vec![0u8; 7 * 16];
        let mut write = |offset: usize, value: f32| {
            data[offset..offset + 4].copy_from_slice(&value.to_le_bytes())
        };
        write(0x03d, 750.0);
        write(0x041, 1100.0);
        write(0x04d, 0.0);
        write(0x051, 1.0);
        write(0x055, 0.0);
        write(0x059, 1.0);
        write(0x05d, 0.0);
        write(0x061, 0.0);
        for index in 0..7 {
            subframe
                .add_segment(index, &data[index * 16..][..16])
                .unwrap();
        }
        assert!(subframe.is_field_available("tempmeas_cal_t1"));

        // main = ref1, so the thermistor matches the first reference
        let mut measurements = vec![];
        for value in [3000u32, 3000, 4400] {
            measurements.extend_from_slice(&value.to_le_bytes()[..3]);
        }
        measurements.extend_from_slice(&[0; 33]);

        let raw = build_frame(&[block(0x7a, &measurements)]);
        let record = Record::from(decode(&raw, Some(&subframe)).unwrap());
        let measurements = record
            .lookup(&["blocks", "measurements"])
            .and_then(|value| value.as_record())
            .unwrap();
        assert_eq!(measurements.get_bool("temperature_valid"), Some(true));
        assert_abs_diff_eq!(
            measurements.get_f64("temperature").unwrap(),
            750.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn it_builds_a_nested_record() {
        let frame = decode(&build_frame(&good_blocks()), None).unwrap();
        let record = Record::from(frame);

        assert_eq!(record.get_str("type"), Some("RS41"));
        assert_eq!(record.get_str("frame_type"), Some("Regular"));
        let blocks = record.get_record("blocks").unwrap();
        assert_eq!(
            blocks.keys().collect::<Vec<_>>(),
            vec!["gps_info", "gps_position", "measurements", "status"]
        );
        assert_eq!(
            record
                .lookup(&["blocks", "status", "frame_count"])
                .and_then(|value| value.as_u64()),
            Some(313)
        );
    }
}
