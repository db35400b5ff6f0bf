//! RS41 subframe reassembly
//!
//! Every RS41 status block carries one 16 byte segment of a larger
//! configuration and calibration blob, the subframe. It takes `max_subframe +
//! 1` frames until it has been transmitted completely, after which it repeats.
//!
//! Field offsets follow [rs1729/RS][1] and [bazjo/RS41_Decoding][2].
//!
//! [1]: https://github.com/rs1729/RS/blob/master/demod/mod/rs41mod.c
//! [2]: https://github.com/bazjo/RS41_Decoding

use byteorder::{
    ByteOrder,
    LittleEndian,
};

use crate::{
    record::{
        Record,
        Value,
    },
    session::CalibrationStore,
    thermistor::TemperatureCalibration,
    util::trim_padded_str,
};

/// Length of a subframe segment
pub const SEGMENT_LENGTH: usize = 16;

/// Highest segment index when the status block hasn't told us otherwise.
pub const DEFAULT_MAX_SUBFRAME: u8 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSegment {
    #[error("segment index {index} is out of range (max: {max})")]
    OutOfRange { index: usize, max: usize },

    #[error("segment has {length} bytes, but must have {SEGMENT_LENGTH}")]
    Length { length: usize },
}

#[derive(Clone, Copy, Debug)]
enum FieldType {
    U8,
    U16,
    F32,
    Str,
}

#[derive(Clone, Copy, Debug)]
struct Field {
    name: &'static str,
    offset: usize,
    length: usize,
    ty: FieldType,
}

const fn field(name: &'static str, offset: usize, ty: FieldType) -> Field {
    let length = match ty {
        FieldType::U8 => 1,
        FieldType::U16 => 2,
        FieldType::F32 => 4,
        FieldType::Str => 10,
    };
    Field {
        name,
        offset,
        length,
        ty,
    }
}

const FIELDS: &[Field] = &[
    field("freq_lower", 0x002, FieldType::U8),
    field("freq_upper", 0x003, FieldType::U8),
    field("firmware_version", 0x015, FieldType::U16),
    field("burstkill_status", 0x02b, FieldType::U8),
    field("rf1", 0x03d, FieldType::F32),
    field("rf2", 0x041, FieldType::F32),
    field("tempmeas_co1_0", 0x04d, FieldType::F32),
    field("tempmeas_co1_1", 0x051, FieldType::F32),
    field("tempmeas_co1_2", 0x055, FieldType::F32),
    field("tempmeas_cal_t1_0", 0x059, FieldType::F32),
    field("tempmeas_cal_t1_1", 0x05d, FieldType::F32),
    field("tempmeas_cal_t1_2", 0x061, FieldType::F32),
    field("humimeas_co2_0", 0x125, FieldType::F32),
    field("humimeas_co2_1", 0x129, FieldType::F32),
    field("humimeas_co2_2", 0x12d, FieldType::F32),
    field("humimeas_cal_t1_0", 0x131, FieldType::F32),
    field("humimeas_cal_t1_1", 0x135, FieldType::F32),
    field("humimeas_cal_t1_2", 0x139, FieldType::F32),
    field("subtype", 0x218, FieldType::Str),
    field("mainboard_type", 0x222, FieldType::Str),
    field("mainboard_serial", 0x22c, FieldType::Str),
    field("pressure_serial", 0x243, FieldType::Str),
    field("burstkill_timer", 0x316, FieldType::U16),
];

/// Coefficients that are made up of three consecutive fields.
const VECTORS: &[&str] = &[
    "tempmeas_co1",
    "tempmeas_cal_t1",
    "humimeas_co2",
    "humimeas_cal_t1",
];

#[derive(Clone, Debug)]
pub struct Subframe {
    data: Vec<u8>,
    present: Vec<bool>,
    fields: Record,
}

impl Default for Subframe {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUBFRAME)
    }
}

impl Subframe {
    pub fn new(max_subframe: u8) -> Self {
        let num_segments = usize::from(max_subframe) + 1;
        Self {
            data: vec![0; num_segments * SEGMENT_LENGTH],
            present: vec![false; num_segments],
            fields: Record::new(),
        }
    }

    pub fn num_segments(&self) -> usize {
        self.present.len()
    }

    pub fn num_received(&self) -> usize {
        self.present.iter().filter(|present| **present).count()
    }

    /// Writes a segment, replacing any earlier transmission of the same
    /// index.
    ///
    /// Invalid segments leave the subframe untouched.
    pub fn add_segment(&mut self, index: usize, segment: &[u8]) -> Result<(), InvalidSegment> {
        if index >= self.num_segments() {
            return Err(InvalidSegment::OutOfRange {
                index,
                max: self.num_segments() - 1,
            });
        }
        if segment.len() != SEGMENT_LENGTH {
            return Err(InvalidSegment::Length {
                length: segment.len(),
            });
        }

        let start = index * SEGMENT_LENGTH;
        self.data[start..start + SEGMENT_LENGTH].copy_from_slice(segment);
        self.present[index] = true;

        tracing::debug!(
            index,
            received = self.num_received(),
            total = self.num_segments(),
            "received subframe segment"
        );

        self.update_fields();

        Ok(())
    }

    fn is_span_present(&self, offset: usize, length: usize) -> bool {
        let end = offset + length;
        if end > self.data.len() {
            return false;
        }
        let first = offset / SEGMENT_LENGTH;
        let last = (end - 1) / SEGMENT_LENGTH;
        self.present[first..=last].iter().all(|present| *present)
    }

    fn extract(&self, field: &Field) -> Option<Value> {
        if !self.is_span_present(field.offset, field.length) {
            return None;
        }

        let bytes = &self.data[field.offset..field.offset + field.length];
        let value = match field.ty {
            FieldType::U8 => Value::from(bytes[0]),
            FieldType::U16 => Value::from(LittleEndian::read_u16(bytes)),
            FieldType::F32 => Value::from(LittleEndian::read_f32(bytes)),
            FieldType::Str => Value::from(trim_padded_str(bytes)),
        };
        Some(value)
    }

    /// Rebuilds all fields from the raw segments.
    fn update_fields(&mut self) {
        let mut fields: Record = FIELDS
            .iter()
            .filter_map(|field| Some((field.name, self.extract(field)?)))
            .collect();

        if let (Some(lower), Some(upper)) =
            (fields.get_u64("freq_lower"), fields.get_u64("freq_upper"))
        {
            fields.insert("tx_frequency_khz", tx_frequency_khz(lower, upper));
        }

        for name in VECTORS {
            let parts = (0..3)
                .map(|i| fields.get(&format!("{name}_{i}")).cloned())
                .collect::<Option<Vec<Value>>>();
            if let Some(parts) = parts {
                fields.insert(*name, parts);
            }
        }

        self.fields = fields;
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    fn vector(&self, name: &str) -> Option<[f64; 3]> {
        match self.fields.get_list(name)? {
            [a, b, c] => Some([a.as_f64()?, b.as_f64()?, c.as_f64()?]),
            _ => None,
        }
    }

    /// Thermistor calibration for the main temperature sensor, once all of it
    /// has been received.
    pub fn temperature_calibration(&self) -> Option<TemperatureCalibration> {
        Some(TemperatureCalibration {
            reference_1: self.fields.get_f64("rf1")?,
            reference_2: self.fields.get_f64("rf2")?,
            co: self.vector("tempmeas_co1")?,
            cal_t: self.vector("tempmeas_cal_t1")?,
        })
    }

    /// Transmit frequency in kHz.
    pub fn tx_frequency_khz(&self) -> Option<u64> {
        self.fields.get_u64("tx_frequency_khz")
    }
}

fn tx_frequency_khz(freq_lower: u64, freq_upper: u64) -> u64 {
    400_000 + 40 * freq_upper + (freq_lower & 0xc0) * 10 / 64
}

impl CalibrationStore for Subframe {
    fn is_field_available(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn snapshot(&self) -> Record {
        self.fields.clone()
    }

    fn is_complete(&self) -> bool {
        self.present.iter().all(|present| *present)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::{
        rs41::subframe::{
            InvalidSegment,
            SEGMENT_LENGTH,
            Subframe,
        },
        session::CalibrationStore,
    };

    fn write_f32(segments: &mut [u8], offset: usize, value: f32) {
        segments[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Subframe contents with a complete temperature calibration.
    fn calibrated_segments() -> Vec<u8> {
        let mut data = vec![0; 51 * SEGMENT_LENGTH];
        data[0x002] = 0xc0;
        data[0x003] = 0x26;
        write_f32(&mut data, 0x03d, 750.0);
        write_f32(&mut data, 0x041, 1100.0);
        for (i, value) in [-243.91, 0.187, 8.2e-6].into_iter().enumerate() {
            write_f32(&mut data, 0x04d + 4 * i, value);
        }
        for (i, value) in [1.28, -0.064, 0.0].into_iter().enumerate() {
            write_f32(&mut data, 0x059 + 4 * i, value);
        }
        data[0x218..0x21e].copy_from_slice(b"RS41-S");
        data
    }

    fn add(subframe: &mut Subframe, data: &[u8], index: usize) {
        subframe
            .add_segment(index, &data[index * SEGMENT_LENGTH..][..SEGMENT_LENGTH])
            .unwrap();
    }

    #[test]
    fn it_exposes_a_straddling_field_only_when_both_segments_are_present() {
        let data = calibrated_segments();
        let mut subframe = Subframe::default();

        // rf1 spans 0x03d..0x041, i.e. segments 3 and 4
        add(&mut subframe, &data, 3);
        assert!(!subframe.is_field_available("rf1"));
        add(&mut subframe, &data, 4);
        assert!(subframe.is_field_available("rf1"));
        assert_abs_diff_eq!(subframe.get("rf1").unwrap().as_f64().unwrap(), 750.0);

        // in the other order
        let mut subframe = Subframe::default();
        add(&mut subframe, &data, 4);
        assert!(!subframe.is_field_available("rf1"));
        add(&mut subframe, &data, 3);
        assert!(subframe.is_field_available("rf1"));
    }

    #[test]
    fn it_assembles_vectors_once_all_parts_are_present() {
        let data = calibrated_segments();
        let mut subframe = Subframe::default();

        // tempmeas_co1 spans 0x04d..0x059, segments 4 and 5
        add(&mut subframe, &data, 5);
        assert!(!subframe.is_field_available("tempmeas_co1_0"));
        assert!(subframe.is_field_available("tempmeas_co1_1"));
        assert!(subframe.is_field_available("tempmeas_co1_2"));
        assert!(!subframe.is_field_available("tempmeas_co1"));

        add(&mut subframe, &data, 4);
        assert!(subframe.is_field_available("tempmeas_co1"));
        assert_eq!(subframe.snapshot().get_list("tempmeas_co1").unwrap().len(), 3);
    }

    #[test]
    fn it_provides_the_temperature_calibration() {
        let data = calibrated_segments();
        let mut subframe = Subframe::default();
        assert!(subframe.temperature_calibration().is_none());

        for index in 3..=5 {
            add(&mut subframe, &data, index);
        }
        assert!(subframe.temperature_calibration().is_none());

        // the last part of tempmeas_cal_t1
        add(&mut subframe, &data, 6);
        let calibration = subframe.temperature_calibration().unwrap();
        assert_abs_diff_eq!(calibration.reference_1, 750.0);
        assert_abs_diff_eq!(calibration.reference_2, 1100.0);
        assert_abs_diff_eq!(calibration.co[1], 0.187, epsilon = 1e-6);
        assert_abs_diff_eq!(calibration.cal_t[0], 1.28, epsilon = 1e-6);
    }

    #[test]
    fn it_derives_the_tx_frequency() {
        let data = calibrated_segments();
        let mut subframe = Subframe::default();
        add(&mut subframe, &data, 0);

        // 400000 + 40 * 0x26 + 0xc0 * 10 / 64
        assert_eq!(subframe.tx_frequency_khz(), Some(401_550));
    }

    #[test]
    fn it_trims_strings() {
        let data = calibrated_segments();
        let mut subframe = Subframe::default();
        add(&mut subframe, &data, 0x218 / SEGMENT_LENGTH);
        assert!(!subframe.is_field_available("subtype"));
        add(&mut subframe, &data, 0x218 / SEGMENT_LENGTH + 1);
        assert_eq!(subframe.snapshot().get_str("subtype"), Some("RS41-S"));
    }

    #[test]
    fn it_rejects_invalid_segments() {
        let mut subframe = Subframe::new(2);

        assert_eq!(
            subframe.add_segment(3, &[0; 16]),
            Err(InvalidSegment::OutOfRange { index: 3, max: 2 })
        );
        assert_eq!(
            subframe.add_segment(0, &[0; 15]),
            Err(InvalidSegment::Length { length: 15 })
        );
        assert_eq!(subframe.num_received(), 0);
        assert!(subframe.snapshot().is_empty());
    }

    #[test]
    fn it_overwrites_duplicate_segments() {
        let mut subframe = Subframe::default();
        let mut segment = [0; 16];
        segment[2] = 0x40;
        subframe.add_segment(0, &segment).unwrap();
        assert_eq!(subframe.get("freq_lower").unwrap().as_u64(), Some(0x40));

        segment[2] = 0x80;
        subframe.add_segment(0, &segment).unwrap();
        assert_eq!(subframe.get("freq_lower").unwrap().as_u64(), Some(0x80));
    }

    #[test]
    fn it_completes_when_every_segment_was_received() {
        let mut subframe = Subframe::new(3);
        for index in [0, 2, 3, 2] {
            subframe.add_segment(index, &[0; 16]).unwrap();
            assert!(!subframe.is_complete());
        }
        subframe.add_segment(1, &[0; 16]).unwrap();
        assert!(subframe.is_complete());
    }
}
