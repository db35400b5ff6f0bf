//! LMS6-403 calibration values
//!
//! 28 calibration values are sent, four per frame, and repeat every 7 frames.
//! There's no segment index in the telemetry, so the frame counter decides
//! which group of four a frame carries:
//!
//! ```plain
//! frame_count % 7 == 0 -> cal 0..=3
//! frame_count % 7 == 1 -> cal 4..=7
//! ...
//! frame_count % 7 == 6 -> cal 24..=27
//! ```
//!
//! The meaning of most values is unknown. Slot 7 matches the thermistor
//! lock-in value printed on the sonde's box, slot 8 its TRC (scaled by
//! 10000).

use crate::{
    record::Record,
    session::CalibrationStore,
    thermistor::BetaThermistor,
};

pub const VALUES_PER_FRAME: usize = 4;

pub const NUM_VALUES: usize = 28;

pub const NUM_GROUPS: usize = NUM_VALUES / VALUES_PER_FRAME;

pub const TEMP_R0: usize = 1;
pub const TEMP_B: usize = 2;
pub const TEMP_LOCKIN: usize = 7;
pub const TEMP_TRC: usize = 8;

const NAMED: &[(&str, usize)] = &[
    ("temp_r0", TEMP_R0),
    ("temp_b", TEMP_B),
    ("temp_lockin", TEMP_LOCKIN),
    ("temp_trc", TEMP_TRC),
];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CalibrationData {
    values: [Option<u16>; NUM_VALUES],
}

impl CalibrationData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first value carried by a frame.
    pub fn group_base(frame_count: u16) -> usize {
        (usize::from(frame_count) % NUM_GROUPS) * VALUES_PER_FRAME
    }

    /// Stores the calibration values of a frame, replacing whatever was
    /// received for this group before.
    pub fn add_frame_values(&mut self, frame_count: u16, values: [u16; VALUES_PER_FRAME]) {
        let base = Self::group_base(frame_count);
        for (slot, value) in self.values[base..base + VALUES_PER_FRAME]
            .iter_mut()
            .zip(values)
        {
            *slot = Some(value);
        }

        tracing::debug!(
            frame_count,
            base,
            received = self.num_received(),
            "received calibration values"
        );
    }

    pub fn get(&self, index: usize) -> Option<u16> {
        self.values.get(index).copied().flatten()
    }

    pub fn num_received(&self) -> usize {
        self.values.iter().filter(|value| value.is_some()).count()
    }

    fn index_of(name: &str) -> Option<usize> {
        if let Some((_, index)) = NAMED.iter().find(|(named, _)| *named == name) {
            return Some(*index);
        }
        let index: usize = name.strip_prefix("cal")?.parse().ok()?;
        (index < NUM_VALUES).then_some(index)
    }

    /// β-thermistor parameters of the temperature sensor.
    ///
    /// Only available once all values have been received.
    pub fn thermistor(&self) -> Option<BetaThermistor> {
        if !self.is_complete() {
            return None;
        }
        Some(BetaThermistor {
            r0: f64::from(self.get(TEMP_R0)?),
            b: f64::from(self.get(TEMP_B)?),
        })
    }
}

impl CalibrationStore for CalibrationData {
    fn is_field_available(&self, name: &str) -> bool {
        Self::index_of(name).is_some_and(|index| self.values[index].is_some())
    }

    fn snapshot(&self) -> Record {
        let mut record = Record::new();
        for (index, value) in self.values.iter().enumerate() {
            if let Some(value) = value {
                record.insert(format!("cal{index:02}"), *value);
            }
        }
        for (name, index) in NAMED {
            if let Some(value) = self.values[*index] {
                record.insert(*name, value);
            }
        }
        record
    }

    fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }
}
