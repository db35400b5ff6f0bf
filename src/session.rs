//! Per-sonde decoding state
//!
//! A [`Session`] follows one physical sonde: it remembers the serial of the
//! first frame and collects the calibration data the sonde spreads over many
//! frames. Routing frames of different sondes to different sessions is up to
//! the caller, e.g. by starting a new session on
//! [`SerialMismatch`][Error::SerialMismatch].

use std::marker::PhantomData;

use chrono::{
    DateTime,
    Utc,
};

use crate::{
    DecodeError,
    Error,
    record::Record,
};

/// Calibration data that is reassembled over multiple frames.
pub trait CalibrationStore {
    fn is_field_available(&self, name: &str) -> bool;

    /// All fields that are currently available.
    fn snapshot(&self) -> Record;

    /// Whether every part of the calibration has been received at least once.
    fn is_complete(&self) -> bool;
}

/// A sonde family.
pub trait Sonde {
    /// Value of the `type` field in decoded records
    const NAME: &'static str;

    /// Name under which the calibration snapshot is attached to records
    const SNAPSHOT_KEY: &'static str;

    type Frame: Into<Record>;
    type Calibration: CalibrationStore;

    fn decode(raw: &[u8], calibration: Option<&Self::Calibration>)
    -> Result<Self::Frame, DecodeError>;

    fn serial(frame: &Self::Frame) -> Option<&str>;

    /// Folds the calibration data carried by `frame` into the store, creating
    /// it if necessary.
    fn update_calibration(calibration: &mut Option<Self::Calibration>, frame: &Self::Frame);
}

#[derive(Debug)]
pub struct Session<S: Sonde> {
    serial: Option<String>,
    calibration: Option<S::Calibration>,
    last_frame_time: Option<DateTime<Utc>>,
    _sonde: PhantomData<S>,
}

impl<S: Sonde> Default for Session<S> {
    fn default() -> Self {
        Self {
            serial: None,
            calibration: None,
            last_frame_time: None,
            _sonde: PhantomData,
        }
    }
}

impl<S: Sonde> Session<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serial of the sonde, once the first frame was decoded.
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn calibration(&self) -> Option<&S::Calibration> {
        self.calibration.as_ref()
    }

    /// When the last frame was accepted. The owner of the session can use
    /// this to expire it.
    pub fn last_frame_time(&self) -> Option<DateTime<Utc>> {
        self.last_frame_time
    }

    /// Decodes a frame and folds its calibration data into the session.
    ///
    /// The returned record carries a snapshot of the calibration under
    /// [`S::SNAPSHOT_KEY`][Sonde::SNAPSHOT_KEY]. On error the session is left
    /// unchanged.
    pub fn try_add_frame(&mut self, raw: &[u8]) -> Result<Record, Error> {
        let frame = S::decode(raw, self.calibration.as_ref())?;

        let serial = S::serial(&frame).ok_or(Error::MissingField { name: "serial" })?;
        match &self.serial {
            Some(expected) if expected != serial => {
                return Err(Error::SerialMismatch {
                    expected: expected.clone(),
                    received: serial.to_owned(),
                });
            }
            Some(_) => {}
            None => {
                tracing::info!(sonde = S::NAME, serial, "new sonde");
                self.serial = Some(serial.to_owned());
            }
        }

        self.last_frame_time = Some(Utc::now());

        S::update_calibration(&mut self.calibration, &frame);

        let mut record: Record = frame.into();
        if let Some(calibration) = &self.calibration {
            record.insert(S::SNAPSHOT_KEY, calibration.snapshot());
        }

        Ok(record)
    }

    /// Like [`try_add_frame`][Self::try_add_frame], but logs errors instead
    /// of returning them.
    pub fn add_frame(&mut self, raw: &[u8]) -> Option<Record> {
        match self.try_add_frame(raw) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::error!(
                    sonde = S::NAME,
                    serial = self.serial(),
                    %error,
                    "error processing frame"
                );
                None
            }
        }
    }

    pub fn is_calibration_complete(&self) -> bool {
        self.calibration
            .as_ref()
            .is_some_and(CalibrationStore::is_complete)
    }
}
