//! Lockheed Martin LMS6-403 frame decoder
//!
//! Unlike the RS41, an LMS6-403 frame is a single fixed-layout block with one
//! big-endian CRC-16/XMODEM over the first 221 bytes at the end. A checksum
//! failure drops the whole frame.
//!
//! Layout from [rs1729/RS][1].
//!
//! [1]: https://github.com/rs1729/RS/blob/master/demod/mod/lms6Xmod.c

pub mod calibration;

use byteorder::BigEndian;
use bytes::Buf;

use crate::{
    DecodeError,
    checksum::{
        self,
        CHECKSUM_LENGTH,
    },
    codec::{
        fraction17_7,
        int24_be,
    },
    gnss::LocalVelocity,
    lms6::calibration::{
        CalibrationData,
        VALUES_PER_FRAME,
    },
    record::Record,
    session::Sonde,
    util::BufReadBytesExt,
};

pub const HEADER: [u8; 4] = [0x24, 0x54, 0x00, 0x00];

/// Length of a frame, including the checksum
pub const FRAME_LENGTH: usize = 223;

pub const NUM_SENSOR_CHANNELS: usize = 12;

/// Index into [`Frame::sensor_channels`] of the temperature sensor.
pub const TEMPERATURE_CHANNEL: usize = 2;

/// Scale of the latitude and longitude fields
const DEGREES_PER_UNIT: f64 = 360.0 / u32::MAX as f64;

#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub serial: String,
    pub frame_count: u16,
    /// Seconds
    pub time_of_week: f64,
    pub unknown1: [u8; 4],
    pub latitude: f64,
    pub longitude: f64,
    /// Meters
    pub altitude: f64,
    /// m/s
    pub velocity_east: f64,
    /// m/s
    pub velocity_north: f64,
    /// m/s
    pub velocity_up: f64,
    pub velocity: LocalVelocity,
    pub unknown2: u16,
    pub gps_status: [u8; 132],
    pub sensor_channels: [f64; NUM_SENSOR_CHANNELS],
    pub unknown3: [u8; 3],
    /// Calibration values carried by this frame. Which slots they belong to
    /// is determined by the frame count.
    pub calibration: [u16; VALUES_PER_FRAME],
    pub unknown4: u8,
    /// °C, once the complete calibration has been received
    pub temperature: Option<f64>,
}

impl From<Frame> for Record {
    fn from(frame: Frame) -> Self {
        let mut record = Record::new();
        record.insert("type", Lms6::NAME);
        record.insert("serial", frame.serial);
        record.insert("frame_count", frame.frame_count);
        record.insert("time_of_week", frame.time_of_week);
        record.insert("unknown1", &frame.unknown1[..]);
        record.insert("latitude", frame.latitude);
        record.insert("longitude", frame.longitude);
        record.insert("altitude", frame.altitude);
        record.insert("vel_east", frame.velocity_east);
        record.insert("vel_north", frame.velocity_north);
        record.insert("vel_up", frame.velocity_up);
        record.insert("ground_speed", frame.velocity.ground_speed);
        record.insert("ascent_rate", frame.velocity.ascent_rate);
        record.insert("heading", frame.velocity.heading);
        record.insert("unknown2", frame.unknown2);
        record.insert("gps_status", &frame.gps_status[..]);
        for (i, value) in frame.sensor_channels.iter().enumerate() {
            record.insert(format!("sensor_chan{}", i + 1), *value);
        }
        record.insert("unknown3", &frame.unknown3[..]);
        for (i, value) in frame.calibration.iter().enumerate() {
            record.insert(format!("cal{}", i + 1), *value);
        }
        record.insert("unknown4", frame.unknown4);
        if let Some(temperature) = frame.temperature {
            record.insert("temperature", temperature);
        }
        record
    }
}

fn get_velocity<B: Buf>(buffer: &mut B) -> Result<f64, DecodeError> {
    Ok(f64::from(int24_be(&buffer.get_bytes::<3>())?) / 1000.0)
}

/// Decodes an LMS6-403 frame.
///
/// Bytes past [`FRAME_LENGTH`] are ignored. The temperature is only
/// calculated if `calibration` is complete.
pub fn decode(frame: &[u8], calibration: Option<&CalibrationData>) -> Result<Frame, DecodeError> {
    if frame.len() < FRAME_LENGTH {
        return Err(DecodeError::TooShort {
            length: frame.len(),
            expected: FRAME_LENGTH,
        });
    }

    if frame[..HEADER.len()] != HEADER {
        return Err(DecodeError::HeaderMismatch {
            header: hex::encode(&frame[..HEADER.len()]),
        });
    }

    let frame = if frame.len() > FRAME_LENGTH {
        let (frame, excess) = frame.split_at(FRAME_LENGTH);
        tracing::debug!(excess = %hex::encode(excess), "discarding trailing bytes");
        frame
    }
    else {
        frame
    };

    if !checksum::verify_trailing::<BigEndian>(&checksum::LMS6, frame) {
        tracing::warn!("frame checksum mismatch");
        return Err(DecodeError::Checksum { offset: 0 });
    }

    let mut buffer = &frame[HEADER.len()..FRAME_LENGTH - CHECKSUM_LENGTH];

    let serial = buffer.get_u32().to_string();
    let frame_count = buffer.get_u16();
    let time_of_week = f64::from(buffer.get_u32()) / 1000.0;
    let unknown1 = buffer.get_bytes();
    let latitude = f64::from(buffer.get_i32()) * DEGREES_PER_UNIT;
    let longitude = f64::from(buffer.get_i32()) * DEGREES_PER_UNIT;
    let altitude = f64::from(buffer.get_i32()) / 1000.0;
    let velocity_east = get_velocity(&mut buffer)?;
    let velocity_north = get_velocity(&mut buffer)?;
    let velocity_up = get_velocity(&mut buffer)?;
    let unknown2 = buffer.get_u16();
    let gps_status = buffer.get_bytes();

    let mut sensor_channels = [0.0; NUM_SENSOR_CHANNELS];
    for channel in &mut sensor_channels {
        *channel = fraction17_7(&buffer.get_bytes::<3>())?;
    }

    let unknown3 = buffer.get_bytes();
    let calibration_values = [(); VALUES_PER_FRAME].map(|_| buffer.get_u16());
    let unknown4 = buffer.get_u8();

    let temperature = calibration
        .and_then(CalibrationData::thermistor)
        .and_then(|thermistor| thermistor.temperature(sensor_channels[TEMPERATURE_CHANNEL]));

    Ok(Frame {
        serial,
        frame_count,
        time_of_week,
        unknown1,
        latitude,
        longitude,
        altitude,
        velocity_east,
        velocity_north,
        velocity_up,
        velocity: LocalVelocity::from_neu(velocity_north, velocity_east, velocity_up),
        unknown2,
        gps_status,
        sensor_channels,
        unknown3,
        calibration: calibration_values,
        unknown4,
        temperature,
    })
}

/// Marker for [`Session`][crate::Session]s tracking an LMS6-403.
#[derive(Clone, Copy, Debug)]
pub struct Lms6;

impl Sonde for Lms6 {
    const NAME: &'static str = "LMS6-403";
    const SNAPSHOT_KEY: &'static str = "cal_data";

    type Frame = Frame;
    type Calibration = CalibrationData;

    fn decode(raw: &[u8], calibration: Option<&CalibrationData>) -> Result<Frame, DecodeError> {
        decode(raw, calibration)
    }

    fn serial(frame: &Frame) -> Option<&str> {
        Some(&frame.serial)
    }

    fn update_calibration(calibration: &mut Option<CalibrationData>, frame: &Frame) {
        calibration
            .get_or_insert_with(CalibrationData::new)
            .add_frame_values(frame.frame_count, frame.calibration);
    }
}
