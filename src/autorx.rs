//! [radiosonde_auto_rx][1] telemetry log format
//!
//! ```plain
//! timestamp,serial,frame,lat,lon,alt,vel_v,vel_h,heading,temp,humidity,pressure,type,sats,batt_v
//! 2021-11-12T22:53:38.000Z,S4610487,313,-34.95245,138.52045,10.5,-0.3,0.3,180.9,-273.0,-1.0,-1.0,RS41,6,2.9
//! ```
//!
//! Values that aren't available are written as `-273.0` for the temperature
//! and `-1` otherwise.
//!
//! [1]: https://github.com/projecthorus/radiosonde_auto_rx

use std::io::Write;

use chrono::NaiveTime;
use serde::Serialize;

use crate::{
    Sonde,
    gnss::GPS_UTC_LEAP_SECONDS,
    lms6::Lms6,
    record::{
        Record,
        Value,
    },
    rs41::Rs41,
};

pub const NO_TEMPERATURE: f64 = -273.0;

pub const NOT_AVAILABLE: f64 = -1.0;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("record has no {path}")]
    MissingField { path: String },

    #[error("unsupported sonde type: {sonde_type}")]
    UnsupportedType { sonde_type: String },

    #[error("could not write log line")]
    Csv(#[from] csv::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogLine {
    pub timestamp: String,
    pub serial: String,
    pub frame: u64,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub vel_v: f64,
    pub vel_h: f64,
    pub heading: f64,
    pub temp: f64,
    pub humidity: f64,
    pub pressure: f64,
    #[serde(rename = "type")]
    pub sonde_type: String,
    pub sats: i64,
    pub batt_v: f64,
}

fn round(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

fn field<'a>(record: &'a Record, path: &[&str]) -> Result<&'a Value, Error> {
    record.lookup(path).ok_or_else(|| {
        Error::MissingField {
            path: path.join("."),
        }
    })
}

fn field_f64(record: &Record, path: &[&str]) -> Result<f64, Error> {
    let value = field(record, path)?;
    value.as_f64().ok_or_else(|| {
        Error::MissingField {
            path: path.join("."),
        }
    })
}

fn field_u64(record: &Record, path: &[&str]) -> Result<u64, Error> {
    let value = field(record, path)?;
    value.as_u64().ok_or_else(|| {
        Error::MissingField {
            path: path.join("."),
        }
    })
}

fn field_str<'a>(record: &'a Record, path: &[&str]) -> Result<&'a str, Error> {
    let value = field(record, path)?;
    value.as_str().ok_or_else(|| {
        Error::MissingField {
            path: path.join("."),
        }
    })
}

impl LogLine {
    /// Converts a decoded record, as returned by a
    /// [`Session`][crate::Session].
    pub fn from_record(record: &Record) -> Result<Self, Error> {
        let sonde_type = field_str(record, &["type"])?;
        match sonde_type {
            Rs41::NAME => Self::from_rs41(record),
            Lms6::NAME => Self::from_lms6(record),
            _ => {
                Err(Error::UnsupportedType {
                    sonde_type: sonde_type.to_owned(),
                })
            }
        }
    }

    fn from_rs41(record: &Record) -> Result<Self, Error> {
        let status = |name| ["blocks", "status", name];
        let position = |name| ["blocks", "gps_position", name];

        let timestamp = field(record, &["blocks", "gps_info", "timestamp"])?
            .as_timestamp()
            .ok_or_else(|| {
                Error::MissingField {
                    path: "blocks.gps_info.timestamp".to_owned(),
                }
            })?
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();

        let temp = record
            .lookup(&["blocks", "measurements", "temperature"])
            .and_then(Value::as_f64)
            .map_or(NO_TEMPERATURE, |temp| round(temp, 1));

        Ok(Self {
            timestamp,
            serial: field_str(record, &status("serial"))?.to_owned(),
            frame: field_u64(record, &status("frame_count"))?,
            lat: round(field_f64(record, &position("latitude"))?, 5),
            lon: round(field_f64(record, &position("longitude"))?, 5),
            alt: round(field_f64(record, &position("altitude"))?, 1),
            vel_v: round(field_f64(record, &position("ascent_rate"))?, 1),
            vel_h: round(field_f64(record, &position("ground_speed"))?, 1),
            heading: round(field_f64(record, &position("heading"))?, 1),
            temp,
            humidity: NOT_AVAILABLE,
            pressure: NOT_AVAILABLE,
            sonde_type: Rs41::NAME.to_owned(),
            sats: field_u64(record, &position("sats"))? as i64,
            batt_v: round(field_f64(record, &status("battery"))?, 1),
        })
    }

    /// The LMS6-403 doesn't transmit a date, so the timestamp is only the UTC
    /// time of day.
    fn from_lms6(record: &Record) -> Result<Self, Error> {
        let time_of_week = field_f64(record, &["time_of_week"])?;
        let time_of_day = (time_of_week - GPS_UTC_LEAP_SECONDS as f64).rem_euclid(86_400.0);
        let timestamp = NaiveTime::from_num_seconds_from_midnight_opt(
            time_of_day.trunc() as u32,
            (time_of_day.fract() * 1e9).round() as u32,
        )
        .map(|time| time.format("%H:%M:%S%.3fZ").to_string())
        .unwrap_or_default();

        let temp = record
            .get_f64("temperature")
            .map_or(NO_TEMPERATURE, |temp| round(temp, 1));

        Ok(Self {
            timestamp,
            serial: field_str(record, &["serial"])?.to_owned(),
            frame: field_u64(record, &["frame_count"])?,
            lat: round(field_f64(record, &["latitude"])?, 5),
            lon: round(field_f64(record, &["longitude"])?, 5),
            alt: round(field_f64(record, &["altitude"])?, 1),
            vel_v: round(field_f64(record, &["ascent_rate"])?, 1),
            vel_h: round(field_f64(record, &["ground_speed"])?, 1),
            heading: round(field_f64(record, &["heading"])?, 1),
            temp,
            humidity: NOT_AVAILABLE,
            pressure: NOT_AVAILABLE,
            sonde_type: Lms6::NAME.to_owned(),
            sats: -1,
            batt_v: NOT_AVAILABLE,
        })
    }
}

/// Writes [`LogLine`]s as CSV, starting with a header.
#[derive(Debug)]
pub struct LogWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LogWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(true)
                .from_writer(writer),
        }
    }

    pub fn write(&mut self, line: &LogLine) -> Result<(), Error> {
        self.writer.serialize(line)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W, Error> {
        self.writer
            .into_inner()
            .map_err(|error| Error::Csv(error.into_error().into()))
    }
}
