//! # Radiosonde telemetry decoder
//!
//! Decodes frames received from weather balloon radiosondes into structured
//! [`Record`]s. Two sonde families are supported:
//!
//! - [Vaisala RS41][rs41]: frames made up of individually checksummed
//!   sub-blocks. Calibration data is spread over 51 frames as a subframe.
//! - [Lockheed Martin LMS6-403][lms6]: one fixed-layout block per frame, with
//!   calibration values cycling every 7 frames.
//!
//! Frames are expected to be demodulated and error-corrected already. A
//! [`Session`][session::Session] tracks one physical sonde across frames and
//! collects its calibration data.

pub mod autorx;
pub mod checksum;
pub mod codec;
pub mod gnss;
pub mod lms6;
pub mod record;
pub mod rs41;
pub mod session;
pub mod source;
pub mod thermistor;
pub mod util;

pub use crate::{
    record::{
        Record,
        Value,
    },
    session::{
        CalibrationStore,
        Session,
        Sonde,
    },
};

/// Error that makes a whole frame undecodable.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is {length} bytes long, but at least {expected} bytes are needed")]
    TooShort { length: usize, expected: usize },

    #[error("frame header mismatch: {header}")]
    HeaderMismatch { header: String },

    #[error("unknown frame type: {value:#04x}")]
    UnknownFrameType { value: u8 },

    #[error(transparent)]
    LengthMismatch(#[from] codec::LengthMismatch),

    #[error("checksum mismatch in block at offset {offset}")]
    Checksum { offset: usize },

    #[error("block at offset {offset} runs past the end of the frame")]
    Truncated { offset: usize },
}

/// Error returned by a [`Session`] when a frame can't be added.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("telemetry is from a different radiosonde: got {received}, expected {expected}")]
    SerialMismatch { expected: String, received: String },

    #[error("decoded frame has no {name}")]
    MissingField { name: &'static str },
}
