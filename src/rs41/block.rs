//! RS41 sub-blocks
//!
//! Layouts follow [bazjo/RS41_Decoding][1]. All fields are little-endian.
//!
//! [1]: https://github.com/bazjo/RS41_Decoding/tree/master/RS41-SGP

use bitflags::bitflags;
use bytes::Buf;
use chrono::{
    DateTime,
    Utc,
};

use crate::{
    DecodeError,
    codec::{
        LengthMismatch,
        uint24_le,
    },
    gnss::{
        GPS_UTC_LEAP_SECONDS,
        GeodeticPosition,
        LocalVelocity,
        ecef_to_geodetic,
        ecef_velocity,
        gps_time_to_utc,
    },
    record::{
        Record,
        Value,
    },
    rs41::subframe::{
        SEGMENT_LENGTH,
        Subframe,
    },
    util::BufReadBytesExt,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockType {
    Status,
    Measurements,
    GpsPosition,
    GpsInfo,
}

impl BlockType {
    /// Returns `None` for block types we don't decode, e.g. raw GPS
    /// measurements (`0x7d`), XDATA (`0x7e`), padding (`0x76`) or encrypted
    /// blocks (`0x80`).
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x79 => Some(Self::Status),
            0x7a => Some(Self::Measurements),
            0x7b => Some(Self::GpsPosition),
            0x7c => Some(Self::GpsInfo),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            BlockType::Status => 0x79,
            BlockType::Measurements => 0x7a,
            BlockType::GpsPosition => 0x7b,
            BlockType::GpsInfo => 0x7c,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlockType::Status => "status",
            BlockType::Measurements => "measurements",
            BlockType::GpsPosition => "gps_position",
            BlockType::GpsInfo => "gps_info",
        }
    }

    pub fn expected_length(&self) -> usize {
        match self {
            BlockType::Status => 40,
            BlockType::Measurements => 42,
            BlockType::GpsPosition => 21,
            BlockType::GpsInfo => 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Status(Status),
    Measurements(Measurements),
    GpsPosition(GpsPosition),
    GpsInfo(GpsInfo),
}

impl Block {
    /// Decodes a block payload.
    ///
    /// The payload must have the [expected length][BlockType::expected_length]
    /// for `block_type`.
    pub fn decode(
        block_type: BlockType,
        payload: &[u8],
        subframe: Option<&Subframe>,
    ) -> Result<Self, DecodeError> {
        let expected_length = block_type.expected_length();
        if payload.len() != expected_length {
            return Err(DecodeError::LengthMismatch(LengthMismatch {
                expected: expected_length,
                actual: payload.len(),
            }));
        }

        let mut buffer = payload;
        let block = match block_type {
            BlockType::Status => Self::Status(Status::decode(&mut buffer)),
            BlockType::Measurements => {
                Self::Measurements(Measurements::decode(&mut buffer, subframe)?)
            }
            BlockType::GpsPosition => Self::GpsPosition(GpsPosition::decode(&mut buffer)),
            BlockType::GpsInfo => Self::GpsInfo(GpsInfo::decode(&mut buffer)),
        };
        Ok(block)
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            Block::Status(_) => BlockType::Status,
            Block::Measurements(_) => BlockType::Measurements,
            Block::GpsPosition(_) => BlockType::GpsPosition,
            Block::GpsInfo(_) => BlockType::GpsInfo,
        }
    }

    pub fn to_record(&self) -> Record {
        match self {
            Block::Status(status) => status.to_record(),
            Block::Measurements(measurements) => measurements.to_record(),
            Block::GpsPosition(gps_position) => gps_position.to_record(),
            Block::GpsInfo(gps_info) => gps_info.to_record(),
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FlightStatus: u16 {
        const START_DETECTED = 0x0001;
        const DESCENDING = 0x0002;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub frame_count: u16,
    pub serial: String,
    /// Volts
    pub battery: f64,
    pub unknown1: u16,
    pub flight_status: FlightStatus,
    pub unknown2: u8,
    pub ref_area_temp: u8,
    pub sensor_status: u16,
    pub heating_pwm: u16,
    pub tx_power: u8,
    /// Highest subframe segment index
    pub max_subframe: u8,
    /// Index of the segment in `subframe_data`
    pub subframe_count: u8,
    pub subframe_data: [u8; SEGMENT_LENGTH],
}

impl Status {
    fn decode<B: Buf>(buffer: &mut B) -> Self {
        Self {
            frame_count: buffer.get_u16_le(),
            serial: buffer.get_padded_str::<8>(),
            battery: f64::from(buffer.get_u8()) / 10.0,
            unknown1: buffer.get_u16_le(),
            flight_status: FlightStatus::from_bits_retain(buffer.get_u16_le()),
            unknown2: buffer.get_u8(),
            ref_area_temp: buffer.get_u8(),
            sensor_status: buffer.get_u16_le(),
            heating_pwm: buffer.get_u16_le(),
            tx_power: buffer.get_u8(),
            max_subframe: buffer.get_u8(),
            subframe_count: buffer.get_u8(),
            subframe_data: buffer.get_bytes(),
        }
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("frame_count", self.frame_count);
        record.insert("serial", self.serial.as_str());
        record.insert("battery", self.battery);
        record.insert("unknown1", self.unknown1);
        record.insert(
            "start_detected",
            self.flight_status.contains(FlightStatus::START_DETECTED),
        );
        record.insert(
            "descending",
            self.flight_status.contains(FlightStatus::DESCENDING),
        );
        record.insert("unknown2", self.unknown2);
        record.insert("ref_area_temp", self.ref_area_temp);
        record.insert("sensor_status", self.sensor_status);
        record.insert("humidity_sensor_heating_pwm", self.heating_pwm);
        record.insert("tx_power", self.tx_power);
        record.insert("max_subframe", self.max_subframe);
        record.insert("subframe_count", self.subframe_count);
        record.insert("subframe_data", &self.subframe_data[..]);
        record
    }
}

/// Raw sensor frequencies. Each sensor is measured together with two
/// reference resistors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SensorReading {
    pub main: u32,
    pub ref1: u32,
    pub ref2: u32,
}

impl SensorReading {
    fn decode<B: Buf>(buffer: &mut B) -> Result<Self, DecodeError> {
        Ok(Self {
            main: uint24_le(&buffer.get_bytes::<3>())?,
            ref1: uint24_le(&buffer.get_bytes::<3>())?,
            ref2: uint24_le(&buffer.get_bytes::<3>())?,
        })
    }

    fn insert_into(&self, record: &mut Record, prefix: &str) {
        record.insert(format!("{prefix}_main"), self.main);
        record.insert(format!("{prefix}_ref1"), self.ref1);
        record.insert(format!("{prefix}_ref2"), self.ref2);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Measurements {
    pub temperature_sensor: SensorReading,
    pub humidity_sensor: SensorReading,
    pub humidity_temperature_sensor: SensorReading,
    pub pressure_sensor: SensorReading,
    pub unknown: u16,
    /// °C
    pub pressure_temp: f64,
    pub unknown2: u16,
    /// °C, if the subframe contained the calibration.
    pub temperature: Option<f64>,
}

impl Measurements {
    fn decode<B: Buf>(buffer: &mut B, subframe: Option<&Subframe>) -> Result<Self, DecodeError> {
        let temperature_sensor = SensorReading::decode(buffer)?;
        let humidity_sensor = SensorReading::decode(buffer)?;
        let humidity_temperature_sensor = SensorReading::decode(buffer)?;
        let pressure_sensor = SensorReading::decode(buffer)?;
        let unknown = buffer.get_u16_le();
        let pressure_temp = f64::from(buffer.get_i16_le()) / 100.0;
        let unknown2 = buffer.get_u16_le();

        let temperature = subframe
            .and_then(Subframe::temperature_calibration)
            .and_then(|calibration| {
                calibration.temperature(
                    f64::from(temperature_sensor.main),
                    f64::from(temperature_sensor.ref1),
                    f64::from(temperature_sensor.ref2),
                )
            });

        Ok(Self {
            temperature_sensor,
            humidity_sensor,
            humidity_temperature_sensor,
            pressure_sensor,
            unknown,
            pressure_temp,
            unknown2,
            temperature,
        })
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        self.temperature_sensor.insert_into(&mut record, "temp_meas");
        self.humidity_sensor.insert_into(&mut record, "humidity");
        self.humidity_temperature_sensor
            .insert_into(&mut record, "humidity_temp");
        self.pressure_sensor.insert_into(&mut record, "pressure");
        record.insert("unknown", self.unknown);
        record.insert("pressure_temp", self.pressure_temp);
        record.insert("unknown2", self.unknown2);
        record.insert("temperature_valid", self.temperature.is_some());
        if let Some(temperature) = self.temperature {
            record.insert("temperature", temperature);
        }
        record
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GpsPosition {
    /// ECEF position in meters
    pub ecef_position: [f64; 3],
    /// ECEF velocity in m/s
    pub ecef_velocity: [f64; 3],
    pub num_sats: u8,
    pub speed_accuracy: f64,
    pub pdop: f64,
    /// `None` without a GPS fix.
    pub position: Option<GeodeticPosition>,
    pub velocity: Option<LocalVelocity>,
}

impl GpsPosition {
    fn decode<B: Buf>(buffer: &mut B) -> Self {
        let ecef_position = [(); 3].map(|_| f64::from(buffer.get_i32_le()) / 100.0);
        let ecef_vel = [(); 3].map(|_| f64::from(buffer.get_i16_le()) / 100.0);
        let num_sats = buffer.get_u8();
        let speed_accuracy = f64::from(buffer.get_u8()) * 10.0;
        let pdop = f64::from(buffer.get_u8()) / 10.0;

        let [x, y, z] = ecef_position;
        let (position, velocity) = if x == 0.0 && y == 0.0 {
            (None, None)
        }
        else {
            let position = ecef_to_geodetic(x, y, z);
            let [vx, vy, vz] = ecef_vel;
            let velocity = ecef_velocity(position.latitude, position.longitude, vx, vy, vz);
            (Some(position), Some(velocity))
        };

        Self {
            ecef_position,
            ecef_velocity: ecef_vel,
            num_sats,
            speed_accuracy,
            pdop,
            position,
            velocity,
        }
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        let [x, y, z] = self.ecef_position;
        record.insert("ecef_pos_x", x);
        record.insert("ecef_pos_y", y);
        record.insert("ecef_pos_z", z);
        let [vx, vy, vz] = self.ecef_velocity;
        record.insert("ecef_vel_x", vx);
        record.insert("ecef_vel_y", vy);
        record.insert("ecef_vel_z", vz);
        record.insert("sats", self.num_sats);
        record.insert("speed_accuracy", self.speed_accuracy);
        record.insert("pdop", self.pdop);
        record.insert("position_valid", self.position.is_some());

        if let Some(position) = &self.position {
            record.insert("latitude", position.latitude);
            record.insert("longitude", position.longitude);
            record.insert("altitude", position.altitude);
        }
        if let Some(velocity) = &self.velocity {
            record.insert("ground_speed", velocity.ground_speed);
            record.insert("ascent_rate", velocity.ascent_rate);
            record.insert("wind_u", velocity.wind_u);
            record.insert("wind_v", velocity.wind_v);
            record.insert("heading", velocity.heading);
        }

        record
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GpsInfo {
    pub gps_week: u16,
    /// Seconds
    pub time_of_week: f64,
    /// `(sv id, quality)` for every used channel
    pub satellites: Vec<(u8, u8)>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl GpsInfo {
    fn decode<B: Buf>(buffer: &mut B) -> Self {
        let gps_week = buffer.get_u16_le();
        let time_of_week = f64::from(buffer.get_u32_le()) / 1000.0;

        // sv id 0 marks an unused channel
        let satellites = (0..12)
            .map(|_| (buffer.get_u8(), buffer.get_u8()))
            .filter(|(sv_id, _)| *sv_id != 0)
            .collect();

        let timestamp = gps_time_to_utc(gps_week.into(), time_of_week, GPS_UTC_LEAP_SECONDS);

        Self {
            gps_week,
            time_of_week,
            satellites,
            timestamp,
        }
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("gps_week", self.gps_week);
        record.insert("time_of_week", self.time_of_week);
        if let Some(timestamp) = self.timestamp {
            record.insert("timestamp", timestamp);
        }
        let satellites: Record = self
            .satellites
            .iter()
            .map(|(sv_id, quality)| (sv_id.to_string(), Value::from(*quality)))
            .collect();
        record.insert("satellites", satellites);
        record
    }
}
