//! Geodetic conversions for GNSS-derived data.
//!
//! The RS41 reports its position and velocity in ECEF coordinates; these are
//! converted to WGS84 latitude/longitude/altitude and to a local
//! north-east-up frame here.
//!
//! - [rs1729/RS `ecef2elli`][1]
//! - [Bowring's method][2]
//!
//! [1]: https://github.com/rs1729/RS/blob/master/demod/mod/rs41mod.c
//! [2]: https://en.wikipedia.org/wiki/Geographic_coordinate_conversion#The_application_of_Ferrari's_solution

use chrono::{
    DateTime,
    TimeDelta,
    TimeZone,
    Utc,
};

use crate::util::normalize_degrees;

/// WGS84 semi-major axis in meters
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS84 semi-minor axis in meters
pub const WGS84_B: f64 = 6_356_752.314_245_18;

const A2_B2: f64 = WGS84_A * WGS84_A - WGS84_B * WGS84_B;

/// First eccentricity squared
const E2: f64 = A2_B2 / (WGS84_A * WGS84_A);

/// Second eccentricity squared
const EE2: f64 = A2_B2 / (WGS84_B * WGS84_B);

/// GPS-UTC offset since 2017-01-01.
pub const GPS_UTC_LEAP_SECONDS: i64 = 18;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeodeticPosition {
    /// Degrees, positive north
    pub latitude: f64,
    /// Degrees, positive east
    pub longitude: f64,
    /// Meters above the ellipsoid
    pub altitude: f64,
}

/// Velocity relative to the ground, derived from a north-east-up vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalVelocity {
    /// Horizontal speed in m/s
    pub ground_speed: f64,
    /// Vertical speed in m/s, positive up
    pub ascent_rate: f64,
    /// East component in m/s
    pub wind_u: f64,
    /// North component in m/s
    pub wind_v: f64,
    /// Direction of travel in degrees, `[0, 360)`, clockwise from north
    pub heading: f64,
}

impl LocalVelocity {
    pub fn from_neu(north: f64, east: f64, up: f64) -> Self {
        Self {
            ground_speed: north.hypot(east),
            ascent_rate: up,
            wind_u: east,
            wind_v: north,
            heading: normalize_degrees(east.atan2(north).to_degrees()),
        }
    }
}

/// Converts ECEF coordinates (meters) to WGS84.
///
/// This does a single Bowring step instead of iterating, which is accurate to
/// well below a millimeter for anything a balloon can reach.
///
/// # Precondition
///
/// `x` and `y` must not both be zero. The longitude is undefined on the polar
/// axis, and the altitude calculation divides by `cos(latitude)`.
pub fn ecef_to_geodetic(x: f64, y: f64, z: f64) -> GeodeticPosition {
    let lambda = y.atan2(x);

    let p = x.hypot(y);
    let t = (z * WGS84_A).atan2(p * WGS84_B);
    let (sin_t, cos_t) = t.sin_cos();

    let phi = (z + EE2 * WGS84_B * sin_t.powi(3)).atan2(p - E2 * WGS84_A * cos_t.powi(3));

    let radius = WGS84_A / (1.0 - E2 * phi.sin().powi(2)).sqrt();

    GeodeticPosition {
        latitude: phi.to_degrees(),
        longitude: lambda.to_degrees(),
        altitude: p / phi.cos() - radius,
    }
}

/// Inverse of [`ecef_to_geodetic`].
pub fn geodetic_to_ecef(position: &GeodeticPosition) -> (f64, f64, f64) {
    let (sin_phi, cos_phi) = position.latitude.to_radians().sin_cos();
    let (sin_lambda, cos_lambda) = position.longitude.to_radians().sin_cos();

    let radius = WGS84_A / (1.0 - E2 * sin_phi * sin_phi).sqrt();

    (
        (radius + position.altitude) * cos_phi * cos_lambda,
        (radius + position.altitude) * cos_phi * sin_lambda,
        (radius * (1.0 - E2) + position.altitude) * sin_phi,
    )
}

/// Rotates an ECEF velocity (m/s) into the local frame at the given position.
pub fn ecef_velocity(latitude: f64, longitude: f64, vx: f64, vy: f64, vz: f64) -> LocalVelocity {
    let (sin_phi, cos_phi) = latitude.to_radians().sin_cos();
    let (sin_lambda, cos_lambda) = longitude.to_radians().sin_cos();

    let north = -vx * sin_phi * cos_lambda - vy * sin_phi * sin_lambda + vz * cos_phi;
    let east = -vx * sin_lambda + vy * cos_lambda;
    let up = vx * cos_phi * cos_lambda + vy * cos_phi * sin_lambda + vz * sin_phi;

    LocalVelocity::from_neu(north, east, up)
}

/// Converts GPS week and time of week to UTC.
///
/// Returns `None` if the result isn't representable.
pub fn gps_time_to_utc(
    week: i64,
    seconds_of_week: f64,
    leap_seconds: i64,
) -> Option<DateTime<Utc>> {
    let epoch = Utc.with_ymd_and_hms(1980, 1, 6, 0, 0, 0).single()?;
    let offset = TimeDelta::try_weeks(week)?
        .checked_add(&TimeDelta::microseconds(
            (seconds_of_week * 1e6).round() as i64,
        ))?
        .checked_sub(&TimeDelta::try_seconds(leap_seconds)?)?;
    epoch.checked_add_signed(offset)
}
