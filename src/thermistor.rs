//! Temperature sensor models.
//!
//! Both models return `None` instead of a placeholder when the calibration
//! doesn't allow a meaningful result.

/// 0 °C in Kelvin
pub const ZERO_CELSIUS: f64 = 273.15;

/// Polynomial model for a thermistor whose resistance is measured against two
/// reference resistors.
///
/// The sensor reports three frequencies: one for the thermistor and one for
/// each reference. The references establish a linear mapping from frequency
/// to resistance, which is then corrected and fed into a quadratic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemperatureCalibration {
    /// Resistance of the first reference
    pub reference_1: f64,
    /// Resistance of the second reference
    pub reference_2: f64,
    /// Polynomial coefficients
    pub co: [f64; 3],
    /// Resistance scale, offset and gain correction
    pub cal_t: [f64; 3],
}

impl TemperatureCalibration {
    /// Calculates the temperature in °C.
    ///
    /// `measured` is the thermistor reading, `freq1` and `freq2` are the
    /// readings of the two references.
    pub fn temperature(&self, measured: f64, freq1: f64, freq2: f64) -> Option<f64> {
        let gain = (freq2 - freq1) / (self.reference_2 - self.reference_1);
        let offset = (freq1 * self.reference_2 - freq2 * self.reference_1) / (freq2 - freq1);
        let resistance = (measured / gain - offset) * self.cal_t[0];

        let temperature = (self.co[0]
            + self.co[1] * resistance
            + self.co[2] * resistance * resistance
            + self.cal_t[1])
            * (1.0 + self.cal_t[2]);

        temperature.is_finite().then_some(temperature)
    }
}

/// β-parameter model: `1/T = 1/T0 + ln(R/R0)/B`, with `T0 = 0 °C`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BetaThermistor {
    pub r0: f64,
    pub b: f64,
}

impl BetaThermistor {
    pub fn temperature(&self, resistance: f64) -> Option<f64> {
        if self.r0 <= 0.0 || self.b == 0.0 || resistance <= 0.0 {
            return None;
        }

        let temperature = 1.0 / (1.0 / ZERO_CELSIUS + (resistance / self.r0).ln() / self.b)
            - ZERO_CELSIUS;

        temperature.is_finite().then_some(temperature)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::thermistor::{
        BetaThermistor,
        TemperatureCalibration,
    };

    fn calibration() -> TemperatureCalibration {
        TemperatureCalibration {
            reference_1: 750.0,
            reference_2: 1100.0,
            co: [-243.9108, 0.187654, 8.2e-06],
            cal_t: [1.279928, -0.063965, 0.0],
        }
    }

    #[test]
    fn it_maps_reference_frequencies_to_reference_resistances() {
        let calibration = TemperatureCalibration {
            co: [0.0, 1.0, 0.0],
            cal_t: [1.0, 0.0, 0.0],
            ..calibration()
        };

        // with an identity polynomial the result is the resistance
        let at_ref1 = calibration.temperature(3000.0, 3000.0, 4400.0).unwrap();
        assert_abs_diff_eq!(at_ref1, 750.0, epsilon = 1e-9);
        let at_ref2 = calibration.temperature(4400.0, 3000.0, 4400.0).unwrap();
        assert_abs_diff_eq!(at_ref2, 1100.0, epsilon = 1e-9);
        let halfway = calibration.temperature(3700.0, 3000.0, 4400.0).unwrap();
        assert_abs_diff_eq!(halfway, 925.0, epsilon = 1e-9);
    }

    #[test]
    fn it_applies_the_polynomial() {
        let calibration = TemperatureCalibration {
            co: [1.0, 2.0, 3.0],
            cal_t: [2.0, 0.5, 0.1],
            ..calibration()
        };

        // R = 750 * 2 = 1500
        let expected = (1.0 + 2.0 * 1500.0 + 3.0 * 1500.0 * 1500.0 + 0.5) * 1.1;
        let temperature = calibration.temperature(3000.0, 3000.0, 4400.0).unwrap();
        assert_abs_diff_eq!(temperature, expected, epsilon = 1e-6);
    }

    #[test]
    fn it_rejects_degenerate_readings() {
        // identical reference readings
        assert_eq!(calibration().temperature(3000.0, 3000.0, 3000.0), None);
    }

    #[test]
    fn it_evaluates_the_beta_model() {
        let thermistor = BetaThermistor {
            r0: 14726.0,
            b: 1697.0,
        };

        // R = R0 is 0 °C by definition
        assert_abs_diff_eq!(thermistor.temperature(14726.0).unwrap(), 0.0, epsilon = 1e-9);
        // higher resistance means colder
        assert!(thermistor.temperature(20000.0).unwrap() < 0.0);
        assert!(thermistor.temperature(10000.0).unwrap() > 0.0);
    }

    #[test]
    fn it_rejects_undefined_beta_inputs() {
        let thermistor = BetaThermistor { r0: 0.0, b: 1697.0 };
        assert_eq!(thermistor.temperature(100.0), None);

        let thermistor = BetaThermistor {
            r0: 14726.0,
            b: 0.0,
        };
        assert_eq!(thermistor.temperature(100.0), None);

        let thermistor = BetaThermistor {
            r0: 14726.0,
            b: 1697.0,
        };
        assert_eq!(thermistor.temperature(0.0), None);
        assert_eq!(thermistor.temperature(-5.0), None);
    }
}
