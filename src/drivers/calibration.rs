//! Voltage -> physical value transforms, one per sensor type.
//!
//! Every model is pure: the same voltage (and context) always gives the same
//! value and classification. Thresholds are fields so device-specific tuning
//! lives in configuration; the serde defaults are the bench's calibration.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::drivers::source::AnalogPin;
use crate::drivers::thermocouple::{celsius_to_millivolts, in_table, millivolts_to_celsius};
use crate::types::{Sample, Validity};

/// Result of applying a model to one voltage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Conversion {
    pub value: f64,
    pub validity: Validity,
}

impl Conversion {
    fn classify(value: f64, validity: Validity) -> Self {
        let validity = if value.is_finite() {
            validity
        } else {
            Validity::Malfunction
        };
        Self { value, validity }
    }
}

/// Reference junction of a thermocouple.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColdJunction {
    /// Temperature sensor wired to a second analog input.
    Channel(AnalogPin),
    /// The acquisition device's own temperature, or the configured ambient
    /// temperature when the device cannot report one.
    #[default]
    Ambient,
}

/// Inputs that are not part of the raw voltage itself.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ConversionContext {
    /// Resolved cold-junction temperature in °C.
    pub cold_junction_c: Option<f64>,
    /// Last temperature the channel classified as valid.
    pub previous_valid: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationModel {
    Convectron {
        #[serde(default = "defaults::convectron_off_below")]
        off_below: f64,
    },
    Baratron {
        #[serde(default = "defaults::baratron_under_below")]
        under_below: f64,
        #[serde(default = "defaults::baratron_over_above")]
        over_above: f64,
    },
    IonGauge {
        #[serde(default = "defaults::ion_gauge_off_above")]
        off_above: f64,
    },
    /// Pfeiffer full range gauge; other gauges with the same log-linear
    /// output (the Lesker controller) use it with `off_below: 0.0`.
    PfeifferFullRange {
        #[serde(default = "defaults::pfeiffer_off_below")]
        off_below: f64,
    },
    Thermocouple {
        #[serde(default)]
        cold_junction: ColdJunction,
        #[serde(default = "defaults::ambient_c")]
        ambient_c: f64,
        #[serde(default = "defaults::malfunction_delta")]
        malfunction_delta: f64,
    },
    Flow,
    RawPassthrough {
        #[serde(default = "defaults::decimals")]
        decimals: usize,
    },
}

pub(crate) mod defaults {
    pub fn convectron_off_below() -> f64 {
        2e-4
    }
    pub fn baratron_under_below() -> f64 {
        3e-3
    }
    pub fn baratron_over_above() -> f64 {
        10.0
    }
    pub fn ion_gauge_off_above() -> f64 {
        1e-3
    }
    pub fn pfeiffer_off_below() -> f64 {
        1e-11
    }
    pub fn ambient_c() -> f64 {
        25.0
    }
    pub fn malfunction_delta() -> f64 {
        50.0
    }
    pub fn decimals() -> usize {
        2
    }
}

/// Cold-junction sensor output (V) to °C.
pub fn cold_junction_celsius(volts: f64) -> f64 {
    55.56 * volts - 17.78
}

/// Device temperature sensor (K) to the ambient estimate at the terminals (°C).
pub fn device_ambient_celsius(kelvin: f64) -> f64 {
    kelvin + 2.5 - 273.15
}

impl CalibrationModel {
    pub fn convectron() -> Self {
        CalibrationModel::Convectron {
            off_below: defaults::convectron_off_below(),
        }
    }

    pub fn baratron() -> Self {
        CalibrationModel::Baratron {
            under_below: defaults::baratron_under_below(),
            over_above: defaults::baratron_over_above(),
        }
    }

    pub fn ion_gauge() -> Self {
        CalibrationModel::IonGauge {
            off_above: defaults::ion_gauge_off_above(),
        }
    }

    pub fn pfeiffer_full_range() -> Self {
        CalibrationModel::PfeifferFullRange {
            off_below: defaults::pfeiffer_off_below(),
        }
    }

    pub fn thermocouple(cold_junction: ColdJunction) -> Self {
        CalibrationModel::Thermocouple {
            cold_junction,
            ambient_c: defaults::ambient_c(),
            malfunction_delta: defaults::malfunction_delta(),
        }
    }

    pub fn raw(decimals: usize) -> Self {
        CalibrationModel::RawPassthrough { decimals }
    }

    /// Apply with no cold-junction reading and no history.
    pub fn apply(&self, volts: f64) -> Conversion {
        self.apply_with(volts, &ConversionContext::default())
    }

    pub fn apply_with(&self, volts: f64, ctx: &ConversionContext) -> Conversion {
        match *self {
            CalibrationModel::Convectron { off_below } => {
                let value = 10f64.powf(volts - 4.0);
                let validity = if value < off_below {
                    Validity::Off
                } else {
                    Validity::Valid
                };
                Conversion::classify(value, validity)
            }
            CalibrationModel::Baratron {
                under_below,
                over_above,
            } => {
                let validity = if volts < under_below {
                    Validity::Under
                } else if volts > over_above {
                    Validity::Over
                } else {
                    Validity::Valid
                };
                Conversion::classify(volts, validity)
            }
            CalibrationModel::IonGauge { off_above } => {
                let value = ion_gauge_pressure(volts);
                let validity = if value > off_above {
                    Validity::Off
                } else {
                    Validity::Valid
                };
                Conversion::classify(value, validity)
            }
            CalibrationModel::PfeifferFullRange { off_below } => {
                let value = 10f64.powf(1.667 * volts - 11.46);
                let validity = if value < off_below {
                    Validity::Off
                } else {
                    Validity::Valid
                };
                Conversion::classify(value, validity)
            }
            CalibrationModel::Thermocouple {
                ambient_c,
                malfunction_delta,
                ..
            } => {
                let reference_c = ctx.cold_junction_c.unwrap_or(ambient_c);
                let total_mv = volts * 1000.0 + celsius_to_millivolts(reference_c);
                let value = millivolts_to_celsius(total_mv);
                // a reading off the type K table means an open or shorted sensor
                let validity = match ctx.previous_valid {
                    _ if !in_table(total_mv) => Validity::Malfunction,
                    Some(previous) if (value - previous).abs() > malfunction_delta => {
                        Validity::Malfunction
                    }
                    _ => Validity::Valid,
                };
                Conversion::classify(value, validity)
            }
            CalibrationModel::Flow | CalibrationModel::RawPassthrough { .. } => {
                Conversion::classify(volts, Validity::Valid)
            }
        }
    }

    pub fn is_thermocouple(&self) -> bool {
        matches!(self, CalibrationModel::Thermocouple { .. })
    }

    /// Text a display shows for a sample produced by this model.
    pub fn display(&self, sample: &Sample) -> String {
        if let Some(sentinel) = sample.validity.sentinel() {
            return sentinel.to_owned();
        }
        let value = sample.computed();
        match self {
            CalibrationModel::Convectron { .. }
            | CalibrationModel::Baratron { .. }
            | CalibrationModel::IonGauge { .. }
            | CalibrationModel::PfeifferFullRange { .. } => format!("{value:.2e}"),
            CalibrationModel::Thermocouple { .. } => format!("{value:.1}"),
            CalibrationModel::Flow => format!("{value:.2}"),
            CalibrationModel::RawPassthrough { decimals } => format!("{value:.decimals$}"),
        }
    }

    /// Span of raw values the simulated source produces for this sensor.
    pub fn simulated_range(&self) -> Range<f64> {
        match self {
            CalibrationModel::Thermocouple { .. } => 0.0..0.007,
            CalibrationModel::Flow => 0.0..10.0,
            _ => 0.0..8.0,
        }
    }
}

// The controller encodes pressure as exponent + fractional mantissa. The
// mantissa is rounded to two decimals of its exact binary value (ties to
// even), and the result is the nearest double to `<mantissa>e-<exponent>`.
fn ion_gauge_pressure(volts: f64) -> f64 {
    let exponent = volts.abs().floor();
    let mantissa = (1.0 - (volts - exponent)) * 10.0;
    let hundredths = round_hundredths(mantissa);
    // integer over an exact power of ten rounds once
    hundredths / 10f64.powi(exponent as i32 + 2)
}

fn round_hundredths(value: f64) -> f64 {
    let mut rounded = (value * 100.0).round();
    // exact `value * 100 - rounded`; the product alone may round onto a tie
    let residue = value.mul_add(100.0, -rounded);
    if residue < -0.5 {
        rounded -= 1.0;
    } else if residue > 0.5 {
        rounded += 1.0;
    } else if residue.abs() == 0.5 && rounded % 2.0 != 0.0 {
        rounded += residue.signum();
    }
    rounded
}
