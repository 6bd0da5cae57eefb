//! Type K thermocouple voltage/temperature correspondence.
//!
//! Uses the NIST ITS-90 reference polynomials: the forward direction
//! (°C -> mV) is exact to the table, the inverse is accurate to about
//! ±0.06 °C inside -200..1372 °C. Outside that span the polynomials are
//! extrapolated; check `in_table` before trusting a conversion.

/// Lowest millivolt value covered by the inverse polynomials.
pub const MIN_MILLIVOLTS: f64 = -5.891;
/// Highest millivolt value covered by the inverse polynomials.
pub const MAX_MILLIVOLTS: f64 = 54.886;

pub fn in_table(millivolts: f64) -> bool {
    (MIN_MILLIVOLTS..=MAX_MILLIVOLTS).contains(&millivolts)
}

const FORWARD_BELOW_ZERO: [f64; 11] = [
    0.0,
    0.394501280250e-01,
    0.236223735980e-04,
    -0.328589067840e-06,
    -0.499048287770e-08,
    -0.675090591730e-10,
    -0.574103274280e-12,
    -0.310888728940e-14,
    -0.104516093650e-16,
    -0.198892668780e-19,
    -0.163226974860e-22,
];

const FORWARD_ABOVE_ZERO: [f64; 10] = [
    -0.176004136860e-01,
    0.389212049750e-01,
    0.185587700320e-04,
    -0.994575928740e-07,
    0.318409457190e-09,
    -0.560728448890e-12,
    0.560750590590e-15,
    -0.320207200030e-18,
    0.971511471520e-22,
    -0.121047212750e-25,
];

// exponential correction term above 0 °C: a0 * exp(a1 * (t - a2)^2)
const FORWARD_EXP: (f64, f64, f64) = (0.118597600000, -0.118343200000e-03, 0.126968600000e+03);

const INVERSE_NEGATIVE: [f64; 9] = [
    0.0,
    2.5173462e+01,
    -1.1662878,
    -1.0833638,
    -8.9773540e-01,
    -3.7342377e-01,
    -8.6632643e-02,
    -1.0450598e-02,
    -5.1920577e-04,
];

const INVERSE_LOW: [f64; 10] = [
    0.0,
    2.508355e+01,
    7.860106e-02,
    -2.503131e-01,
    8.315270e-02,
    -1.228034e-02,
    9.804036e-04,
    -4.413030e-05,
    1.057734e-06,
    -1.052755e-08,
];

const INVERSE_HIGH: [f64; 7] = [
    -1.318058e+02,
    4.830222e+01,
    -1.646031,
    5.464731e-02,
    -9.650715e-04,
    8.802193e-06,
    -3.110810e-08,
];

const INVERSE_SPLIT_MILLIVOLTS: f64 = 20.644;

fn horner(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Thermoelectric voltage (mV) of a type K junction at `celsius`, referenced to 0 °C.
pub fn celsius_to_millivolts(celsius: f64) -> f64 {
    if celsius < 0.0 {
        horner(&FORWARD_BELOW_ZERO, celsius)
    } else {
        let (a0, a1, a2) = FORWARD_EXP;
        let d = celsius - a2;
        horner(&FORWARD_ABOVE_ZERO, celsius) + a0 * (a1 * d * d).exp()
    }
}

/// Junction temperature (°C) for a voltage referenced to 0 °C.
pub fn millivolts_to_celsius(millivolts: f64) -> f64 {
    if millivolts < 0.0 {
        horner(&INVERSE_NEGATIVE, millivolts)
    } else if millivolts < INVERSE_SPLIT_MILLIVOLTS {
        horner(&INVERSE_LOW, millivolts)
    } else {
        horner(&INVERSE_HIGH, millivolts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_table_points() {
        // NIST table: 25 °C -> 1.000 mV, 100 °C -> 4.096 mV, -100 °C -> -3.554 mV
        assert!((celsius_to_millivolts(25.0) - 1.000).abs() < 0.002);
        assert!((celsius_to_millivolts(100.0) - 4.096).abs() < 0.002);
        assert!((celsius_to_millivolts(-100.0) + 3.554).abs() < 0.002);
        assert!(celsius_to_millivolts(0.0).abs() < 0.001);
    }

    #[test]
    fn inverse_tracks_forward() {
        for t in [-150.0, -20.0, 0.0, 25.0, 100.0, 400.0, 800.0, 1200.0] {
            let back = millivolts_to_celsius(celsius_to_millivolts(t));
            assert!((back - t).abs() < 0.1, "{t} came back as {back}");
        }
    }

    #[test]
    fn correspondence_is_monotonic() {
        let mut previous = millivolts_to_celsius(MIN_MILLIVOLTS);
        let mut mv = MIN_MILLIVOLTS + 0.5;
        while mv < MAX_MILLIVOLTS {
            let t = millivolts_to_celsius(mv);
            assert!(t > previous, "not increasing at {mv} mV");
            previous = t;
            mv += 0.5;
        }
    }
}
