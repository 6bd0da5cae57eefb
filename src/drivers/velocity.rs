//! Rate of change of a height reading from its last three samples.
//!
//! The samples are not evenly spaced, so the estimator uses the three-point
//! derivative for non-uniform steps:
//!
//! ```text
//! dt21 = t2 - t1, dt20 = t2 - t0
//! v = ((f1 - f2) / dt21² + (f2 - f0) / dt20²) / (1/dt20 - 1/dt21)
//! ```
//!
//! which is the usual central difference when the steps are equal.

use std::collections::VecDeque;
use std::time::Duration;

use log::debug;

use crate::types::{Sample, SeriesId, Validity};

const WINDOW: usize = 3;

#[derive(Clone, Debug)]
pub struct VelocityEstimator {
    label: String,
    source: SeriesId,
    window: VecDeque<(Duration, f64)>,
    last_velocity: Option<f64>,
    last_time: Option<Duration>,
}

impl VelocityEstimator {
    /// `source` must name a channel reading; the estimator only reads it.
    pub fn new(label: impl Into<String>, source: SeriesId) -> Self {
        Self {
            label: label.into(),
            source,
            window: VecDeque::with_capacity(WINDOW + 1),
            last_velocity: None,
            last_time: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> SeriesId {
        self.source
    }

    /// Feed the height channel's newest sample and recompute. Invalid samples
    /// are not added to the window. `None` means "no value yet" or that the
    /// timing was degenerate.
    pub fn update(&mut self, sample: &Sample) -> Option<f64> {
        if let Some(height) = sample.value() {
            self.window.push_back((sample.timestamp, height));
            while self.window.len() > WINDOW {
                self.window.pop_front();
            }
        }
        self.last_velocity = self.estimate();
        self.last_time = self.window.back().map(|(t, _)| *t);
        if self.last_velocity.is_none() && self.window.len() == WINDOW {
            debug!("{}: degenerate sample spacing, no velocity", self.label);
        }
        self.last_velocity
    }

    pub fn last_velocity(&self) -> Option<f64> {
        self.last_velocity
    }

    /// The latest estimate as a sample stamped with the newest height's time,
    /// so it can be plotted and logged like a channel reading.
    pub fn last_sample(&self) -> Option<Sample> {
        let velocity = self.last_velocity?;
        let at = self.last_time?;
        Some(Sample::new(at, velocity, velocity, Validity::Valid))
    }

    fn estimate(&self) -> Option<f64> {
        if self.window.len() < WINDOW {
            return None;
        }
        let (t0, f0) = self.window[0];
        let (t1, f1) = self.window[1];
        let (t2, f2) = self.window[2];
        let dt21 = t2.as_secs_f64() - t1.as_secs_f64();
        let dt20 = t2.as_secs_f64() - t0.as_secs_f64();
        if dt21 == 0.0 || dt20 == 0.0 || dt20 == dt21 {
            return None;
        }
        let v = ((f1 - f2) / (dt21 * dt21) + (f2 - f0) / (dt20 * dt20))
            / (1.0 / dt20 - 1.0 / dt21);
        v.is_finite().then_some(v)
    }
}
