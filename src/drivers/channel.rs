use std::collections::VecDeque;
use std::time::Duration;

use log::debug;

use crate::drivers::calibration::{
    cold_junction_celsius, device_ambient_celsius, CalibrationModel, ColdJunction,
    ConversionContext,
};
use crate::drivers::source::{ChannelInput, SharedSource};
use crate::drivers::{MonitorError, SourceError};
use crate::types::Sample;

/// Samples kept per reading for velocity tracking.
pub const HISTORY_CAPACITY: usize = 3;

/// Latest state of one reading of a channel. Analog channels have exactly one;
/// frame devices have one per index.
#[derive(Clone, Debug)]
pub struct Reading {
    label: String,
    last: Option<Sample>,
    last_valid: Option<f64>,
    history: VecDeque<Sample>,
    tracked: bool,
}

impl Reading {
    fn new(label: String) -> Self {
        Self {
            label,
            last: None,
            last_valid: None,
            history: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
            tracked: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.last.as_ref()
    }

    /// Oldest to newest, at most `HISTORY_CAPACITY` entries. Empty unless the
    /// reading feeds a velocity estimator.
    pub fn history(&self) -> impl Iterator<Item = &Sample> {
        self.history.iter()
    }

    pub fn is_tracked(&self) -> bool {
        self.tracked
    }

    fn record(&mut self, sample: Sample) {
        if let Some(value) = sample.value() {
            self.last_valid = Some(value);
        }
        if self.tracked {
            self.history.push_back(sample);
            while self.history.len() > HISTORY_CAPACITY {
                self.history.pop_front();
            }
        }
        self.last = Some(sample);
    }
}

/// Binds a raw-value source to a calibration model. Only its own `tick`
/// mutates the stored samples.
pub struct SensorChannel {
    label: String,
    input: ChannelInput,
    model: CalibrationModel,
    source: SharedSource,
    interval: Duration,
    readings: Vec<Reading>,
}

impl SensorChannel {
    pub fn new(
        label: impl Into<String>,
        input: ChannelInput,
        model: CalibrationModel,
        source: SharedSource,
        interval_ms: u64,
    ) -> Result<Self, MonitorError> {
        let label = label.into();
        if interval_ms == 0 {
            return Err(MonitorError::InvalidInterval(label));
        }
        let readings: Vec<Reading> = match &input {
            ChannelInput::Analog(_) => vec![Reading::new(label.clone())],
            ChannelInput::Frame { labels, .. } => {
                labels.iter().cloned().map(Reading::new).collect()
            }
        };
        if readings.is_empty() {
            return Err(MonitorError::Config(format!(
                "channel {label:?} has no readings"
            )));
        }
        Ok(Self {
            label,
            input,
            model,
            source,
            interval: Duration::from_millis(interval_ms),
            readings,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn input(&self) -> &ChannelInput {
        &self.input
    }

    pub fn model(&self) -> &CalibrationModel {
        &self.model
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn width(&self) -> usize {
        self.readings.len()
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn reading(&self, index: usize) -> Option<&Reading> {
        self.readings.get(index)
    }

    pub fn latest(&self, index: usize) -> Option<&Sample> {
        self.reading(index).and_then(Reading::latest)
    }

    /// Start keeping history for a reading. Returns false if the index does not exist.
    pub fn track_velocity(&mut self, index: usize) -> bool {
        match self.readings.get_mut(index) {
            Some(reading) => {
                reading.tracked = true;
                true
            }
            None => false,
        }
    }

    /// Read, calibrate and store one sample per reading, all stamped `now`.
    /// On a failed read nothing is stored and the previous samples remain.
    pub fn tick(&mut self, now: Duration) -> Result<Vec<Sample>, SourceError> {
        let (raws, cold_junction_c) = {
            let mut source = self.source.borrow_mut();
            let raws = match &self.input {
                ChannelInput::Analog(pin) => vec![source.read_raw(*pin)?],
                ChannelInput::Frame { device, labels } => {
                    source.read_frame(*device, labels.len())?
                }
            };
            let cold_junction_c = match &self.model {
                CalibrationModel::Thermocouple { cold_junction, .. } => match cold_junction {
                    ColdJunction::Channel(pin) => {
                        Some(cold_junction_celsius(source.read_raw(*pin)?))
                    }
                    ColdJunction::Ambient => match source.device_temperature_k() {
                        Ok(kelvin) => Some(device_ambient_celsius(kelvin)),
                        Err(SourceError::Unsupported(_)) => None,
                        Err(err) => return Err(err),
                    },
                },
                _ => None,
            };
            (raws, cold_junction_c)
        };
        if raws.len() != self.readings.len() {
            return Err(SourceError::Read {
                address: self.input.to_string(),
                reason: format!(
                    "expected {} readings, got {}",
                    self.readings.len(),
                    raws.len()
                ),
            });
        }

        let mut produced = Vec::with_capacity(raws.len());
        for (reading, raw) in self.readings.iter_mut().zip(raws) {
            let ctx = ConversionContext {
                cold_junction_c,
                previous_valid: reading.last_valid,
            };
            let conversion = self.model.apply_with(raw, &ctx);
            let sample = Sample::new(now, raw, conversion.value, conversion.validity);
            reading.record(sample);
            produced.push(sample);
        }
        debug!(
            "{} ({}) ticked at {:.3}s: {} reading(s)",
            self.label,
            self.input,
            now.as_secs_f64(),
            produced.len()
        );
        Ok(produced)
    }
}
