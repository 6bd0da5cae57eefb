// src/types.rs
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Range classification attached to every sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Validity {
    Valid,
    Under,
    Over,
    Off,
    Malfunction,
}

impl Validity {
    pub fn is_valid(self) -> bool {
        self == Validity::Valid
    }

    /// Label shown in place of a number when the sample must not be used.
    pub fn sentinel(self) -> Option<&'static str> {
        match self {
            Validity::Valid => None,
            Validity::Under => Some("Under Range"),
            Validity::Over => Some("Over Range"),
            Validity::Off => Some("Off"),
            Validity::Malfunction => Some("Malfunction"),
        }
    }
}

/// One time-stamped, calibrated reading. The computed value is kept even when
/// the sample is invalid so it can be audited, but `value()` hides it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: Duration,
    pub raw: f64,
    computed: f64,
    pub validity: Validity,
}

impl Sample {
    pub fn new(timestamp: Duration, raw: f64, computed: f64, validity: Validity) -> Self {
        Self {
            timestamp,
            raw,
            computed,
            validity,
        }
    }

    /// Calibrated value, or `None` when the validity is anything but `Valid`.
    pub fn value(&self) -> Option<f64> {
        self.validity.is_valid().then_some(self.computed)
    }

    pub fn computed(&self) -> f64 {
        self.computed
    }

    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }

    pub fn seconds(&self) -> f64 {
        self.timestamp.as_secs_f64()
    }
}

/// Position of a channel inside the monitor, handed out by registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub(crate) usize);

impl ChannelId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Anything that can be plotted or logged: one reading of a channel, or the
/// output of a velocity estimator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SeriesId {
    Channel { channel: ChannelId, index: usize },
    Velocity(usize),
}

impl SeriesId {
    pub fn reading(channel: ChannelId) -> Self {
        SeriesId::Channel { channel, index: 0 }
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesId::Channel { channel, index } => write!(f, "channel {}[{}]", channel.0, index),
            SeriesId::Velocity(idx) => write!(f, "velocity {idx}"),
        }
    }
}

/// Label plus the text a display would show for it.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadingText {
    pub label: String,
    pub text: String,
}

// Commands sent to the engine thread
#[derive(Clone, Debug)]
pub enum MonitorCommand {
    StartLogging { path: PathBuf, overwrite: bool },
    StopLogging,
    SetPlotEnabled { label: String, enabled: bool },
    ResetPlot,
    RenderPlot { path: PathBuf, log_scale: bool },
    Shutdown,
}

// Messages sent back by the engine thread
#[derive(Clone, Debug)]
pub enum MonitorEvent {
    Log(String),
    Readings(Vec<ReadingText>),
    LoggingStatus(bool),
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sample_hides_value_but_keeps_audit_copy() {
        let sample = Sample::new(Duration::from_millis(10), 12.0, 12.0, Validity::Over);
        assert_eq!(sample.value(), None);
        assert_eq!(sample.computed(), 12.0);
        assert_eq!(sample.validity.sentinel(), Some("Over Range"));
    }

    #[test]
    fn valid_sample_exposes_value() {
        let sample = Sample::new(Duration::from_millis(10), 5.0, 5.0, Validity::Valid);
        assert_eq!(sample.value(), Some(5.0));
        assert!(sample.validity.sentinel().is_none());
    }
}
