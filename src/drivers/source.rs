use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::Range;
use std::rc::Rc;
use std::str::FromStr;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::drivers::{MonitorError, SourceError};

/// Analog input of the acquisition device, e.g. `AIN6`. Parsed once when the
/// configuration is loaded; reads only ever see the typed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnalogPin(u8);

impl AnalogPin {
    pub const fn new(number: u8) -> Self {
        Self(number)
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for AnalogPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AIN{}", self.0)
    }
}

impl FromStr for AnalogPin {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .strip_prefix("AIN")
            .and_then(|n| n.parse::<u8>().ok())
            .map(AnalogPin)
            .ok_or_else(|| MonitorError::InvalidPin(s.to_owned()))
    }
}

impl TryFrom<String> for AnalogPin {
    type Error = MonitorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AnalogPin> for String {
    fn from(value: AnalogPin) -> Self {
        value.to_string()
    }
}

/// Where a channel gets its raw values from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelInput {
    /// A single analog voltage.
    Analog(AnalogPin),
    /// A device that returns several readings at once (dual time-of-flight).
    Frame { device: u8, labels: Vec<String> },
}

impl ChannelInput {
    pub fn width(&self) -> usize {
        match self {
            ChannelInput::Analog(_) => 1,
            ChannelInput::Frame { labels, .. } => labels.len(),
        }
    }
}

impl fmt::Display for ChannelInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelInput::Analog(pin) => pin.fmt(f),
            ChannelInput::Frame { device, .. } => write!(f, "frame device {device}"),
        }
    }
}

/// Capability the channels depend on instead of a concrete device driver.
/// Reads are expected to be fast; a slow read stalls every other channel.
pub trait RawSource {
    /// Voltage on an analog input.
    fn read_raw(&mut self, pin: AnalogPin) -> Result<f64, SourceError>;

    /// All readings of a multi-value device, in index order.
    fn read_frame(&mut self, device: u8, width: usize) -> Result<Vec<f64>, SourceError> {
        let _ = (device, width);
        Err(SourceError::Unsupported("frame devices"))
    }

    /// Internal temperature sensor of the acquisition device, in kelvin.
    fn device_temperature_k(&mut self) -> Result<f64, SourceError> {
        Err(SourceError::Unsupported("device temperature"))
    }
}

/// Handle injected into every channel at construction.
pub type SharedSource = Rc<RefCell<dyn RawSource>>;

pub fn shared<S: RawSource + 'static>(source: S) -> SharedSource {
    Rc::new(RefCell::new(source))
}

/// In-memory source useful for tests and deterministic playback.
#[derive(Default)]
pub struct ManualSource {
    analog: HashMap<AnalogPin, VecDeque<Result<f64, String>>>,
    frames: HashMap<u8, VecDeque<Vec<f64>>>,
    device_temperature_k: Option<f64>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pin: AnalogPin, volts: f64) -> &mut Self {
        self.analog.entry(pin).or_default().push_back(Ok(volts));
        self
    }

    pub fn push_failure(&mut self, pin: AnalogPin, reason: &str) -> &mut Self {
        self.analog
            .entry(pin)
            .or_default()
            .push_back(Err(reason.to_owned()));
        self
    }

    pub fn push_frame(&mut self, device: u8, values: Vec<f64>) -> &mut Self {
        self.frames.entry(device).or_default().push_back(values);
        self
    }

    pub fn set_device_temperature_k(&mut self, kelvin: f64) -> &mut Self {
        self.device_temperature_k = Some(kelvin);
        self
    }
}

impl RawSource for ManualSource {
    fn read_raw(&mut self, pin: AnalogPin) -> Result<f64, SourceError> {
        let next = self.analog.get_mut(&pin).and_then(VecDeque::pop_front);
        match next {
            Some(Ok(volts)) => Ok(volts),
            Some(Err(reason)) => Err(SourceError::Read {
                address: pin.to_string(),
                reason,
            }),
            None => Err(SourceError::Read {
                address: pin.to_string(),
                reason: "no scripted value".into(),
            }),
        }
    }

    fn read_frame(&mut self, device: u8, width: usize) -> Result<Vec<f64>, SourceError> {
        let address = format!("frame device {device}");
        let frame = self
            .frames
            .get_mut(&device)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| SourceError::Read {
                address: address.clone(),
                reason: "no scripted frame".into(),
            })?;
        if frame.len() != width {
            return Err(SourceError::Read {
                address,
                reason: format!("expected {width} readings, got {}", frame.len()),
            });
        }
        Ok(frame)
    }

    fn device_temperature_k(&mut self) -> Result<f64, SourceError> {
        self.device_temperature_k
            .ok_or(SourceError::Unsupported("device temperature"))
    }
}

/// Stand-in for the acquisition device: uniformly random values per input,
/// the way the bench software behaves with no hardware attached.
pub struct SimulatedSource {
    rng: StdRng,
    ranges: HashMap<AnalogPin, Range<f64>>,
    default_range: Range<f64>,
    frame_range: Range<f64>,
    device_temperature_k: f64,
}

impl SimulatedSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ranges: HashMap::new(),
            default_range: 0.0..8.0,
            frame_range: 0.0..250.0,
            device_temperature_k: 298.15,
        }
    }

    pub fn with_range(mut self, pin: AnalogPin, range: Range<f64>) -> Self {
        self.ranges.insert(pin, range);
        self
    }

    fn draw(rng: &mut StdRng, range: &Range<f64>) -> f64 {
        if range.start >= range.end {
            return range.start;
        }
        rng.gen_range(range.clone())
    }
}

impl RawSource for SimulatedSource {
    fn read_raw(&mut self, pin: AnalogPin) -> Result<f64, SourceError> {
        let range = self.ranges.get(&pin).unwrap_or(&self.default_range);
        Ok(Self::draw(&mut self.rng, range))
    }

    fn read_frame(&mut self, _device: u8, width: usize) -> Result<Vec<f64>, SourceError> {
        Ok((0..width)
            .map(|_| Self::draw(&mut self.rng, &self.frame_range))
            .collect())
    }

    fn device_temperature_k(&mut self) -> Result<f64, SourceError> {
        Ok(self.device_temperature_k)
    }
}
