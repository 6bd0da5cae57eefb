use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::drivers::calibration::{CalibrationModel, ColdJunction};
use crate::drivers::channel::SensorChannel;
use crate::drivers::pipeline::{Monitor, SeriesOptions};
use crate::drivers::source::{AnalogPin, ChannelInput, SharedSource, SimulatedSource};
use crate::drivers::MonitorError;
use crate::types::SeriesId;

fn default_interval_ms() -> u64 {
    500
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub label: String,
    pub input: ChannelInput,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    pub model: CalibrationModel,
    #[serde(default)]
    pub plot: bool,
    #[serde(default)]
    pub log: bool,
}

/// Velocity of one reading of a channel, referenced by the channel's label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VelocityConfig {
    pub label: String,
    pub channel: String,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub plot: bool,
    #[serde(default)]
    pub log: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Keep at most this many points per series. Unbounded when absent.
    #[serde(default)]
    pub max_points: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub velocity: Vec<VelocityConfig>,
    #[serde(default)]
    pub plot: PlotConfig,
}

impl Default for MonitorConfig {
    /// The four pressure gauges of the main window.
    fn default() -> Self {
        let gauge = |label: &str, pin: u8, model: CalibrationModel| ChannelConfig {
            label: label.into(),
            input: ChannelInput::Analog(AnalogPin::new(pin)),
            interval_ms: default_interval_ms(),
            model,
            plot: true,
            log: true,
        };
        Self {
            channels: vec![
                gauge("Baratron", 2, CalibrationModel::baratron()),
                gauge("Convectron", 6, CalibrationModel::convectron()),
                gauge("Ion Gauge", 4, CalibrationModel::ion_gauge()),
                gauge("Full Range", 0, CalibrationModel::pfeiffer_full_range()),
            ],
            velocity: Vec::new(),
            plot: PlotConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let text = fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)?;
        info!(
            "loaded {} channel(s) and {} velocity estimator(s) from {}",
            config.channels.len(),
            config.velocity.len(),
            path.as_ref().display()
        );
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, MonitorError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.channels.is_empty() {
            return Err(MonitorError::Config("no channels configured".into()));
        }
        let mut labels = HashSet::new();
        for channel in &self.channels {
            if channel.interval_ms == 0 {
                return Err(MonitorError::InvalidInterval(channel.label.clone()));
            }
            if channel.input.width() == 0 {
                return Err(MonitorError::Config(format!(
                    "{} has no readings",
                    channel.label
                )));
            }
            for label in reading_labels(channel) {
                if !labels.insert(label.to_owned()) {
                    return Err(MonitorError::Config(format!("duplicate label {label:?}")));
                }
            }
        }
        for velocity in &self.velocity {
            if !labels.insert(velocity.label.clone()) {
                return Err(MonitorError::Config(format!(
                    "duplicate label {:?}",
                    velocity.label
                )));
            }
            let source = self
                .channels
                .iter()
                .find(|c| c.label == velocity.channel)
                .ok_or_else(|| MonitorError::UnknownChannel(velocity.channel.clone()))?;
            if velocity.index >= source.input.width() {
                return Err(MonitorError::UnknownChannel(format!(
                    "{}[{}]",
                    velocity.channel, velocity.index
                )));
            }
        }
        Ok(())
    }

    /// Build the channels and estimators on top of `source`.
    pub fn build_monitor(&self, source: SharedSource) -> Result<Monitor, MonitorError> {
        self.validate()?;
        let mut monitor = Monitor::new(self.plot.max_points);
        let mut ids = Vec::with_capacity(self.channels.len());
        for config in &self.channels {
            let channel = SensorChannel::new(
                config.label.clone(),
                config.input.clone(),
                config.model.clone(),
                source.clone(),
                config.interval_ms,
            )?;
            let options = SeriesOptions {
                plot: config.plot,
                log: config.log,
            };
            ids.push((config.label.as_str(), monitor.register(channel, options)?));
        }
        for velocity in &self.velocity {
            let channel = ids
                .iter()
                .find(|(label, _)| *label == velocity.channel)
                .map(|(_, id)| *id)
                .ok_or_else(|| MonitorError::UnknownChannel(velocity.channel.clone()))?;
            let options = SeriesOptions {
                plot: velocity.plot,
                log: velocity.log,
            };
            let reading = SeriesId::Channel {
                channel,
                index: velocity.index,
            };
            monitor.add_velocity(velocity.label.clone(), reading, options)?;
        }
        Ok(monitor)
    }

    /// Random source producing plausible raw values for every configured
    /// input, for running without hardware.
    pub fn simulated_source(&self, seed: u64) -> SimulatedSource {
        let mut source = SimulatedSource::new(seed);
        for channel in &self.channels {
            // frame devices keep the source's height range
            if let ChannelInput::Analog(pin) = channel.input {
                source = source.with_range(pin, channel.model.simulated_range());
            }
            if let CalibrationModel::Thermocouple {
                cold_junction: ColdJunction::Channel(pin),
                ..
            } = channel.model
            {
                // 21 to 27 °C at the reference sensor
                source = source.with_range(pin, 0.70..0.81);
            }
        }
        source
    }
}

fn reading_labels(channel: &ChannelConfig) -> Vec<&str> {
    match &channel.input {
        ChannelInput::Analog(_) => vec![channel.label.as_str()],
        ChannelInput::Frame { labels, .. } => labels.iter().map(String::as_str).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::source::{shared, RawSource};
    use std::time::Duration;

    const BENCH: &str = include_str!("../configs/bench.json");

    #[test]
    fn default_is_the_gauge_window() {
        let config = MonitorConfig::default();
        let labels: Vec<&str> = config.channels.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Baratron", "Convectron", "Ion Gauge", "Full Range"]);
        assert_eq!(config.channels[1].input, ChannelInput::Analog(AnalogPin::new(6)));
        config.validate().unwrap();
    }

    #[test]
    fn bench_config_parses_and_builds() {
        let config = MonitorConfig::from_json(BENCH).unwrap();
        assert_eq!(config.velocity.len(), 2);
        let tof = config.channels.iter().find(|c| c.label == "Dual ToF").unwrap();
        assert_eq!(tof.input.width(), 2);

        let source = config.simulated_source(7);
        let monitor = config.build_monitor(shared(source)).unwrap();
        assert!(monitor.series_by_label("ToF 2 Velocity").is_some());
        assert_eq!(monitor.all_series().len(), config.channels.len() + 1 + 2);
    }

    #[test]
    fn thresholds_fall_back_to_defaults() {
        let text = r#"{
            "channels": [
                { "label": "Baratron", "input": { "analog": "AIN2" },
                  "model": { "kind": "baratron", "over_above": 1.0 } }
            ]
        }"#;
        let config = MonitorConfig::from_json(text).unwrap();
        let channel = &config.channels[0];
        assert_eq!(channel.interval_ms, 500);
        assert!(!channel.plot && !channel.log);
        assert_eq!(
            channel.model,
            CalibrationModel::Baratron {
                under_below: 3e-3,
                over_above: 1.0
            }
        );
        assert_eq!(config.plot.max_points, None);
    }

    #[test]
    fn bad_pin_is_rejected_at_load() {
        let text = r#"{ "channels": [
            { "label": "Flow", "input": { "analog": "A1" }, "model": { "kind": "flow" } }
        ] }"#;
        assert!(MonitorConfig::from_json(text).is_err());
    }

    #[test]
    fn validation_catches_bad_references() {
        let mut config = MonitorConfig::default();
        config.channels[0].interval_ms = 0;
        assert!(matches!(config.validate(), Err(MonitorError::InvalidInterval(_))));

        let mut config = MonitorConfig::default();
        config.channels[1].label = "Baratron".into();
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));

        let mut config = MonitorConfig::default();
        config.velocity.push(VelocityConfig {
            label: "Baratron Velocity".into(),
            channel: "Baratron".into(),
            index: 1,
            plot: false,
            log: false,
        });
        assert!(matches!(config.validate(), Err(MonitorError::UnknownChannel(_))));
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.json");
        std::fs::write(&path, serde_json::to_string(&MonitorConfig::default()).unwrap()).unwrap();
        assert_eq!(MonitorConfig::load(&path).unwrap(), MonitorConfig::default());
        assert!(MonitorConfig::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn simulated_values_stay_in_sensor_ranges() {
        let config = MonitorConfig::from_json(BENCH).unwrap();
        let mut source = config.simulated_source(1);
        for _ in 0..100 {
            let tc = source.read_raw(AnalogPin::new(8)).unwrap();
            assert!((0.0..0.007).contains(&tc));
            let cj = source.read_raw(AnalogPin::new(9)).unwrap();
            assert!((0.70..0.81).contains(&cj));
        }
    }

    #[test]
    fn simulated_bench_runs() {
        let config = MonitorConfig::from_json(BENCH).unwrap();
        let mut monitor = config.build_monitor(shared(config.simulated_source(3))).unwrap();
        monitor.start(Duration::ZERO);
        for ms in (0..=1_000).step_by(100) {
            let report = monitor.pump(Duration::from_millis(ms));
            assert!(report.failures.is_empty());
        }
        assert!(monitor.readings_text().iter().all(|r| !r.text.is_empty()));
    }
}
