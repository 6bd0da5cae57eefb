use std::time::Duration;

use log::{debug, info, warn};

use crate::drivers::buffer::PlotBuffer;
use crate::drivers::channel::SensorChannel;
use crate::drivers::scheduler::{PollingScheduler, TaskId};
use crate::drivers::velocity::VelocityEstimator;
use crate::drivers::{MonitorError, SourceError};
use crate::recorder::{DataLogger, LogColumn, LogSink, LoggerState, OverwritePolicy};
use crate::types::{ChannelId, ReadingText, Sample, SeriesId};

/// Shown for a series that has not produced a sample yet.
pub const NO_DATA: &str = "No data";

/// Per-series switches chosen when a channel or estimator is added.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeriesOptions {
    pub plot: bool,
    pub log: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Job {
    Channel(ChannelId),
    Logger,
}

struct Slot {
    channel: SensorChannel,
    task: TaskId,
    log: bool,
}

struct Estimator {
    estimator: VelocityEstimator,
    log: bool,
}

#[derive(Debug)]
pub struct ReadFailure {
    pub channel: String,
    pub error: SourceError,
}

/// What one `pump` did.
#[derive(Debug, Default)]
pub struct PumpReport {
    pub fired: usize,
    pub failures: Vec<ReadFailure>,
}

/// Owns every channel, estimator, the plot buffer and the logger, and drives
/// them all from one cooperative scheduler. Samples flow channel -> velocity
/// estimators -> plot buffer; the logger reads the latest samples on its own
/// interval.
pub struct Monitor {
    channels: Vec<Option<Slot>>,
    estimators: Vec<Option<Estimator>>,
    plot: PlotBuffer,
    logger: DataLogger,
    scheduler: PollingScheduler<Job>,
    logger_task: Option<TaskId>,
    started_at: Duration,
}

impl Monitor {
    pub fn new(plot_max_points: Option<usize>) -> Self {
        Self {
            channels: Vec::new(),
            estimators: Vec::new(),
            plot: PlotBuffer::new(Duration::ZERO, plot_max_points),
            logger: DataLogger::new(),
            scheduler: PollingScheduler::new(),
            logger_task: None,
            started_at: Duration::ZERO,
        }
    }

    /// Add a channel; it is polled at its own interval from the next pump
    /// (or from `start`). Every reading label must be unique.
    pub fn register(
        &mut self,
        channel: SensorChannel,
        options: SeriesOptions,
    ) -> Result<ChannelId, MonitorError> {
        for (index, reading) in channel.readings().iter().enumerate() {
            self.ensure_unique(reading.label())?;
            let repeated = channel.readings()[..index]
                .iter()
                .any(|earlier| earlier.label() == reading.label());
            if repeated {
                return Err(MonitorError::Config(format!(
                    "duplicate label {:?} in {}",
                    reading.label(),
                    channel.label()
                )));
            }
        }
        let id = ChannelId(self.channels.len());
        let task = self.scheduler.register(channel.interval(), Job::Channel(id))?;
        for (index, reading) in channel.readings().iter().enumerate() {
            self.plot
                .add_series(SeriesId::Channel { channel: id, index }, reading.label(), options.plot);
        }
        info!(
            "registered {} on {} every {} ms",
            channel.label(),
            channel.input(),
            channel.interval().as_millis()
        );
        self.channels.push(Some(Slot {
            channel,
            task,
            log: options.log,
        }));
        Ok(id)
    }

    /// Stop polling a channel and hand it back. Estimators fed by it are
    /// removed too. Refused while a logging session includes it.
    pub fn deregister(&mut self, id: ChannelId) -> Result<SensorChannel, MonitorError> {
        if self.slot(id).is_none() {
            return Err(MonitorError::UnknownChannel(format!("{id:?}")));
        }
        if let Some(session) = self.logger.session() {
            let logged = session
                .columns()
                .iter()
                .any(|column| self.feeding_channel(column.series) == Some(id));
            if logged {
                return Err(MonitorError::LoggingConflict(
                    "channel is part of the logging session",
                ));
            }
        }
        let slot = self
            .channels
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or_else(|| MonitorError::UnknownChannel(format!("{id:?}")))?;
        self.scheduler.cancel(slot.task);
        for index in 0..slot.channel.width() {
            self.plot.remove_series(SeriesId::Channel { channel: id, index });
        }
        for (idx, entry) in self.estimators.iter_mut().enumerate() {
            let fed_by_channel = entry.as_ref().map_or(false, |e| {
                matches!(e.estimator.source(), SeriesId::Channel { channel, .. } if channel == id)
            });
            if fed_by_channel {
                *entry = None;
                self.plot.remove_series(SeriesId::Velocity(idx));
            }
        }
        info!("deregistered {}", slot.channel.label());
        Ok(slot.channel)
    }

    /// Derive a velocity from one reading of a registered channel.
    pub fn add_velocity(
        &mut self,
        label: impl Into<String>,
        source: SeriesId,
        options: SeriesOptions,
    ) -> Result<SeriesId, MonitorError> {
        let label = label.into();
        self.ensure_unique(&label)?;
        let SeriesId::Channel { channel, index } = source else {
            return Err(MonitorError::Config(format!(
                "{label}: velocity needs a channel reading, not {source}"
            )));
        };
        let slot = self
            .channels
            .get_mut(channel.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| MonitorError::UnknownChannel(source.to_string()))?;
        if !slot.channel.track_velocity(index) {
            return Err(MonitorError::UnknownChannel(source.to_string()));
        }
        let series = SeriesId::Velocity(self.estimators.len());
        self.plot.add_series(series, label.as_str(), options.plot);
        self.estimators.push(Some(Estimator {
            estimator: VelocityEstimator::new(label, source),
            log: options.log,
        }));
        Ok(series)
    }

    /// Start polling. The plot and any later logging session measure time
    /// from `now`; points from an earlier run are dropped.
    pub fn start(&mut self, now: Duration) {
        if self.scheduler.is_running() {
            return;
        }
        self.started_at = now;
        self.plot.reset();
        self.plot.set_origin(now);
        self.scheduler.start(now);
    }

    /// Stop polling. An open logging session ends here and its rows are
    /// saved, so no session spans two runs.
    pub fn stop(&mut self) {
        if self.logger.session().is_some() {
            match self.stop_logging() {
                Ok(rows) => info!("logging ended with the monitor, {rows} row(s) saved"),
                Err(err) => warn!("logging session could not be saved on stop: {err}"),
            }
        }
        self.scheduler.stop();
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn started_at(&self) -> Duration {
        self.started_at
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.scheduler.next_due()
    }

    /// Run every task that is due. Read failures are reported, never fatal.
    pub fn pump(&mut self, now: Duration) -> PumpReport {
        let Self {
            channels,
            estimators,
            plot,
            logger,
            scheduler,
            ..
        } = self;
        let mut failures = Vec::new();
        let fired = scheduler.pump(now, |_, job| match *job {
            Job::Channel(id) => {
                let Some(slot) = channels.get_mut(id.0).and_then(Option::as_mut) else {
                    return;
                };
                match slot.channel.tick(now) {
                    Ok(samples) => {
                        for (index, sample) in samples.iter().enumerate() {
                            let series = SeriesId::Channel { channel: id, index };
                            plot.on_sample(series, sample);
                            feed_estimators(&mut estimators[..], plot, series, sample);
                        }
                    }
                    Err(error) => {
                        warn!("{}: {error}", slot.channel.label());
                        failures.push(ReadFailure {
                            channel: slot.channel.label().to_owned(),
                            error,
                        });
                    }
                }
            }
            Job::Logger => {
                let Some(session) = logger.session() else {
                    return;
                };
                let row: Vec<Option<Sample>> = session
                    .columns()
                    .iter()
                    .map(|column| latest_in(&channels[..], &estimators[..], column.series))
                    .collect();
                if let Err(err) = logger.record_row(row) {
                    debug!("logging tick skipped: {err}");
                }
            }
        });
        PumpReport { fired, failures }
    }

    /// Arm the logger with the given series (column order = slice order) and
    /// resolve the overwrite question. Returns false if the caller declined
    /// to overwrite an existing destination.
    pub fn start_logging(
        &mut self,
        series: &[SeriesId],
        sink: Box<dyn LogSink>,
        policy: OverwritePolicy,
    ) -> Result<bool, MonitorError> {
        self.arm_logging(series, sink)?;
        self.begin_logging(policy)
    }

    /// Fix the logged columns and destination without writing yet. May be
    /// repeated while armed to pick another destination.
    pub fn arm_logging(
        &mut self,
        series: &[SeriesId],
        sink: Box<dyn LogSink>,
    ) -> Result<(), MonitorError> {
        if self.logger.is_writing() {
            return Err(MonitorError::LoggingConflict("a session is already writing"));
        }
        if !self.is_running() {
            return Err(MonitorError::LoggingConflict("the monitor is not running"));
        }
        let mut columns = Vec::with_capacity(series.len());
        let mut interval: Option<Duration> = None;
        for &id in series {
            let label = self
                .series_label(id)
                .ok_or_else(|| MonitorError::UnknownChannel(id.to_string()))?
                .to_owned();
            let channel_interval = self
                .feeding_channel(id)
                .and_then(|channel| self.slot(channel))
                .map(|slot| slot.channel.interval())
                .ok_or_else(|| MonitorError::UnknownChannel(id.to_string()))?;
            interval = Some(interval.map_or(channel_interval, |i| i.min(channel_interval)));
            columns.push(LogColumn { series: id, label });
        }
        let interval =
            interval.ok_or_else(|| MonitorError::Config("nothing selected for logging".into()))?;
        self.logger.arm(columns, interval, self.started_at, sink)
    }

    pub fn begin_logging(&mut self, policy: OverwritePolicy) -> Result<bool, MonitorError> {
        if !self.logger.begin(policy)? {
            return Ok(false);
        }
        if let Some(interval) = self.logger.session().map(|s| s.interval()) {
            self.logger_task = Some(self.scheduler.register(interval, Job::Logger)?);
        }
        Ok(true)
    }

    /// End the session and save its rows. Returns how many were saved.
    pub fn stop_logging(&mut self) -> Result<usize, MonitorError> {
        let saved = self.logger.stop()?;
        if let Some(task) = self.logger_task.take() {
            self.scheduler.cancel(task);
        }
        Ok(saved)
    }

    pub fn logger(&self) -> &DataLogger {
        &self.logger
    }

    pub fn logging_state(&self) -> LoggerState {
        self.logger.state()
    }

    /// Series registered with the log switch on, channels first.
    pub fn logged_series(&self) -> Vec<SeriesId> {
        let channels = self.live_channels().flat_map(|(id, slot)| {
            (0..slot.channel.width())
                .filter(move |_| slot.log)
                .map(move |index| SeriesId::Channel { channel: id, index })
        });
        let velocities = self.estimators.iter().enumerate().filter_map(|(idx, entry)| {
            entry
                .as_ref()
                .filter(|e| e.log)
                .map(|_| SeriesId::Velocity(idx))
        });
        channels.chain(velocities).collect()
    }

    pub fn set_plot_enabled(&mut self, series: SeriesId, enabled: bool) -> Result<(), MonitorError> {
        if self.plot.set_enabled(series, enabled) {
            Ok(())
        } else {
            Err(MonitorError::UnknownChannel(series.to_string()))
        }
    }

    pub fn reset_plot(&mut self) {
        self.plot.reset();
    }

    pub fn plot(&self) -> &PlotBuffer {
        &self.plot
    }

    pub fn channel(&self, id: ChannelId) -> Option<&SensorChannel> {
        self.slot(id).map(|slot| &slot.channel)
    }

    pub fn latest(&self, series: SeriesId) -> Option<Sample> {
        latest_in(&self.channels, &self.estimators, series)
    }

    pub fn series_label(&self, series: SeriesId) -> Option<&str> {
        match series {
            SeriesId::Channel { channel, index } => self
                .slot(channel)
                .and_then(|slot| slot.channel.reading(index))
                .map(|reading| reading.label()),
            SeriesId::Velocity(idx) => self
                .estimators
                .get(idx)
                .and_then(Option::as_ref)
                .map(|e| e.estimator.label()),
        }
    }

    pub fn series_by_label(&self, label: &str) -> Option<SeriesId> {
        self.all_series()
            .into_iter()
            .find(|series| self.series_label(*series) == Some(label))
    }

    /// Display text for every series, in the same order as `all_series`.
    pub fn readings_text(&self) -> Vec<ReadingText> {
        self.all_series()
            .into_iter()
            .filter_map(|series| {
                let label = self.series_label(series)?.to_owned();
                let text = match (series, self.latest(series)) {
                    (_, None) => NO_DATA.to_owned(),
                    (SeriesId::Channel { channel, .. }, Some(sample)) => {
                        self.channel(channel)?.model().display(&sample)
                    }
                    (SeriesId::Velocity(_), Some(sample)) => format!("{:.2}", sample.computed()),
                };
                Some(ReadingText { label, text })
            })
            .collect()
    }

    /// Every live series: channel readings in registration order, then velocities.
    pub fn all_series(&self) -> Vec<SeriesId> {
        let channels = self.live_channels().flat_map(|(id, slot)| {
            (0..slot.channel.width()).map(move |index| SeriesId::Channel { channel: id, index })
        });
        let velocities = self
            .estimators
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_some())
            .map(|(idx, _)| SeriesId::Velocity(idx));
        channels.chain(velocities).collect()
    }

    fn slot(&self, id: ChannelId) -> Option<&Slot> {
        self.channels.get(id.0).and_then(Option::as_ref)
    }

    fn live_channels(&self) -> impl Iterator<Item = (ChannelId, &Slot)> {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|slot| (ChannelId(idx), slot)))
    }

    // Channel whose ticks produce this series.
    fn feeding_channel(&self, series: SeriesId) -> Option<ChannelId> {
        match series {
            SeriesId::Channel { channel, .. } => Some(channel),
            SeriesId::Velocity(idx) => match self.estimators.get(idx)?.as_ref()?.estimator.source() {
                SeriesId::Channel { channel, .. } => Some(channel),
                SeriesId::Velocity(_) => None,
            },
        }
    }

    fn ensure_unique(&self, label: &str) -> Result<(), MonitorError> {
        if self.series_by_label(label).is_some() {
            return Err(MonitorError::Config(format!("duplicate label {label:?}")));
        }
        Ok(())
    }
}

fn feed_estimators(
    estimators: &mut [Option<Estimator>],
    plot: &mut PlotBuffer,
    series: SeriesId,
    sample: &Sample,
) {
    for (idx, entry) in estimators.iter_mut().enumerate() {
        let Some(entry) = entry.as_mut() else {
            continue;
        };
        if entry.estimator.source() != series {
            continue;
        }
        entry.estimator.update(sample);
        if !sample.is_valid() {
            continue;
        }
        if let Some(velocity) = entry.estimator.last_sample() {
            plot.on_sample(SeriesId::Velocity(idx), &velocity);
        }
    }
}

fn latest_in(
    channels: &[Option<Slot>],
    estimators: &[Option<Estimator>],
    series: SeriesId,
) -> Option<Sample> {
    match series {
        SeriesId::Channel { channel, index } => channels
            .get(channel.0)?
            .as_ref()?
            .channel
            .latest(index)
            .copied(),
        SeriesId::Velocity(idx) => estimators.get(idx)?.as_ref()?.estimator.last_sample(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::calibration::CalibrationModel;
    use crate::drivers::source::{AnalogPin, ChannelInput, ManualSource, SharedSource};
    use crate::recorder::MemorySink;
    use crate::types::Validity;
    use std::cell::RefCell;
    use std::rc::Rc;

    const BARATRON: AnalogPin = AnalogPin::new(2);
    const CONVECTRON: AnalogPin = AnalogPin::new(6);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn both_on() -> SeriesOptions {
        SeriesOptions {
            plot: true,
            log: true,
        }
    }

    struct Bench {
        manual: Rc<RefCell<ManualSource>>,
        monitor: Monitor,
        baratron: ChannelId,
        convectron: ChannelId,
    }

    fn gauge_bench(baratron_ms: u64, convectron_ms: u64) -> Bench {
        let manual = Rc::new(RefCell::new(ManualSource::new()));
        let shared: SharedSource = manual.clone();
        let mut monitor = Monitor::new(None);
        let baratron = monitor
            .register(
                SensorChannel::new(
                    "Baratron",
                    ChannelInput::Analog(BARATRON),
                    CalibrationModel::baratron(),
                    shared.clone(),
                    baratron_ms,
                )
                .unwrap(),
                both_on(),
            )
            .unwrap();
        let convectron = monitor
            .register(
                SensorChannel::new(
                    "Convectron",
                    ChannelInput::Analog(CONVECTRON),
                    CalibrationModel::convectron(),
                    shared,
                    convectron_ms,
                )
                .unwrap(),
                both_on(),
            )
            .unwrap();
        Bench {
            manual,
            monitor,
            baratron,
            convectron,
        }
    }

    fn feed(bench: &Bench, ticks: usize) {
        let mut manual = bench.manual.borrow_mut();
        for i in 0..ticks {
            manual.push(BARATRON, 5.0 + i as f64).push(CONVECTRON, 2.0);
        }
    }

    #[test]
    fn samples_reach_the_plot_buffer() {
        let mut bench = gauge_bench(500, 500);
        feed(&bench, 2);
        bench.monitor.start(ms(1_000));
        assert_eq!(bench.monitor.pump(ms(1_000)).fired, 2);
        assert_eq!(bench.monitor.pump(ms(1_200)).fired, 0);
        assert_eq!(bench.monitor.pump(ms(1_500)).fired, 2);

        let series = SeriesId::reading(bench.baratron);
        let points: Vec<_> = bench.monitor.plot().series(series).unwrap().points().copied().collect();
        assert_eq!(points, vec![(0.0, 5.0), (0.5, 6.0)]);
        let convectron = bench.monitor.latest(SeriesId::reading(bench.convectron)).unwrap();
        assert!((convectron.computed() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn failed_read_is_reported_and_others_continue() {
        let mut bench = gauge_bench(500, 500);
        bench
            .manual
            .borrow_mut()
            .push_failure(BARATRON, "device busy")
            .push(CONVECTRON, 3.0)
            .push(BARATRON, 5.0)
            .push(CONVECTRON, 3.0);
        bench.monitor.start(ms(0));
        let report = bench.monitor.pump(ms(0));
        assert_eq!(report.fired, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].channel, "Baratron");
        assert!(bench.monitor.latest(SeriesId::reading(bench.baratron)).is_none());

        let report = bench.monitor.pump(ms(500));
        assert!(report.failures.is_empty());
        assert_eq!(
            bench.monitor.latest(SeriesId::reading(bench.baratron)).unwrap().value(),
            Some(5.0)
        );
    }

    #[test]
    fn velocity_follows_one_index_of_a_frame_device() {
        let manual = Rc::new(RefCell::new(ManualSource::new()));
        let shared: SharedSource = manual.clone();
        for (a, b) in [(100.0, 0.0), (100.0, 1.0), (100.0, 3.0)] {
            manual.borrow_mut().push_frame(1, vec![a, b]);
        }
        let mut monitor = Monitor::new(None);
        let tof = monitor
            .register(
                SensorChannel::new(
                    "Dual ToF",
                    ChannelInput::Frame {
                        device: 1,
                        labels: vec!["ToF 1".into(), "ToF 2".into()],
                    },
                    CalibrationModel::raw(0),
                    shared,
                    1_000,
                )
                .unwrap(),
                both_on(),
            )
            .unwrap();
        let still = monitor
            .add_velocity("ToF 1 Velocity", SeriesId::Channel { channel: tof, index: 0 }, both_on())
            .unwrap();
        let moving = monitor
            .add_velocity("ToF 2 Velocity", SeriesId::Channel { channel: tof, index: 1 }, both_on())
            .unwrap();

        monitor.start(ms(0));
        for t in [0, 1_000, 2_000] {
            monitor.pump(ms(t));
        }
        assert_eq!(monitor.latest(still).unwrap().value(), Some(0.0));
        let v = monitor.latest(moving).unwrap().value().unwrap();
        assert!((v - 2.5).abs() < 1e-9);
        assert_eq!(monitor.plot().series(moving).unwrap().len(), 1);

        let text = monitor.readings_text();
        let labels: Vec<&str> = text.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["ToF 1", "ToF 2", "ToF 1 Velocity", "ToF 2 Velocity"]);
        assert_eq!(text[1].text, "3");
        assert_eq!(text[3].text, "2.50");
    }

    #[test]
    fn velocity_source_must_exist() {
        let mut bench = gauge_bench(500, 500);
        let missing = SeriesId::Channel {
            channel: bench.baratron,
            index: 4,
        };
        assert!(bench.monitor.add_velocity("v", missing, both_on()).is_err());
        let err = bench
            .monitor
            .add_velocity("Baratron", SeriesId::reading(bench.baratron), both_on())
            .unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    fn logging_three_ticks_writes_three_rows() {
        let mut bench = gauge_bench(500, 500);
        feed(&bench, 4);
        let sink = MemorySink::new();
        bench.monitor.start(ms(0));
        bench.monitor.pump(ms(0));

        let series = bench.monitor.logged_series();
        assert!(bench
            .monitor
            .start_logging(&series, Box::new(sink.clone()), OverwritePolicy::Proceed)
            .unwrap());
        for t in [500, 1_000, 1_500] {
            bench.monitor.pump(ms(t));
        }
        assert_eq!(bench.monitor.stop_logging().unwrap(), 3);

        let lines = sink.lines();
        assert_eq!(
            lines[0],
            "Baratron Time,Baratron Value,Convectron Time,Convectron Value"
        );
        assert_eq!(lines.len(), 4);
        let last: Vec<&str> = lines[3].split(',').collect();
        assert_eq!(last[..3], ["1.500", "8", "1.500"]);
        assert!((last[3].parse::<f64>().unwrap() - 0.01).abs() < 1e-12);

        // logger task is gone; further pumps only poll channels
        assert_eq!(bench.monitor.pump(ms(2_000)).fired, 2);
        assert!(matches!(
            bench.monitor.stop_logging(),
            Err(MonitorError::LoggingConflict(_))
        ));
    }

    #[test]
    fn logger_interval_is_the_fastest_channel() {
        let mut bench = gauge_bench(500, 200);
        bench.monitor.start(ms(0));
        let series = bench.monitor.logged_series();
        bench.monitor.arm_logging(&series, Box::new(MemorySink::new())).unwrap();
        let interval = bench.monitor.logger().session().unwrap().interval();
        assert_eq!(interval, ms(200));
        assert_eq!(bench.monitor.logging_state(), LoggerState::Armed);
    }

    #[test]
    fn starting_logging_twice_is_rejected() {
        let mut bench = gauge_bench(500, 500);
        bench.monitor.start(ms(0));
        let series = bench.monitor.logged_series();
        bench
            .monitor
            .start_logging(&series, Box::new(MemorySink::new()), OverwritePolicy::Proceed)
            .unwrap();
        let again = bench.monitor.start_logging(
            &series,
            Box::new(MemorySink::new()),
            OverwritePolicy::Proceed,
        );
        assert!(matches!(again, Err(MonitorError::LoggingConflict(_))));
        assert_eq!(bench.monitor.logging_state(), LoggerState::Writing);
    }

    #[test]
    fn logged_channel_cannot_be_removed_mid_session() {
        let mut bench = gauge_bench(500, 500);
        bench.monitor.start(ms(0));
        let only_baratron = [SeriesId::reading(bench.baratron)];
        bench
            .monitor
            .start_logging(&only_baratron, Box::new(MemorySink::new()), OverwritePolicy::Proceed)
            .unwrap();
        assert!(matches!(
            bench.monitor.deregister(bench.baratron),
            Err(MonitorError::LoggingConflict(_))
        ));
        let removed = bench.monitor.deregister(bench.convectron).unwrap();
        assert_eq!(removed.label(), "Convectron");
        assert!(bench.monitor.channel(bench.convectron).is_none());
    }

    #[test]
    fn deregistered_channel_stops_firing() {
        let mut bench = gauge_bench(500, 500);
        feed(&bench, 2);
        bench.monitor.start(ms(0));
        bench.monitor.pump(ms(0));
        bench.monitor.deregister(bench.convectron).unwrap();
        assert_eq!(bench.monitor.pump(ms(500)).fired, 1);
        assert!(bench.monitor.plot().series(SeriesId::reading(bench.convectron)).is_none());
        assert!(bench.monitor.series_by_label("Convectron").is_none());
    }

    #[test]
    fn plot_toggle_and_reset() {
        let mut bench = gauge_bench(500, 500);
        feed(&bench, 3);
        let series = SeriesId::reading(bench.baratron);
        bench.monitor.start(ms(0));
        bench.monitor.pump(ms(0));
        bench.monitor.set_plot_enabled(series, false).unwrap();
        assert!(bench.monitor.plot().series(series).unwrap().is_empty());
        bench.monitor.pump(ms(500));
        assert!(bench.monitor.plot().series(series).unwrap().is_empty());
        bench.monitor.set_plot_enabled(series, true).unwrap();
        bench.monitor.pump(ms(1_000));
        assert_eq!(bench.monitor.plot().series(series).unwrap().len(), 1);

        bench.monitor.reset_plot();
        bench.monitor.reset_plot();
        assert!(bench.monitor.plot().iter().all(|(_, s)| s.is_empty()));
        assert!(matches!(
            bench.monitor.set_plot_enabled(SeriesId::Velocity(9), true),
            Err(MonitorError::UnknownChannel(_))
        ));
    }

    #[test]
    fn invalid_reading_shows_sentinel() {
        let mut bench = gauge_bench(500, 500);
        bench
            .manual
            .borrow_mut()
            .push(BARATRON, 0.001)
            .push(CONVECTRON, 2.0);
        bench.monitor.start(ms(0));
        bench.monitor.pump(ms(0));
        let text = bench.monitor.readings_text();
        assert_eq!(text[0].text, "Under Range");
        assert_eq!(text[1].text, "1.00e-2");
        let sample = bench.monitor.latest(SeriesId::reading(bench.baratron)).unwrap();
        assert_eq!(sample.validity, Validity::Under);
        assert!(bench.monitor.plot().series(SeriesId::reading(bench.baratron)).unwrap().is_empty());
    }

    #[test]
    fn readings_before_first_tick_show_no_data() {
        let bench = gauge_bench(500, 500);
        assert!(bench.monitor.readings_text().iter().all(|r| r.text == NO_DATA));
    }

    #[test]
    fn logging_needs_a_running_monitor() {
        let mut bench = gauge_bench(500, 500);
        let series = bench.monitor.logged_series();
        let err = bench
            .monitor
            .start_logging(&series, Box::new(MemorySink::new()), OverwritePolicy::Proceed)
            .unwrap_err();
        assert!(matches!(err, MonitorError::LoggingConflict(_)));
        assert_eq!(bench.monitor.logging_state(), LoggerState::Idle);
    }

    #[test]
    fn restart_begins_a_fresh_time_base() {
        let mut bench = gauge_bench(500, 500);
        feed(&bench, 3);
        let sink = MemorySink::new();
        bench.monitor.start(ms(0));
        bench.monitor.pump(ms(0));
        let series = bench.monitor.logged_series();
        bench
            .monitor
            .start_logging(&series, Box::new(sink.clone()), OverwritePolicy::Proceed)
            .unwrap();
        bench.monitor.pump(ms(500));

        // stopping the monitor saves the session it was running
        bench.monitor.stop();
        assert_eq!(bench.monitor.logging_state(), LoggerState::Idle);
        assert_eq!(sink.lines().len(), 2);

        bench.monitor.start(ms(10_000));
        let baratron = SeriesId::reading(bench.baratron);
        assert!(bench.monitor.plot().series(baratron).unwrap().is_empty());
        bench.monitor.pump(ms(10_000));
        let points: Vec<_> = bench.monitor.plot().series(baratron).unwrap().points().copied().collect();
        assert_eq!(points, vec![(0.0, 7.0)]);
    }

    #[test]
    fn frame_labels_must_differ_within_a_channel() {
        let manual: SharedSource = Rc::new(RefCell::new(ManualSource::new()));
        let mut monitor = Monitor::new(None);
        let twins = SensorChannel::new(
            "Dual ToF",
            ChannelInput::Frame {
                device: 1,
                labels: vec!["A".into(), "A".into()],
            },
            CalibrationModel::raw(0),
            manual,
            100,
        )
        .unwrap();
        let err = monitor.register(twins, both_on()).unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
        assert!(monitor.all_series().is_empty());
    }
}
