use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use crate::types::{Sample, SeriesId};

/// One trace: (seconds since the monitor started, value) pairs.
#[derive(Clone, Debug)]
pub struct PlotSeries {
    label: String,
    enabled: bool,
    points: VecDeque<(f64, f64)>,
}

impl PlotSeries {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn points(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Accumulates plot points for every plot-eligible series. Unbounded unless
/// `max_points` is set, in which case the oldest points are dropped.
#[derive(Clone, Debug, Default)]
pub struct PlotBuffer {
    series: BTreeMap<SeriesId, PlotSeries>,
    started_at: Duration,
    max_points: Option<usize>,
}

impl PlotBuffer {
    pub fn new(started_at: Duration, max_points: Option<usize>) -> Self {
        Self {
            series: BTreeMap::new(),
            started_at,
            max_points: max_points.filter(|n| *n > 0),
        }
    }

    /// Make a series plot-eligible. Re-adding an id replaces it and drops its points.
    pub fn add_series(&mut self, id: SeriesId, label: impl Into<String>, enabled: bool) {
        self.series.insert(
            id,
            PlotSeries {
                label: label.into(),
                enabled,
                points: VecDeque::new(),
            },
        );
    }

    pub fn remove_series(&mut self, id: SeriesId) -> bool {
        self.series.remove(&id).is_some()
    }

    /// Time that plots as zero. Existing points keep their elapsed values.
    pub fn set_origin(&mut self, started_at: Duration) {
        self.started_at = started_at;
    }

    pub fn contains(&self, id: SeriesId) -> bool {
        self.series.contains_key(&id)
    }

    /// Returns false if the series is not plot-eligible.
    pub fn set_enabled(&mut self, id: SeriesId, enabled: bool) -> bool {
        match self.series.get_mut(&id) {
            Some(series) => {
                series.enabled = enabled;
                if !enabled {
                    series.points.clear();
                }
                true
            }
            None => false,
        }
    }

    /// Append the sample if the series is enabled and the sample is valid.
    /// A disabled series is blanked instead.
    pub fn on_sample(&mut self, id: SeriesId, sample: &Sample) {
        let Some(series) = self.series.get_mut(&id) else {
            return;
        };
        if !series.enabled {
            series.points.clear();
            return;
        }
        let Some(value) = sample.value() else {
            return;
        };
        let elapsed = sample.timestamp.saturating_sub(self.started_at).as_secs_f64();
        if let Some(max) = self.max_points {
            while series.points.len() >= max {
                series.points.pop_front();
            }
        }
        series.points.push_back((elapsed, value));
    }

    /// Clear every series, enabled or not.
    pub fn reset(&mut self) {
        for series in self.series.values_mut() {
            series.points.clear();
        }
    }

    pub fn series(&self, id: SeriesId) -> Option<&PlotSeries> {
        self.series.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SeriesId, &PlotSeries)> {
        self.series.iter()
    }

    /// Enabled series that have at least one point, in series order.
    pub fn visible(&self) -> impl Iterator<Item = &PlotSeries> {
        self.series
            .values()
            .filter(|series| series.enabled && !series.points.is_empty())
    }
}
