// src/drivers/mod.rs
// Acquisition path: raw source -> calibration -> channel -> scheduler,
// with velocity estimation and plotting on top.
pub mod buffer;
pub mod calibration;
pub mod channel;
pub mod error;
pub mod pipeline;
pub mod plot;
pub mod scheduler;
pub mod source;
pub mod thermocouple;
pub mod velocity;

pub use buffer::{PlotBuffer, PlotSeries};
pub use calibration::{CalibrationModel, ColdJunction, Conversion};
pub use channel::SensorChannel;
pub use error::{MonitorError, SourceError};
pub use pipeline::{Monitor, PumpReport, SeriesOptions};
pub use plot::{render_plot_png, PlotStyle};
pub use scheduler::{PollingScheduler, TaskId};
pub use source::{AnalogPin, ChannelInput, ManualSource, RawSource, SharedSource, SimulatedSource};
pub use velocity::VelocityEstimator;
