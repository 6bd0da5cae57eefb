use thiserror::Error;

/// Failure of the external raw-value source. The channel that asked keeps its
/// previous sample; the scheduler keeps running.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading {address} failed: {reason}")]
    Read { address: String, reason: String },
    #[error("{0} is not supported by this source")]
    Unsupported(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("logging conflict: {0}")]
    LoggingConflict(&'static str),
    #[error("no destination armed; choose one before starting to log")]
    NotArmed,
    #[error("unknown channel or series: {0}")]
    UnknownChannel(String),
    #[error("poll interval must be greater than zero ({0})")]
    InvalidInterval(String),
    #[error("invalid analog pin {0:?}, expected AIN<n>")]
    InvalidPin(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to render plot: {0}")]
    Plot(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for MonitorError {
    fn from(value: serde_json::Error) -> Self {
        MonitorError::Config(value.to_string())
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for MonitorError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        MonitorError::Plot(format!("{value:?}"))
    }
}

impl From<image::ImageError> for MonitorError {
    fn from(value: image::ImageError) -> Self {
        MonitorError::Plot(value.to_string())
    }
}
