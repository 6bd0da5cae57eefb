use std::fs;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{info, warn};

use crate::config::MonitorConfig;
use crate::drivers::pipeline::Monitor;
use crate::drivers::plot::{render_plot_png, PlotStyle};
use crate::drivers::source::SharedSource;
use crate::recorder::{FileSink, OverwritePolicy};
use crate::types::{MonitorCommand, MonitorEvent};

// Longest sleep between pumps, so commands are still picked up promptly.
const MAX_IDLE: Duration = Duration::from_millis(50);

/// Run the monitor on its own thread. The source is created on that thread
/// by `make_source`, so it never has to be `Send`. The thread ends on
/// `Shutdown` or when the command channel closes, saving any active log.
pub fn spawn_thread<F>(
    config: MonitorConfig,
    make_source: F,
    tx: Sender<MonitorEvent>,
    rx_cmd: Receiver<MonitorCommand>,
) -> JoinHandle<anyhow::Result<()>>
where
    F: FnOnce(&MonitorConfig) -> SharedSource + Send + 'static,
{
    thread::spawn(move || -> anyhow::Result<()> {
        let source = make_source(&config);
        let mut monitor = config
            .build_monitor(source)
            .context("building the monitor from its configuration")?;
        let clock = Instant::now();
        monitor.start(clock.elapsed());
        let message = format!("Monitor running with {} series", monitor.all_series().len());
        info!("{message}");
        tx.send(MonitorEvent::Log(message)).ok();

        'running: loop {
            for _ in 0..10 {
                match rx_cmd.try_recv() {
                    Ok(MonitorCommand::Shutdown) | Err(TryRecvError::Disconnected) => {
                        break 'running
                    }
                    Ok(cmd) => handle_command(&mut monitor, cmd, &tx),
                    Err(TryRecvError::Empty) => break,
                }
            }

            let report = monitor.pump(clock.elapsed());
            for failure in report.failures {
                tx.send(MonitorEvent::Log(format!(
                    "{}: {}",
                    failure.channel, failure.error
                )))
                .ok();
            }
            if report.fired > 0 {
                tx.send(MonitorEvent::Readings(monitor.readings_text())).ok();
            }

            let now = clock.elapsed();
            let wait = monitor
                .next_due()
                .map_or(MAX_IDLE, |due| due.saturating_sub(now).min(MAX_IDLE));
            if !wait.is_zero() {
                thread::sleep(wait);
            }
        }

        if monitor.logger().is_writing() {
            handle_command(&mut monitor, MonitorCommand::StopLogging, &tx);
        }
        monitor.stop();
        tx.send(MonitorEvent::Stopped).ok();
        Ok(())
    })
}

fn handle_command(monitor: &mut Monitor, cmd: MonitorCommand, tx: &Sender<MonitorEvent>) {
    let log = |message: String| {
        tx.send(MonitorEvent::Log(message)).ok();
    };
    match cmd {
        MonitorCommand::StartLogging { path, overwrite } => {
            let policy = if overwrite {
                OverwritePolicy::Proceed
            } else {
                OverwritePolicy::Abort
            };
            let series = monitor.logged_series();
            match monitor.start_logging(&series, Box::new(FileSink::new(&path)), policy) {
                Ok(true) => {
                    tx.send(MonitorEvent::LoggingStatus(true)).ok();
                    log(format!("Logging to {}", path.display()));
                }
                Ok(false) => log(format!("{} exists; not overwritten", path.display())),
                Err(err) => {
                    warn!("start logging: {err}");
                    log(format!("Cannot start logging: {err}"));
                }
            }
        }
        MonitorCommand::StopLogging => match monitor.stop_logging() {
            Ok(rows) => {
                tx.send(MonitorEvent::LoggingStatus(false)).ok();
                log(format!("Logging stopped, {rows} row(s) saved"));
            }
            Err(err) => {
                warn!("stop logging: {err}");
                log(format!("Cannot stop logging: {err}"));
            }
        },
        MonitorCommand::SetPlotEnabled { label, enabled } => {
            let result = monitor
                .series_by_label(&label)
                .map(|series| monitor.set_plot_enabled(series, enabled));
            match result {
                Some(Ok(())) => {}
                Some(Err(err)) => log(err.to_string()),
                None => log(format!("No series named {label:?}")),
            }
        }
        MonitorCommand::ResetPlot => monitor.reset_plot(),
        MonitorCommand::RenderPlot { path, log_scale } => {
            let style = PlotStyle {
                log_scale,
                ..PlotStyle::default()
            };
            // annotations need a system font; fall back to bare traces
            let png = render_plot_png(monitor.plot(), &style).or_else(|err| {
                warn!("annotated plot failed ({err}), drawing without labels");
                render_plot_png(
                    monitor.plot(),
                    &PlotStyle {
                        annotate: false,
                        ..style
                    },
                )
            });
            match png.and_then(|bytes| fs::write(&path, bytes).map_err(Into::into)) {
                Ok(()) => log(format!("Plot saved to {}", path.display())),
                Err(err) => {
                    warn!("render plot: {err}");
                    log(format!("Cannot save plot: {err}"));
                }
            }
        }
        MonitorCommand::Shutdown => {}
    }
}
