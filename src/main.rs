use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use clap::Parser;
use log::info;

use vacuum_monitor::config::MonitorConfig;
use vacuum_monitor::drivers::source::shared;
use vacuum_monitor::engine;
use vacuum_monitor::types::{MonitorCommand, MonitorEvent};

#[derive(Parser, Debug)]
#[command(name = "vacuum-monitor")]
#[command(about = "Vacuum system gauge monitor (simulated acquisition)", long_about = None)]
struct Args {
    /// Channel configuration (JSON). The four pressure gauges when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run time in seconds (0 = until the process is killed)
    #[arg(long, value_name = "SECONDS", default_value_t = 10)]
    duration: u64,

    /// Log readings to this CSV file
    #[arg(long)]
    log: Option<PathBuf>,

    /// Replace the log file if it already exists
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Save the plot as PNG when the run ends
    #[arg(long)]
    plot: Option<PathBuf>,

    /// Log-scale Y axis for the saved plot
    #[arg(long, default_value_t = false)]
    log_scale: bool,

    /// Seed of the simulated source
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => MonitorConfig::default(),
    };

    let (tx_cmd, rx_cmd) = mpsc::channel();
    let (tx, rx) = mpsc::channel();
    let seed = args.seed;
    let handle = engine::spawn_thread(
        config,
        move |config| shared(config.simulated_source(seed)),
        tx,
        rx_cmd,
    );

    if let Some(path) = &args.log {
        tx_cmd
            .send(MonitorCommand::StartLogging {
                path: path.clone(),
                overwrite: args.overwrite,
            })
            .context("engine stopped before logging could start")?;
    }

    let started = Instant::now();
    let run_for = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    let mut last_print = Instant::now();
    loop {
        if run_for.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(MonitorEvent::Log(line)) => info!("{line}"),
            Ok(MonitorEvent::Readings(readings)) => {
                // one summary line per second is plenty on a terminal
                if last_print.elapsed() >= Duration::from_secs(1) {
                    let line: Vec<String> = readings
                        .iter()
                        .map(|r| format!("{}: {}", r.label, r.text))
                        .collect();
                    println!("{}", line.join(" | "));
                    last_print = Instant::now();
                }
            }
            Ok(MonitorEvent::LoggingStatus(active)) => info!("logging active: {active}"),
            Ok(MonitorEvent::Stopped) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(path) = &args.plot {
        tx_cmd
            .send(MonitorCommand::RenderPlot {
                path: path.clone(),
                log_scale: args.log_scale,
            })
            .ok();
    }
    tx_cmd.send(MonitorCommand::Shutdown).ok();
    for event in rx.iter() {
        match event {
            MonitorEvent::Log(line) => info!("{line}"),
            MonitorEvent::Stopped => break,
            _ => {}
        }
    }

    handle
        .join()
        .map_err(|_| anyhow!("monitor thread panicked"))??;
    Ok(())
}
