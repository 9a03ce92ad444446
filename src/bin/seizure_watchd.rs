//! seizure_watchd - streaming alert daemon
//!
//! This daemon:
//! 1. Loads detector settings (SEIZURE_CONFIG file + SEIZURE_* env overrides)
//! 2. Reads keypoint frames as JSON lines from stdin or a file
//! 3. Runs every frame through one seizure detector
//! 4. Appends fired alerts to the event log and optionally publishes them over MQTT
//! 5. Logs session health periodically and stops cleanly on Ctrl-C or end of input

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use seizure_watch::alert::{AlertDispatcher, EventLogSink};
use seizure_watch::transport::MqttAlertSink;
use seizure_watch::{FrameMessage, FrameReader, MonitorSession, SeizureDetector, WatchdConfig};

#[derive(Parser, Debug)]
#[command(
    name = "seizure_watchd",
    author,
    version,
    about = "Streams keypoint frames through the seizure detector"
)]
struct Args {
    /// Frame stream (JSON lines). Reads stdin when omitted.
    #[arg(long, env = "SEIZURE_INPUT", value_name = "PATH")]
    input: Option<PathBuf>,

    /// Allow a non-loopback MQTT broker.
    #[arg(long, env = "SEIZURE_ALLOW_REMOTE_MQTT")]
    allow_remote_mqtt: bool,

    /// Seconds between health log lines.
    #[arg(long, env = "SEIZURE_HEALTH_SECS", default_value_t = 30)]
    health_secs: u64,
}

enum Input {
    Frame(Result<FrameMessage>),
    Eof,
    Shutdown,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = WatchdConfig::load()?;
    if args.allow_remote_mqtt {
        if let Some(mqtt) = cfg.mqtt.as_mut() {
            mqtt.allow_remote = true;
        }
    }

    let mut dispatcher = AlertDispatcher::new().with_sink(EventLogSink::new(&cfg.event_log_path)?);
    if let Some(mqtt) = &cfg.mqtt {
        dispatcher.add_sink(MqttAlertSink::connect(mqtt)?);
    }

    log::info!(
        "seizure_watchd {} running. alert log {}",
        env!("CARGO_PKG_VERSION"),
        cfg.event_log_path.display()
    );
    log::info!(
        "clock={:?} sinks=[{}]",
        cfg.clock,
        dispatcher.sink_names().join(", ")
    );

    let mut session = MonitorSession::new(SeizureDetector::new(cfg.detector), dispatcher, cfg.clock);
    session.start();

    let reader: Box<dyn BufRead + Send> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let (tx, rx) = mpsc::channel();
    let shutdown_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(Input::Shutdown);
    })
    .context("error setting Ctrl-C handler")?;

    std::thread::spawn(move || {
        for frame in FrameReader::new(reader) {
            if tx.send(Input::Frame(frame)).is_err() {
                return;
            }
        }
        let _ = tx.send(Input::Eof);
    });

    let health_interval = Duration::from_secs(args.health_secs.max(1));
    let mut last_health_log = Instant::now();
    let mut rejected_lines = 0u64;

    loop {
        match rx.recv_timeout(health_interval) {
            Ok(Input::Frame(Ok(message))) => {
                session.process(&message);
            }
            Ok(Input::Frame(Err(e))) => {
                rejected_lines += 1;
                log::warn!("frame rejected: {:#}", e);
            }
            Ok(Input::Eof) => {
                log::info!("end of frame stream");
                break;
            }
            Ok(Input::Shutdown) => {
                log::info!("shutdown signal received");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if last_health_log.elapsed() >= health_interval {
            let status = session.status();
            log::info!(
                "health frames={} alerts={} sink_failures={} rejected={}",
                status.frames_processed,
                status.alert_count,
                status.sink_failures,
                rejected_lines
            );
            last_health_log = Instant::now();
        }
    }

    session.stop();
    let status = session.status();
    log::info!(
        "seizure_watchd exiting: frames={} alerts={} sink_failures={} rejected={}",
        status.frames_processed,
        status.alert_count,
        status.sink_failures,
        rejected_lines
    );
    Ok(())
}
