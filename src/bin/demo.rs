//! demo - scripted synthetic subject driven through a monitoring session

use anyhow::{anyhow, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use seizure_watch::alert::{AlertDispatcher, BroadcastSink, EventLogSink};
use seizure_watch::{
    BodyPart, ClockSource, DetectorConfig, Keypoint, KeypointFrame, MonitorSession,
    SeizureDetector, Timestamp,
};

const DEMO_EPOCH_S: f64 = 1_700_000_000.0;

/// Upright subject facing the camera, pixel coordinates.
const STANDING: [(BodyPart, i32, i32); 17] = [
    (BodyPart::Nose, 320, 100),
    (BodyPart::LeftEye, 315, 95),
    (BodyPart::RightEye, 325, 95),
    (BodyPart::LeftEar, 310, 100),
    (BodyPart::RightEar, 330, 100),
    (BodyPart::LeftShoulder, 300, 150),
    (BodyPart::RightShoulder, 340, 150),
    (BodyPart::LeftElbow, 290, 200),
    (BodyPart::RightElbow, 350, 200),
    (BodyPart::LeftWrist, 285, 250),
    (BodyPart::RightWrist, 355, 250),
    (BodyPart::LeftHip, 305, 260),
    (BodyPart::RightHip, 335, 260),
    (BodyPart::LeftKnee, 305, 340),
    (BodyPart::RightKnee, 335, 340),
    (BodyPart::LeftAnkle, 305, 420),
    (BodyPart::RightAnkle, 335, 420),
];

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Frames per second of the synthetic stream.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Output directory for the alert log.
    #[arg(long, default_value = "demo_out")]
    out: String,
}

#[derive(Clone, Copy, Debug)]
enum Phase {
    Upright,
    Fallen,
    Convulsing,
    Frozen,
}

/// (phase, seconds)
const SCRIPT: [(Phase, u32); 5] = [
    (Phase::Upright, 3),
    (Phase::Fallen, 3),
    (Phase::Upright, 3),
    (Phase::Convulsing, 3),
    (Phase::Frozen, 13),
];

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    let out_dir = PathBuf::from(&args.out);
    fs::create_dir_all(&out_dir)?;
    let log_path = out_dir.join("event_log.txt");
    if log_path.exists() {
        fs::remove_file(&log_path)?;
    }

    stage("open session");
    let mut broadcast = BroadcastSink::new();
    let alerts = broadcast.subscribe();
    let dispatcher = AlertDispatcher::new()
        .with_sink(EventLogSink::new(&log_path)?)
        .with_sink(broadcast);
    let mut session = MonitorSession::new(
        SeizureDetector::new(DetectorConfig::default()),
        dispatcher,
        ClockSource::Frame,
    );
    session.start();

    stage("run scripted subject");
    let mut frame_index = 0u64;
    for (phase, seconds) in SCRIPT {
        eprintln!("demo:   {:?} for {}s", phase, seconds);
        for _ in 0..seconds * args.fps {
            let pose = synthesize(phase, frame_index);
            session.process_at(Some(&pose), frame_time(frame_index, args.fps));
            frame_index += 1;
        }
        // a dropped detection between phases
        session.process_at(None, frame_time(frame_index, args.fps));
        for record in alerts.try_iter() {
            println!(
                "  {} {:<16} {:.2} {}",
                record.timestamp, record.alert_type, record.confidence, record.description
            );
        }
    }
    session.stop();

    stage("summarize alert log");
    let entries = EventLogSink::new(&log_path)?.read_entries()?;
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for entry in &entries {
        *by_type.entry(entry.alert_type.clone()).or_default() += 1;
    }
    let status = session.status();
    println!("frames processed: {}", status.frames_processed);
    println!(
        "alerts: {} (sink failures: {})",
        status.alert_count, status.sink_failures
    );
    for (alert_type, count) in &by_type {
        println!("  {:<16} {}", alert_type, count);
    }
    println!("alert log: {}", log_path.display());
    Ok(())
}

fn frame_time(frame_index: u64, fps: u32) -> Timestamp {
    Timestamp::from_secs_f64(DEMO_EPOCH_S + frame_index as f64 / fps as f64)
}

fn synthesize(phase: Phase, frame_index: u64) -> KeypointFrame {
    let wobble = (frame_index % 2) as i32;
    STANDING
        .iter()
        .map(|&(part, x, y)| {
            let (x, y) = match phase {
                Phase::Upright => (x + wobble, y),
                Phase::Fallen => lying(x, y),
                Phase::Convulsing => {
                    let (x, y) = lying(x, y);
                    let jerk = if frame_index % 2 == 0 { 60 } else { -60 };
                    if is_limb_end(part) {
                        (x + jerk, y - jerk)
                    } else {
                        (x + jerk / 3, y)
                    }
                }
                Phase::Frozen => lying(x, y),
            };
            (part, Keypoint::new(x, y))
        })
        .collect()
}

/// Lays the standing layout along the floor: head slightly below the hips,
/// legs sprawled towards the camera.
fn lying(x: i32, y: i32) -> (i32, i32) {
    let sag = if y <= 260 { (260 - y) / 32 } else { (y - 260) * 3 / 8 };
    (100 + y, 400 + (x - 320) / 4 + sag)
}

fn is_limb_end(part: BodyPart) -> bool {
    matches!(
        part,
        BodyPart::LeftWrist | BodyPart::RightWrist | BodyPart::LeftAnkle | BodyPart::RightAnkle
    )
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}
