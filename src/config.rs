use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::detect::{default_patterns, PatternSpec};
use crate::pose::BodyPart;

const DEFAULT_FALL_THRESHOLD: f32 = 0.6;
const DEFAULT_RAPID_MOVEMENT_THRESHOLD: f32 = 50.0;
const DEFAULT_IMMOBILITY_MOVEMENT_THRESHOLD: f32 = 5.0;
const DEFAULT_IMMOBILITY_DURATION_SECS: f64 = 10.0;
const DEFAULT_ALERT_COOLDOWN_SECS: f64 = 5.0;
const DEFAULT_EVENT_LOG_PATH: &str = "event_log.txt";
const DEFAULT_MQTT_TOPIC: &str = "seizure_watch/alerts";
const DEFAULT_MQTT_CLIENT_ID: &str = "seizure_watchd";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct WatchdConfigFile {
    event_log: Option<PathBuf>,
    clock: Option<String>,
    detector: Option<DetectorConfigFile>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    fall_threshold: Option<f32>,
    rapid_movement_threshold: Option<f32>,
    immobility_movement_threshold: Option<f32>,
    immobility_duration_secs: Option<f64>,
    alert_cooldown_secs: Option<f64>,
    tracked_parts: Option<Vec<String>>,
    patterns: Option<Vec<PatternSpec>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MqttConfigFile {
    addr: Option<String>,
    topic: Option<String>,
    client_id: Option<String>,
    allow_remote: Option<bool>,
}

/// Thresholds and pattern table for one detector. Fixed for the detector's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub fall_threshold: f32,
    pub rapid_movement_threshold: f32,
    pub immobility_movement_threshold: f32,
    pub immobility_duration: Duration,
    pub alert_cooldown: Duration,
    /// Parts fed to the velocity-based analyzers; `None` means all.
    pub tracked_parts: Option<Vec<BodyPart>>,
    /// Ordered: earlier entries win consistency ties.
    pub patterns: Vec<PatternSpec>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            fall_threshold: DEFAULT_FALL_THRESHOLD,
            rapid_movement_threshold: DEFAULT_RAPID_MOVEMENT_THRESHOLD,
            immobility_movement_threshold: DEFAULT_IMMOBILITY_MOVEMENT_THRESHOLD,
            immobility_duration: Duration::from_secs_f64(DEFAULT_IMMOBILITY_DURATION_SECS),
            alert_cooldown: Duration::from_secs_f64(DEFAULT_ALERT_COOLDOWN_SECS),
            tracked_parts: None,
            patterns: default_patterns(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fall_threshold) {
            return Err(anyhow!("fall_threshold must be within 0..=1"));
        }
        ensure_positive("rapid_movement_threshold", self.rapid_movement_threshold)?;
        ensure_positive(
            "immobility_movement_threshold",
            self.immobility_movement_threshold,
        )?;
        if self.immobility_duration.is_zero() {
            return Err(anyhow!("immobility duration must be greater than zero"));
        }
        if let Some(parts) = &self.tracked_parts {
            if parts.is_empty() {
                return Err(anyhow!("tracked_parts must not be empty when set"));
            }
        }
        if self.patterns.is_empty() {
            return Err(anyhow!("pattern table must not be empty"));
        }
        let mut names = HashSet::new();
        for pattern in &self.patterns {
            if pattern.name.trim().is_empty() {
                return Err(anyhow!("pattern name must not be empty"));
            }
            if !names.insert(pattern.name.as_str()) {
                return Err(anyhow!("duplicate pattern name: {}", pattern.name));
            }
            ensure_positive(
                &format!("pattern {} velocity_threshold", pattern.name),
                pattern.velocity_threshold,
            )?;
            if !(0.0..=1.0).contains(&pattern.consistency_threshold) {
                return Err(anyhow!(
                    "pattern {} consistency_threshold must be within 0..=1",
                    pattern.name
                ));
            }
        }
        Ok(())
    }

    fn apply_file(&mut self, file: DetectorConfigFile) -> Result<()> {
        if let Some(v) = file.fall_threshold {
            self.fall_threshold = v;
        }
        if let Some(v) = file.rapid_movement_threshold {
            self.rapid_movement_threshold = v;
        }
        if let Some(v) = file.immobility_movement_threshold {
            self.immobility_movement_threshold = v;
        }
        if let Some(secs) = file.immobility_duration_secs {
            self.immobility_duration = duration_from_secs("immobility_duration_secs", secs)?;
        }
        if let Some(secs) = file.alert_cooldown_secs {
            self.alert_cooldown = duration_from_secs("alert_cooldown_secs", secs)?;
        }
        if let Some(names) = file.tracked_parts {
            let parts = names
                .iter()
                .map(|name| name.parse::<BodyPart>())
                .collect::<Result<Vec<_>>>()?;
            self.tracked_parts = Some(parts);
        }
        if let Some(patterns) = file.patterns {
            self.patterns = patterns;
        }
        Ok(())
    }
}

/// Where a frame's analysis instant comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClockSource {
    /// Payload timestamp, falling back to the wall clock when absent.
    #[default]
    Frame,
    /// Wall clock sampled once per frame.
    Wall,
}

impl FromStr for ClockSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "frame" => Ok(ClockSource::Frame),
            "wall" => Ok(ClockSource::Wall),
            other => Err(anyhow!("unknown clock source: {} (expected frame|wall)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    pub addr: String,
    pub topic: String,
    pub client_id: String,
    pub allow_remote: bool,
}

#[derive(Debug, Clone)]
pub struct WatchdConfig {
    pub detector: DetectorConfig,
    pub event_log_path: PathBuf,
    pub clock: ClockSource,
    /// Alert publishing is disabled when unset.
    pub mqtt: Option<MqttSettings>,
}

impl WatchdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SEIZURE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WatchdConfigFile) -> Result<Self> {
        let mut detector = DetectorConfig::default();
        if let Some(detector_file) = file.detector {
            detector.apply_file(detector_file)?;
        }
        let clock = match file.clock.as_deref() {
            Some(raw) => raw.parse()?,
            None => ClockSource::default(),
        };
        let mqtt = match file.mqtt {
            Some(mqtt) => mqtt.addr.map(|addr| MqttSettings {
                addr,
                topic: mqtt
                    .topic
                    .unwrap_or_else(|| DEFAULT_MQTT_TOPIC.to_string()),
                client_id: mqtt
                    .client_id
                    .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
                allow_remote: mqtt.allow_remote.unwrap_or(false),
            }),
            None => None,
        };
        Ok(Self {
            detector,
            event_log_path: file
                .event_log
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EVENT_LOG_PATH)),
            clock,
            mqtt,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SEIZURE_EVENT_LOG") {
            if !path.trim().is_empty() {
                self.event_log_path = PathBuf::from(path);
            }
        }
        if let Ok(clock) = std::env::var("SEIZURE_CLOCK") {
            self.clock = clock.parse()?;
        }
        if let Ok(addr) = std::env::var("SEIZURE_MQTT_ADDR") {
            if !addr.trim().is_empty() {
                match self.mqtt.as_mut() {
                    Some(mqtt) => mqtt.addr = addr,
                    None => {
                        self.mqtt = Some(MqttSettings {
                            addr,
                            topic: DEFAULT_MQTT_TOPIC.to_string(),
                            client_id: DEFAULT_MQTT_CLIENT_ID.to_string(),
                            allow_remote: false,
                        })
                    }
                }
            }
        }
        if let Ok(topic) = std::env::var("SEIZURE_MQTT_TOPIC") {
            if !topic.trim().is_empty() {
                if let Some(mqtt) = self.mqtt.as_mut() {
                    mqtt.topic = topic;
                }
            }
        }
        if let Some(v) = env_number::<f32>("SEIZURE_FALL_THRESHOLD")? {
            self.detector.fall_threshold = v;
        }
        if let Some(v) = env_number::<f32>("SEIZURE_RAPID_THRESHOLD")? {
            self.detector.rapid_movement_threshold = v;
        }
        if let Some(v) = env_number::<f32>("SEIZURE_IMMOBILITY_THRESHOLD")? {
            self.detector.immobility_movement_threshold = v;
        }
        if let Some(secs) = env_number::<f64>("SEIZURE_IMMOBILITY_SECS")? {
            self.detector.immobility_duration =
                duration_from_secs("SEIZURE_IMMOBILITY_SECS", secs)?;
        }
        if let Some(secs) = env_number::<f64>("SEIZURE_COOLDOWN_SECS")? {
            self.detector.alert_cooldown = duration_from_secs("SEIZURE_COOLDOWN_SECS", secs)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.detector.validate()?;
        if self.event_log_path.as_os_str().is_empty() {
            return Err(anyhow!("event log path must not be empty"));
        }
        if let Some(mqtt) = &self.mqtt {
            if mqtt.topic.trim().is_empty() {
                return Err(anyhow!("mqtt topic must not be empty"));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<WatchdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_number<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number", key)),
        _ => Ok(None),
    }
}

fn duration_from_secs(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("{} must be a non-negative number of seconds", field))
}

fn ensure_positive(field: &str, value: f32) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(anyhow!("{} must be a positive number", field));
    }
    Ok(())
}
