//! MQTT alert publishing.
//!
//! Alerts are published as JSON with QoS 1 to a single topic. The broker must
//! be loopback unless remote brokers are explicitly allowed; an availability
//! topic carries `online`/`offline` with the offline state set as last will.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::alert::{AlertRecord, AlertSink};
use crate::config::MqttSettings;

const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CAPACITY: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Parsed MQTT broker address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Supports formats:
/// - `host:port`
/// - `mqtt://host:port` / `tcp://host:port` (plain TCP)
/// - `mqtts://host:port` / `ssl://host:port` (TLS)
/// - `[ipv6]:port`
pub fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    // [::1]:1883
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid MQTT port in {}", addr))?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid MQTT port in {}", addr))?;
    Ok((host.to_string(), port))
}

pub fn validate_loopback_addr(endpoint: &MqttEndpoint, original: &str) -> Result<()> {
    let host = endpoint.host.as_str();
    if host == "localhost" {
        return Ok(());
    }
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        if ip.is_loopback() {
            return Ok(());
        }
    }
    Err(anyhow!(
        "MQTT broker must be loopback: {} (set allow_remote to override)",
        original
    ))
}

pub fn availability_topic(alert_topic: &str) -> String {
    format!("{}/availability", alert_topic.trim_end_matches('/'))
}

/// Publishes alert records to an MQTT broker.
///
/// Publishing only queues the request; a full or closed queue fails the
/// delivery immediately instead of stalling the caller.
pub struct MqttAlertSink {
    client: Client,
    topic: String,
    availability_topic: String,
    connection_handle: Option<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
}

impl MqttAlertSink {
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&settings.addr)?;
        if !settings.allow_remote {
            validate_loopback_addr(&endpoint, &settings.addr)?;
        }
        if endpoint.use_tls {
            return Err(anyhow!(
                "TLS MQTT endpoints are not supported: {}",
                settings.addr
            ));
        }

        let availability_topic = availability_topic(&settings.topic);
        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_start(true);
        let will = rumqttc::v5::mqttbytes::v5::LastWill::new(
            &availability_topic,
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        );
        options.set_last_will(will);

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let stopping = Arc::new(AtomicBool::new(false));
        let connection_handle = spawn_event_loop(connection, Arc::clone(&stopping));
        let sink = Self::with_client(client, &settings.topic, Some(connection_handle), stopping);
        sink.publish_availability(PAYLOAD_ONLINE)?;
        log::info!(
            "publishing alerts to MQTT {}:{} topic {}",
            endpoint.host,
            endpoint.port,
            settings.topic
        );
        Ok(sink)
    }

    fn with_client(
        client: Client,
        topic: &str,
        connection_handle: Option<JoinHandle<()>>,
        stopping: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            topic: topic.to_string(),
            availability_topic: availability_topic(topic),
            connection_handle,
            stopping,
        }
    }

    fn publish_availability(&self, payload: &str) -> Result<()> {
        self.client
            .try_publish(
                self.availability_topic.as_str(),
                QoS::AtLeastOnce,
                true,
                payload.as_bytes().to_vec(),
            )
            .with_context(|| format!("failed to queue MQTT availability {}", payload))
    }

    /// Marks the service offline and waits for the event loop to drain.
    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.connection_handle.take() else {
            return Ok(());
        };
        self.stopping.store(true, Ordering::SeqCst);
        self.publish_availability(PAYLOAD_OFFLINE)?;
        // On failure the handle is dropped and the loop thread left detached.
        self.client
            .try_disconnect()
            .context("failed to queue MQTT disconnect")?;
        let _ = handle.join();
        Ok(())
    }
}

impl Drop for MqttAlertSink {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("MQTT disconnect failed: {:#}", err);
        }
    }
}

/// Drives the connection; errors are retried after `RECONNECT_DELAY` until
/// the sink is stopping or every client handle is gone.
fn spawn_event_loop(mut connection: Connection, stopping: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    if stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    log::warn!(
                        "MQTT connection error: {} (retrying in {}s)",
                        e,
                        RECONNECT_DELAY.as_secs()
                    );
                    std::thread::sleep(RECONNECT_DELAY);
                }
            }
        }
    })
}

impl AlertSink for MqttAlertSink {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn deliver(&mut self, record: &AlertRecord) -> Result<()> {
        let payload = serde_json::to_vec(record)?;
        self.client
            .try_publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .with_context(|| format!("failed to queue MQTT alert on {}", self.topic))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlertType;

    #[test]
    fn parse_endpoint_plain() {
        let ep = parse_mqtt_endpoint("127.0.0.1:1883").unwrap();
        assert_eq!(ep.host, "127.0.0.1");
        assert_eq!(ep.port, 1883);
        assert!(!ep.use_tls);
    }

    #[test]
    fn parse_endpoint_schemes() {
        assert!(!parse_mqtt_endpoint("mqtt://localhost:1883").unwrap().use_tls);
        assert!(!parse_mqtt_endpoint("tcp://localhost:1883").unwrap().use_tls);
        assert!(parse_mqtt_endpoint("mqtts://localhost:8883").unwrap().use_tls);
        assert!(parse_mqtt_endpoint("ws://localhost:80").is_err());
    }

    #[test]
    fn parse_endpoint_ipv6() {
        let ep = parse_mqtt_endpoint("[::1]:1883").unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.port, 1883);
    }

    #[test]
    fn parse_endpoint_requires_port() {
        assert!(parse_mqtt_endpoint("localhost").is_err());
        assert!(parse_mqtt_endpoint("localhost:notaport").is_err());
        assert!(parse_mqtt_endpoint(":1883").is_err());
    }

    #[test]
    fn loopback_hosts_pass() {
        for addr in ["localhost:1883", "127.0.0.1:1883", "127.0.0.2:1883", "[::1]:1883"] {
            let ep = parse_mqtt_endpoint(addr).unwrap();
            assert!(validate_loopback_addr(&ep, addr).is_ok(), "{}", addr);
        }
    }

    #[test]
    fn remote_hosts_are_rejected() {
        let ep = parse_mqtt_endpoint("192.168.1.10:1883").unwrap();
        assert!(validate_loopback_addr(&ep, "192.168.1.10:1883").is_err());
    }

    #[test]
    fn connect_refuses_remote_broker_by_default() {
        let settings = MqttSettings {
            addr: "broker.example.com:1883".to_string(),
            topic: "seizure_watch/alerts".to_string(),
            client_id: "test".to_string(),
            allow_remote: false,
        };
        assert!(MqttAlertSink::connect(&settings).is_err());
    }

    #[test]
    fn availability_topic_nests_under_alert_topic() {
        assert_eq!(
            availability_topic("seizure_watch/alerts/"),
            "seizure_watch/alerts/availability"
        );
    }

    fn sample_record() -> AlertRecord {
        AlertRecord {
            timestamp: "2023-11-14T22:13:20.000000Z".to_string(),
            alert_type: AlertType::Fall,
            confidence: 0.8,
            description: "Body in horizontal position with head below hips".to_string(),
        }
    }

    fn detached_sink(capacity: usize) -> (MqttAlertSink, Connection) {
        let options = MqttOptions::new("seizure_watch_test", "127.0.0.1", 1883);
        let (client, connection) = Client::new(options, capacity);
        let sink = MqttAlertSink::with_client(
            client,
            "seizure_watch/alerts",
            None,
            Arc::new(AtomicBool::new(false)),
        );
        (sink, connection)
    }

    #[test]
    fn deliver_fails_fast_when_request_queue_is_full() {
        // nothing polls the connection, so the single slot stays occupied
        let (mut sink, _connection) = detached_sink(1);
        let record = sample_record();
        assert!(sink.deliver(&record).is_ok());
        let err = sink.deliver(&record).unwrap_err();
        assert!(format!("{:#}", err).contains("seizure_watch/alerts"));
    }

    #[test]
    fn deliver_fails_fast_when_event_loop_is_gone() {
        let (mut sink, connection) = detached_sink(REQUEST_CAPACITY);
        drop(connection);
        assert!(sink.deliver(&sample_record()).is_err());
    }

    #[test]
    fn sink_reports_its_name_and_availability_topic() {
        let (sink, _connection) = detached_sink(1);
        assert_eq!(sink.name(), "mqtt");
        assert_eq!(sink.availability_topic, "seizure_watch/alerts/availability");
    }
}
