//! Transport layer for alert publishing.
//!
//! Currently MQTT only: endpoint parsing, the loopback guard and the
//! `MqttAlertSink`.

mod mqtt;

pub use mqtt::{
    availability_topic, parse_mqtt_endpoint, validate_loopback_addr, MqttAlertSink, MqttEndpoint,
};
