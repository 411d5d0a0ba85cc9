use std::collections::BTreeMap;

use serde::Deserialize;
use toml::Spanned;

use crate::template::Template;

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "phoned".to_string()
}

fn default_name() -> String {
    "MQTT Phone".to_string()
}

fn default_payload_idle() -> String {
    "idle".to_string()
}

fn default_payload_ringing() -> String {
    "ringing".to_string()
}

fn default_payload_offhook() -> String {
    "offhook".to_string()
}

/// Configuration for the MQTT integration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// MQTT broker hostname or IP address
    pub broker: String,

    /// MQTT broker port (default: 1883)
    #[serde(default = "default_port")]
    pub port: u16,

    /// MQTT client ID (default: "phoned")
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Optional username for authentication
    pub username: Option<String>,

    /// Optional password for authentication
    pub password: Option<String>,

    /// Phones bridged over MQTT, keyed by object id (`phone.<object_id>`)
    #[serde(default)]
    pub phones: BTreeMap<String, PhoneConfig>,
}

/// Configuration of one MQTT phone
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhoneConfig {
    /// Human-readable name (default: "MQTT Phone")
    #[serde(default = "default_name")]
    pub name: String,

    /// Topic the device reports its line state on. Without one the phone
    /// runs in optimistic mode.
    pub state_topic: Option<Spanned<String>>,

    /// Topic outbound dial commands are published to
    pub command_topic: Spanned<String>,

    #[serde(default)]
    pub qos: Qos,

    /// Publish dial commands with the retain flag
    #[serde(default)]
    pub retain: bool,

    #[serde(default = "default_payload_idle")]
    pub payload_idle: String,

    #[serde(default = "default_payload_ringing")]
    pub payload_ringing: String,

    #[serde(default = "default_payload_offhook")]
    pub payload_offhook: String,

    /// Assume a call succeeded as soon as the dial command is published
    #[serde(default)]
    pub optimistic: bool,

    /// Normalises a state payload before it is matched against the literals
    pub value_template: Option<Template>,

    /// Extracts the caller id from a state payload
    pub callerid_template: Option<Template>,

    /// Extracts the caller name from a state payload
    pub callername_template: Option<Template>,

    /// Builds the dial payload from the destination number. Without one the
    /// number itself is published.
    pub command_template: Option<Template>,
}

/// MQTT quality of service level, configured as 0, 1 or 2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for Qos {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(format!("invalid QoS level {}, expected 0, 1 or 2", other)),
        }
    }
}
