use tracing::debug;
use tracing::warn;

use super::config::PhoneConfig;
use super::config::Qos;
use super::topic;
use crate::engine::Entity;
use crate::engine::PhoneState;
use crate::phone;
use crate::phone::AccessToken;
use crate::phone::PhoneDevice;
use crate::phone::PhoneError;
use crate::phone::PhoneFeature;
use crate::phone::SupportedFeatures;
use crate::template::Template;

/// A message `call` asks the integration to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retain: bool,
}

/// What processing a state payload did to the phone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadOutcome {
    /// The payload matched one of the state literals
    Transition(PhoneState),

    /// No literal matched; the state is unchanged
    Unrecognized { caller_info_changed: bool },
}

impl PayloadOutcome {
    /// Whether the engine needs a fresh snapshot of the phone.
    pub fn should_report(self) -> bool {
        match self {
            PayloadOutcome::Transition(_) => true,
            PayloadOutcome::Unrecognized {
                caller_info_changed,
            } => caller_info_changed,
        }
    }
}

/// Phone entity bridged over MQTT
///
/// Mirrors the line state a gateway publishes on `state_topic` and publishes
/// dial commands on `command_topic`.
#[derive(Debug)]
pub struct MqttPhone {
    entity_id: String,
    name: String,

    state: PhoneState,
    caller_id: Option<String>,
    caller_name: Option<String>,

    state_topic: Option<String>,
    command_topic: String,
    qos: Qos,
    retain: bool,

    payload_idle: String,
    payload_ringing: String,
    payload_offhook: String,

    optimistic: bool,

    value_template: Option<Template>,
    callerid_template: Option<Template>,
    callername_template: Option<Template>,
    command_template: Option<Template>,

    token: AccessToken,
}

impl MqttPhone {
    /// Build a phone from its configuration section.
    ///
    /// A phone without a state topic has nothing to learn its state from, so
    /// it is forced into optimistic mode.
    pub fn from_config(object_id: &str, config: &PhoneConfig) -> Self {
        let state_topic = config.state_topic.as_ref().map(|t| t.get_ref().clone());
        let optimistic = config.optimistic || state_topic.is_none();

        Self {
            entity_id: phone::entity_id(object_id),
            name: config.name.clone(),
            state: PhoneState::Unknown,
            caller_id: None,
            caller_name: None,
            state_topic,
            command_topic: config.command_topic.get_ref().clone(),
            qos: config.qos,
            retain: config.retain,
            payload_idle: config.payload_idle.clone(),
            payload_ringing: config.payload_ringing.clone(),
            payload_offhook: config.payload_offhook.clone(),
            optimistic,
            value_template: config.value_template.clone(),
            callerid_template: config.callerid_template.clone(),
            callername_template: config.callername_template.clone(),
            command_template: config.command_template.clone(),
            token: AccessToken::new(),
        }
    }

    pub fn state_topic(&self) -> Option<&str> {
        self.state_topic.as_deref()
    }

    pub fn qos(&self) -> Qos {
        self.qos
    }

    pub fn optimistic(&self) -> bool {
        self.optimistic
    }

    /// Whether a message on `topic` is a state report for this phone.
    pub fn listens_on(&self, topic: &str) -> bool {
        self.state_topic
            .as_deref()
            .is_some_and(|filter| topic::matches(filter, topic))
    }

    /// Apply a payload received on the state topic.
    ///
    /// Caller info is taken from its templates before the state token is
    /// matched, so an off-hook report always ends with the caller info
    /// cleared.
    pub fn handle_payload(&mut self, payload: &[u8]) -> Result<PayloadOutcome, std::str::Utf8Error> {
        let payload = std::str::from_utf8(payload)?;

        let mut caller_info_changed = false;
        if let Some(template) = &self.callerid_template {
            let caller_id = Some(template.render_with_possible_json_value(payload));
            caller_info_changed |= caller_id != self.caller_id;
            self.caller_id = caller_id;
        }
        if let Some(template) = &self.callername_template {
            let caller_name = Some(template.render_with_possible_json_value(payload));
            caller_info_changed |= caller_name != self.caller_name;
            self.caller_name = caller_name;
        }

        let token = match &self.value_template {
            Some(template) => template.render_with_possible_json_value(payload),
            None => payload.to_string(),
        };

        let next = if token == self.payload_idle {
            PhoneState::Idle
        } else if token == self.payload_ringing {
            PhoneState::Ringing
        } else if token == self.payload_offhook {
            PhoneState::Offhook
        } else {
            warn!(
                "{}: unrecognized state payload {:?}, keeping {}",
                self.entity_id, token, self.state
            );
            return Ok(PayloadOutcome::Unrecognized {
                caller_info_changed,
            });
        };

        debug!("{}: {} -> {}", self.entity_id, self.state, next);
        self.transition(next);
        Ok(PayloadOutcome::Transition(next))
    }

    fn transition(&mut self, next: PhoneState) {
        self.state = next;
        if next == PhoneState::Offhook {
            self.caller_id = None;
            self.caller_name = None;
        }
    }
}

impl Entity for MqttPhone {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl PhoneDevice for MqttPhone {
    type Command = OutboundMessage;

    fn state(&self) -> PhoneState {
        self.state
    }

    fn caller_id(&self) -> Option<&str> {
        self.caller_id.as_deref()
    }

    fn caller_name(&self) -> Option<&str> {
        self.caller_name.as_deref()
    }

    fn supported_features(&self) -> SupportedFeatures {
        PhoneFeature::Call | PhoneFeature::DialEvent | PhoneFeature::CallEnd | PhoneFeature::CallFail
    }

    fn token(&self) -> &AccessToken {
        &self.token
    }

    /// Build the dial command for `destination`.
    ///
    /// In optimistic mode the phone goes off-hook right away instead of
    /// waiting for the gateway to report it.
    fn call(&mut self, destination: &str) -> Result<OutboundMessage, PhoneError> {
        let payload = match &self.command_template {
            Some(template) => template
                .render(destination)
                .map_err(|e| PhoneError::Command {
                    entity_id: self.entity_id.clone(),
                    reason: e.to_string(),
                })?,
            None => destination.to_string(),
        };

        if self.optimistic {
            self.transition(PhoneState::Offhook);
        }

        Ok(OutboundMessage {
            topic: self.command_topic.clone(),
            payload: payload.into_bytes(),
            qos: self.qos,
            retain: self.retain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone(toml: &str) -> MqttPhone {
        let config: PhoneConfig = toml::from_str(toml).unwrap();
        MqttPhone::from_config("hallway", &config)
    }

    fn with_state_topic() -> MqttPhone {
        phone(
            r#"
            state_topic = "voip/hallway/state"
            command_topic = "voip/hallway/dial"
            "#,
        )
    }

    #[test]
    fn test_from_config() {
        let phone = with_state_topic();
        assert_eq!(phone.entity_id(), "phone.hallway");
        assert_eq!(phone.name(), "MQTT Phone");
        assert_eq!(phone.state(), PhoneState::Unknown);
        assert_eq!(phone.state_topic(), Some("voip/hallway/state"));
        assert!(!phone.optimistic());
        assert!(phone.support_call());
        assert!(phone.support_dial_event());
        assert!(phone.support_call_end());
        assert!(phone.support_call_fail());
        assert!(!phone.support_vm());
        assert!(!phone.support_sms());
    }

    #[test]
    fn test_forced_optimistic_without_state_topic() {
        let phone = phone(r#"command_topic = "voip/hallway/dial""#);
        assert!(phone.optimistic());
        assert!(!phone.listens_on("voip/hallway/dial"));
    }

    #[test]
    fn test_literal_transitions() {
        let mut phone = with_state_topic();

        assert_eq!(
            phone.handle_payload(b"ringing").unwrap(),
            PayloadOutcome::Transition(PhoneState::Ringing)
        );
        assert_eq!(phone.state(), PhoneState::Ringing);

        phone.handle_payload(b"offhook").unwrap();
        assert_eq!(phone.state(), PhoneState::Offhook);

        phone.handle_payload(b"idle").unwrap();
        assert_eq!(phone.state(), PhoneState::Idle);
    }

    #[test]
    fn test_ringing_offhook_busy_sequence() {
        let mut phone = phone(
            r#"
            state_topic = "voip/hallway/state"
            command_topic = "voip/hallway/dial"
            callerid_template = "{{ value }}"
            "#,
        );

        phone.handle_payload(b"ringing").unwrap();
        assert_eq!(phone.state(), PhoneState::Ringing);
        assert_eq!(phone.caller_id(), Some("ringing"));

        phone.handle_payload(b"offhook").unwrap();
        assert_eq!(phone.state(), PhoneState::Offhook);
        assert_eq!(phone.caller_id(), None);

        let outcome = phone.handle_payload(b"busy").unwrap();
        assert_eq!(phone.state(), PhoneState::Offhook);
        assert_eq!(phone.caller_id(), Some("busy"));
        assert_eq!(
            outcome,
            PayloadOutcome::Unrecognized {
                caller_info_changed: true
            }
        );
    }

    #[test]
    fn test_unrecognized_payload_keeps_state() {
        let mut phone = with_state_topic();
        phone.handle_payload(b"ringing").unwrap();

        let outcome = phone.handle_payload(b"RINGING").unwrap();
        assert_eq!(
            outcome,
            PayloadOutcome::Unrecognized {
                caller_info_changed: false
            }
        );
        assert!(!outcome.should_report());
        assert_eq!(phone.state(), PhoneState::Ringing);
    }

    #[test]
    fn test_invalid_utf8_ignored() {
        let mut phone = with_state_topic();
        phone.handle_payload(b"idle").unwrap();

        assert!(phone.handle_payload(&[0xff, 0xfe]).is_err());
        assert_eq!(phone.state(), PhoneState::Idle);
    }

    #[test]
    fn test_json_templates() {
        let mut phone = phone(
            r#"
            state_topic = "voip/hallway/state"
            command_topic = "voip/hallway/dial"
            value_template = "{{ value_json.state | lower }}"
            callerid_template = "{{ value_json.from }}"
            callername_template = "{{ value_json.name | default('Unknown') }}"
            "#,
        );

        phone
            .handle_payload(br#"{"state": "RINGING", "from": "5551234", "name": "Alice"}"#)
            .unwrap();
        assert_eq!(phone.state(), PhoneState::Ringing);
        assert_eq!(phone.caller_id(), Some("5551234"));
        assert_eq!(phone.caller_name(), Some("Alice"));

        let attrs = phone.snapshot().attributes();
        assert_eq!(attrs["callerid"], "5551234");
        assert_eq!(attrs["callername"], "Alice");

        phone
            .handle_payload(br#"{"state": "OFFHOOK", "from": "5551234"}"#)
            .unwrap();
        assert_eq!(phone.state(), PhoneState::Offhook);
        assert_eq!(phone.caller_id(), None);
        assert_eq!(phone.caller_name(), None);
        assert!(phone.snapshot().attributes().is_empty());
    }

    #[test]
    fn test_template_failure_uses_raw_payload() {
        let mut phone = phone(
            r#"
            state_topic = "voip/hallway/state"
            command_topic = "voip/hallway/dial"
            value_template = "{{ value_json.state }}"
            "#,
        );

        // Not JSON: the template fails and the raw payload is matched instead
        phone.handle_payload(b"ringing").unwrap();
        assert_eq!(phone.state(), PhoneState::Ringing);
    }

    #[test]
    fn test_custom_payload_literals() {
        let mut phone = phone(
            r#"
            state_topic = "voip/hallway/state"
            command_topic = "voip/hallway/dial"
            payload_idle = "ON_HOOK"
            payload_ringing = "INCOMING"
            payload_offhook = "CONNECTED"
            "#,
        );

        phone.handle_payload(b"INCOMING").unwrap();
        assert_eq!(phone.state(), PhoneState::Ringing);
        phone.handle_payload(b"CONNECTED").unwrap();
        assert_eq!(phone.state(), PhoneState::Offhook);
        phone.handle_payload(b"ON_HOOK").unwrap();
        assert_eq!(phone.state(), PhoneState::Idle);

        // The default literals mean nothing here
        phone.handle_payload(b"ringing").unwrap();
        assert_eq!(phone.state(), PhoneState::Idle);
    }

    #[test]
    fn test_wildcard_state_topic() {
        let phone = phone(
            r#"
            state_topic = "voip/+/state"
            command_topic = "voip/hallway/dial"
            "#,
        );
        assert!(phone.listens_on("voip/hallway/state"));
        assert!(!phone.listens_on("voip/hallway/dial"));
    }

    #[test]
    fn test_call_publishes_destination() {
        let mut phone = phone(
            r#"
            state_topic = "voip/hallway/state"
            command_topic = "voip/hallway/dial"
            qos = 1
            retain = true
            "#,
        );

        let command = phone.call("5551234").unwrap();
        assert_eq!(
            command,
            OutboundMessage {
                topic: "voip/hallway/dial".to_string(),
                payload: b"5551234".to_vec(),
                qos: Qos::AtLeastOnce,
                retain: true,
            }
        );
        // Not optimistic: the state waits for the gateway
        assert_eq!(phone.state(), PhoneState::Unknown);
    }

    #[test]
    fn test_call_with_command_template() {
        let mut phone = phone(
            r#"
            state_topic = "voip/hallway/state"
            command_topic = "voip/hallway/dial"
            command_template = "{\"action\": \"dial\", \"number\": \"{{ value }}\"}"
            "#,
        );

        let command = phone.call("5551234").unwrap();
        assert_eq!(
            String::from_utf8(command.payload).unwrap(),
            r#"{"action": "dial", "number": "5551234"}"#
        );
    }

    #[test]
    fn test_optimistic_call_goes_offhook() {
        let mut phone = phone(
            r#"
            command_topic = "voip/hallway/dial"
            callerid_template = "{{ value }}"
            "#,
        );
        assert_eq!(phone.state(), PhoneState::Unknown);

        phone.call("5551234").unwrap();
        assert_eq!(phone.state(), PhoneState::Offhook);
        assert_eq!(phone.caller_id(), None);
    }

    #[test]
    fn test_explicit_optimistic_with_state_topic() {
        let mut phone = phone(
            r#"
            state_topic = "voip/hallway/state"
            command_topic = "voip/hallway/dial"
            optimistic = true
            "#,
        );
        phone.handle_payload(b"idle").unwrap();
        phone.call("1").unwrap();
        assert_eq!(phone.state(), PhoneState::Offhook);
    }

    #[test]
    fn test_snapshot_json() {
        let mut phone = phone(
            r#"
            state_topic = "voip/hallway/state"
            command_topic = "voip/hallway/dial"
            callerid_template = "{{ value_json.from }}"
            value_template = "{{ value_json.state }}"
            "#,
        );
        phone
            .handle_payload(br#"{"state": "ringing", "from": "5551234"}"#)
            .unwrap();

        let snapshot = phone.snapshot();
        assert_eq!(
            serde_json::json!({
                "state": snapshot.state,
                "attributes": snapshot.attributes(),
                "supported_features": snapshot.supported_features.bits(),
            }),
            serde_json::json!({
                "state": "ringing",
                "attributes": {"callerid": "5551234"},
                "supported_features": 27,
            })
        );
    }

    #[test]
    fn test_tokens_distinct_per_phone() {
        let a = with_state_topic();
        let b = with_state_topic();
        assert_eq!(a.access_token().len(), 64);
        assert_ne!(a.access_token(), b.access_token());
    }
}
