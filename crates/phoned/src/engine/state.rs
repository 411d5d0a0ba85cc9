use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;

use crate::phone::SupportedFeatures;
use crate::phone::ATTR_CALLER_ID;
use crate::phone::ATTR_CALLER_NAME;

/// State of a phone line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PhoneState {
    /// No report has been received from the device yet.
    #[default]
    Unknown,
    Idle,
    Ringing,
    Offhook,
}

/// Externally observable view of a phone entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PhoneSnapshot {
    /// Human-readable name
    pub name: String,

    pub state: PhoneState,

    /// Caller id, when ringing or off-hook.
    pub caller_id: Option<String>,

    /// Caller name, when ringing or off-hook.
    pub caller_name: Option<String>,

    pub supported_features: SupportedFeatures,
}

impl PhoneSnapshot {
    /// State attributes reported to presentation layers.
    ///
    /// Only attributes with a value are included.
    pub fn attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut attrs = serde_json::Map::new();
        if let Some(caller_id) = &self.caller_id {
            attrs.insert(ATTR_CALLER_ID.to_string(), caller_id.clone().into());
        }
        if let Some(caller_name) = &self.caller_name {
            attrs.insert(ATTR_CALLER_NAME.to_string(), caller_name.clone().into());
        }
        attrs
    }
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub phones: BTreeMap<String, PhoneSnapshot>,
}

impl State {
    /// Whether a phone is ringing.
    ///
    /// With an entity id only that phone is checked, otherwise any phone counts.
    pub fn is_ringing(&self, entity_id: Option<&str>) -> bool {
        match entity_id {
            Some(id) => self
                .phones
                .get(id)
                .is_some_and(|p| p.state == PhoneState::Ringing),
            None => self
                .phones
                .values()
                .any(|p| p.state == PhoneState::Ringing),
        }
    }
}
