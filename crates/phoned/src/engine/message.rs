//! Type-safe message system for phoned
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use super::state::PhoneSnapshot;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// An entity was set up and registered
    EntityDiscovered {
        entity_id: String,
        integration_name: String,
        snapshot: PhoneSnapshot,
    },

    /// An entity was removed (integration teardown, etc.)
    EntityRemoved { entity_id: String },

    /// A phone's observable state changed
    PhoneStateChanged {
        entity_id: String,
        snapshot: PhoneSnapshot,
    },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToIntegrationMessage {
    /// Place a call from a phone
    PhoneCall {
        entity_id: String,
        destination: String,
    },
}

impl ToIntegrationMessage {
    /// The entity this command is addressed to.
    pub fn entity_id(&self) -> &str {
        match self {
            ToIntegrationMessage::PhoneCall { entity_id, .. } => entity_id,
        }
    }
}
