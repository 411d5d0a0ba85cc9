use super::state::PhoneSnapshot;

/// Engine-level events.
///
/// Distinct from `FromIntegrationMessage` (transport-level). The engine converts
/// `FromIntegrationMessage` into `Event` at the boundary after updating `State`.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PhoneAdded {
        entity_id: String,
        snapshot: PhoneSnapshot,
    },
    PhoneStateChanged {
        entity_id: String,
        snapshot: PhoneSnapshot,
    },
    PhoneRemoved {
        entity_id: String,
    },
}
