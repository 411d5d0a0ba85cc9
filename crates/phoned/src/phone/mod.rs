//! The phone entity domain.
//!
//! A phone mirrors the state of a telephony device (idle, ringing, off-hook),
//! exposes the caller id of the current call and can be asked to place a call.

mod device;
mod features;
pub mod service;
mod token;

pub use device::PhoneDevice;
pub use device::PhoneError;
pub use features::PhoneFeature;
pub use features::SupportedFeatures;
pub use service::PlaceCall;
pub use service::ServiceError;
pub use token::AccessToken;

pub const DOMAIN: &str = "phone";

pub const SERVICE_CALL: &str = "call_number";

pub const ATTR_DESTINATION: &str = "destination_number";
pub const ATTR_CALLER_ID: &str = "callerid";
pub const ATTR_CALLER_NAME: &str = "callername";

/// Build the entity id for a phone object id, e.g. `phone.hallway`.
pub fn entity_id(object_id: &str) -> String {
    format!("{}.{}", DOMAIN, object_id)
}
