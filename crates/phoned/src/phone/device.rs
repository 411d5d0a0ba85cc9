use super::features::PhoneFeature;
use super::features::SupportedFeatures;
use super::token::AccessToken;
use crate::engine::Entity;
use crate::engine::PhoneSnapshot;
use crate::engine::PhoneState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhoneError {
    #[error("{entity_id} does not support {operation}")]
    Unsupported {
        entity_id: String,
        operation: &'static str,
    },

    #[error("failed to build call command for {entity_id}: {reason}")]
    Command { entity_id: String, reason: String },
}

/// Capability interface for phone devices.
///
/// Everything except the access token has a default, so a device only
/// overrides what it actually supports. In particular `call` fails with
/// [`PhoneError::Unsupported`] unless the device provides it.
pub trait PhoneDevice: Entity {
    /// What `call` hands back to the owning integration to put on the wire.
    type Command;

    fn state(&self) -> PhoneState {
        PhoneState::Unknown
    }

    /// Caller id when the phone is ringing or off-hook
    fn caller_id(&self) -> Option<&str> {
        None
    }

    /// Caller name when the phone is ringing or off-hook
    fn caller_name(&self) -> Option<&str> {
        None
    }

    fn supported_features(&self) -> SupportedFeatures {
        SupportedFeatures::empty()
    }

    /// Storage for the entity's access token.
    fn token(&self) -> &AccessToken;

    /// Place a call to `destination`.
    fn call(&mut self, destination: &str) -> Result<Self::Command, PhoneError> {
        let _ = destination;
        Err(PhoneError::Unsupported {
            entity_id: self.entity_id().to_string(),
            operation: "call",
        })
    }

    fn access_token(&self) -> &str {
        self.token().get()
    }

    fn support_call(&self) -> bool {
        self.supported_features().contains(PhoneFeature::Call)
    }

    fn support_dial_event(&self) -> bool {
        self.supported_features().contains(PhoneFeature::DialEvent)
    }

    fn support_vm(&self) -> bool {
        self.supported_features().contains(PhoneFeature::Voicemail)
    }

    fn support_call_end(&self) -> bool {
        self.supported_features().contains(PhoneFeature::CallEnd)
    }

    fn support_call_fail(&self) -> bool {
        self.supported_features().contains(PhoneFeature::CallFail)
    }

    fn support_sms(&self) -> bool {
        self.supported_features().contains(PhoneFeature::Sms)
    }

    fn snapshot(&self) -> PhoneSnapshot {
        PhoneSnapshot {
            name: self.name().to_string(),
            state: self.state(),
            caller_id: self.caller_id().map(str::to_string),
            caller_name: self.caller_name().map(str::to_string),
            supported_features: self.supported_features(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A device that relies on every default.
    struct BarePhone {
        token: AccessToken,
    }

    impl Entity for BarePhone {
        fn entity_id(&self) -> &str {
            "phone.bare"
        }

        fn name(&self) -> &str {
            "Bare"
        }
    }

    impl PhoneDevice for BarePhone {
        type Command = ();

        fn token(&self) -> &AccessToken {
            &self.token
        }
    }

    fn bare() -> BarePhone {
        BarePhone {
            token: AccessToken::new(),
        }
    }

    #[test]
    fn test_defaults() {
        let phone = bare();
        assert_eq!(phone.state(), PhoneState::Unknown);
        assert_eq!(phone.caller_id(), None);
        assert_eq!(phone.caller_name(), None);
        assert!(phone.supported_features().is_empty());
        assert!(!phone.support_call());
        assert!(!phone.support_dial_event());
        assert!(!phone.support_vm());
        assert!(!phone.support_call_end());
        assert!(!phone.support_call_fail());
        assert!(!phone.support_sms());
    }

    #[test]
    fn test_call_is_unsupported_by_default() {
        let mut phone = bare();
        let err = phone.call("5551234").unwrap_err();
        assert_eq!(
            err,
            PhoneError::Unsupported {
                entity_id: "phone.bare".to_string(),
                operation: "call",
            }
        );
        assert_eq!(err.to_string(), "phone.bare does not support call");
    }

    #[test]
    fn test_access_token_stable() {
        let phone = bare();
        let first = phone.access_token().to_string();
        assert_eq!(phone.access_token(), first);
    }

    #[test]
    fn test_snapshot() {
        let phone = bare();
        let snapshot = phone.snapshot();
        assert_eq!(snapshot.name, "Bare");
        assert_eq!(snapshot.state, PhoneState::Unknown);
        assert!(snapshot.attributes().is_empty());
    }
}
