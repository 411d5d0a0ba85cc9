//! The `phone.call_number` service.
//!
//! Service data is validated here before anything is dispatched to a device.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

use super::ATTR_DESTINATION;
use super::DOMAIN;
use super::SERVICE_CALL;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid service data: {0}")]
    Invalid(String),

    #[error("invalid entity id '{0}', expected phone.<object_id>")]
    InvalidEntityId(String),

    #[error("destination_number must not be empty")]
    EmptyDestination,

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("failed to dispatch to {entity_id}: {reason}")]
    Dispatch { entity_id: String, reason: String },
}

/// Validated data for a `call_number` service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceCall {
    /// Target phones. `None` targets every phone.
    pub entity_ids: Option<Vec<String>>,

    pub destination: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlaceCall {
    #[serde(default)]
    entity_id: Option<EntityIdsInput>,

    #[serde(deserialize_with = "deserialize_string_or_number")]
    destination_number: String,
}

/// Entity ids may be given as a single id, a comma separated list, or an array.
#[derive(Deserialize)]
#[serde(untagged)]
enum EntityIdsInput {
    One(String),
    Many(Vec<String>),
}

impl PlaceCall {
    /// Validate raw service data.
    pub fn from_service_data(data: serde_json::Value) -> Result<Self, ServiceError> {
        let raw: RawPlaceCall =
            serde_json::from_value(data).map_err(|e| ServiceError::Invalid(e.to_string()))?;

        let destination = raw.destination_number.trim().to_string();
        if destination.is_empty() {
            return Err(ServiceError::EmptyDestination);
        }

        let entity_ids = raw.entity_id.map(parse_entity_ids).transpose()?;

        Ok(Self {
            entity_ids,
            destination,
        })
    }

    pub fn new(entity_ids: Option<Vec<String>>, destination: impl Into<String>) -> Self {
        Self {
            entity_ids,
            destination: destination.into(),
        }
    }
}

fn parse_entity_ids(input: EntityIdsInput) -> Result<Vec<String>, ServiceError> {
    let ids: Vec<String> = match input {
        EntityIdsInput::One(s) => s.split(',').map(str::to_string).collect(),
        EntityIdsInput::Many(v) => v,
    };

    ids.into_iter()
        .map(|id| {
            let id = id.trim().to_lowercase();
            if is_valid_entity_id(&id) {
                Ok(id)
            } else {
                Err(ServiceError::InvalidEntityId(id))
            }
        })
        .collect()
}

/// Whether `id` is a phone entity id, i.e. `phone.<object_id>`.
pub fn is_valid_entity_id(id: &str) -> bool {
    id.strip_prefix(DOMAIN)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(is_valid_object_id)
}

/// Object ids are lowercase ASCII letters, digits and underscores.
pub fn is_valid_object_id(object_id: &str) -> bool {
    !object_id.is_empty()
        && object_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Deserialize a string, accepting numbers as their decimal representation.
fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrNumber;

    impl serde::de::Visitor<'_> for StringOrNumber {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a number")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

/// Description of a service field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDescription {
    pub description: &'static str,
    pub example: &'static str,
    pub required: bool,
}

/// Description of a service, as exposed by the API.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescription {
    pub domain: &'static str,
    pub service: &'static str,
    pub description: &'static str,
    pub fields: BTreeMap<&'static str, FieldDescription>,
}

pub fn describe_services() -> Vec<ServiceDescription> {
    vec![ServiceDescription {
        domain: DOMAIN,
        service: SERVICE_CALL,
        description: "Place a call using a phone.",
        fields: BTreeMap::from([
            (
                "entity_id",
                FieldDescription {
                    description: "Phone(s) to call from. Defaults to every phone.",
                    example: "phone.hallway",
                    required: false,
                },
            ),
            (
                ATTR_DESTINATION,
                FieldDescription {
                    description: "Number to dial.",
                    example: "5551234",
                    required: true,
                },
            ),
        ]),
    }]
}
