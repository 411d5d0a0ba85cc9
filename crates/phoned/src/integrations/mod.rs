//! Integrations bridging external systems to the engine.
//!
//! Each integration registers a factory in `engine::INTEGRATION_REGISTRY`
//! and is only started when its configuration section is present.

pub mod mqtt;
