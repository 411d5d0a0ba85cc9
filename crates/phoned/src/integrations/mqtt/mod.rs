#[cfg(feature = "integration_mqtt")]
mod broker;
mod client;
pub mod config;
#[allow(clippy::module_inception)]
mod mqtt;
mod phone;
pub mod topic;

#[cfg(test)]
pub use client::MockMqttClient;
pub use client::MqttClient;
pub use client::MqttMessage;
pub use config::Config as MqttConfig;
pub use mqtt::MqttIntegration;
pub use phone::MqttPhone;
pub use phone::OutboundMessage;
pub use phone::PayloadOutcome;

#[cfg(feature = "integration_mqtt")]
mod registration {
    use anyhow::Context;
    use linkme::distributed_slice;

    use super::broker::RumqttcClient;
    use super::MqttIntegration;
    use crate::engine;

    #[distributed_slice(engine::INTEGRATION_REGISTRY)]
    fn init_mqtt(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
        let mqtt_config = if let Some(c) = &ctx.config.integrations.mqtt {
            c
        } else {
            return Ok(None);
        };

        let client = RumqttcClient::new(mqtt_config).context("Failed to create MQTT client")?;
        Ok(Some(Box::new(MqttIntegration::new(client, mqtt_config))))
    }
}
