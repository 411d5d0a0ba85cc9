use std::error::Error;

use async_trait::async_trait;

use super::config::Qos;

/// MQTT message received from a subscription
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Trait for MQTT client operations
///
/// This trait allows for mocking the MQTT client for testing purposes
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Connect to the MQTT broker
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>>;

    /// Subscribe to an MQTT topic filter
    async fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<(), Box<dyn Error + Send>>;

    /// Publish a message to an MQTT topic without waiting for delivery
    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        retain: bool,
    ) -> Result<(), Box<dyn Error + Send>>;

    /// Poll for the next message from subscribed topics
    ///
    /// Returns None if no message is available or if the client should stop
    async fn poll_message(&mut self) -> Option<MqttMessage>;

    /// Disconnect from the broker
    async fn disconnect(&mut self) -> Result<(), Box<dyn Error + Send>>;
}

/// Mock MQTT client for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockMqttClient {
    pub messages: std::collections::VecDeque<MqttMessage>,
    pub subscriptions: Vec<(String, Qos)>,
    pub published: Vec<(String, Vec<u8>, Qos, bool)>,
    pub is_connected: bool,
    /// Make every publish fail, as a broker connection loss would
    pub fail_publish: bool,
}

#[cfg(test)]
#[async_trait]
impl MqttClient for MockMqttClient {
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        self.is_connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<(), Box<dyn Error + Send>> {
        self.subscriptions.push((topic.to_string(), qos));
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        retain: bool,
    ) -> Result<(), Box<dyn Error + Send>> {
        if self.fail_publish {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "mock broker unavailable",
            )));
        }
        self.published
            .push((topic.to_string(), payload.to_vec(), qos, retain));
        Ok(())
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        let msg = self.messages.pop_front();
        if msg.is_none() {
            // Stand in for network latency so pollers don't spin
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        msg
    }

    async fn disconnect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        self.is_connected = false;
        Ok(())
    }
}

#[cfg(test)]
impl MockMqttClient {
    /// Create a new mock MQTT client
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for delivery to the subscriber
    pub fn add_message(&mut self, topic: &str, payload: &[u8]) {
        self.messages.push_back(MqttMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }
}
