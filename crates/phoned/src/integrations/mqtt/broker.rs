use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::ClientError;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::client::MqttClient;
use super::client::MqttMessage;
use super::config::Qos;
use super::MqttConfig;

impl From<Qos> for QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => QoS::AtMostOnce,
            Qos::AtLeastOnce => QoS::AtLeastOnce,
            Qos::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

fn not_connected() -> Box<dyn Error + Send> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "MQTT client not connected. Call connect() first.",
    ))
}

/// Real MQTT client implementation using rumqttc
pub struct RumqttcClient {
    /// MQTT connection options (stored for lazy initialization)
    mqtt_options: MqttOptions,

    /// AsyncClient (created in connect())
    client: Option<AsyncClient>,

    /// Message receiver (created in connect())
    message_rx: Option<mpsc::UnboundedReceiver<MqttMessage>>,

    /// Background event loop task handle
    event_loop_task: Option<JoinHandle<()>>,
}

impl RumqttcClient {
    /// Create a new RumqttcClient from configuration
    pub fn new(config: &MqttConfig) -> anyhow::Result<Self> {
        if config.broker.is_empty() {
            anyhow::bail!("MQTT broker address is empty");
        }

        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);

        mqtt_options.set_keep_alive(Duration::from_secs(30));

        match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                mqtt_options.set_credentials(username, password);
            }
            (Some(username), None) => {
                mqtt_options.set_credentials(username, "");
            }
            _ => {}
        }

        Ok(Self {
            mqtt_options,
            client: None,
            message_rx: None,
            event_loop_task: None,
        })
    }
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        // Create client and event loop
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options.clone(), 10);

        let (message_tx, message_rx) = mpsc::unbounded_channel();

        // Spawn background task to poll event loop
        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = MqttMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                        };

                        // Send to channel; if receiver dropped, exit
                        if message_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        tracing::info!("MQTT broker closed the connection");
                    }
                    Ok(_) => {
                        // Ignore other events (connack, puback, etc.)
                    }
                    Err(e) => {
                        tracing::warn!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            tracing::info!("MQTT event loop task exiting");
        });

        self.client = Some(client);
        self.message_rx = Some(message_rx);
        self.event_loop_task = Some(task);

        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<(), Box<dyn Error + Send>> {
        let client = self.client.as_ref().ok_or_else(not_connected)?;

        client
            .subscribe(topic, qos.into())
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;

        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        retain: bool,
    ) -> Result<(), Box<dyn Error + Send>> {
        let client = self.client.as_ref().ok_or_else(not_connected)?;

        // Never wait for room in the request queue; a full queue drops the
        // publish
        client
            .try_publish(topic, qos.into(), retain, payload)
            .map_err(|e| {
                if let ClientError::TryRequest(_) = e {
                    tracing::warn!("MQTT request queue full, dropping publish to {}", topic);
                }
                Box::new(e) as Box<dyn Error + Send>
            })
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        match &mut self.message_rx {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    async fn disconnect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        if let Some(client) = self.client.take() {
            client
                .disconnect()
                .await
                .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;
        }
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
        self.message_rx = None;
        Ok(())
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> MqttConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(QoS::from(Qos::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(QoS::from(Qos::AtLeastOnce), QoS::AtLeastOnce);
        assert_eq!(QoS::from(Qos::ExactlyOnce), QoS::ExactlyOnce);
    }

    #[test]
    fn test_new_rejects_empty_broker() {
        assert!(RumqttcClient::new(&config(r#"broker = """#)).is_err());
    }

    #[tokio::test]
    async fn test_requires_connect() {
        let mut client = RumqttcClient::new(&config(r#"broker = "localhost""#)).unwrap();
        assert!(client.subscribe("voip/state", Qos::AtMostOnce).await.is_err());
        assert!(client
            .publish("voip/dial", b"5551234", Qos::AtMostOnce, false)
            .await
            .is_err());
        assert!(client.poll_message().await.is_none());
        assert!(client.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_does_not_wait_for_unreachable_broker() {
        let mut client = RumqttcClient::new(&config(
            r#"
            broker = "127.0.0.1"
            port = 1
            "#,
        ))
        .unwrap();
        client.connect().await.unwrap();

        // More publishes than the request queue holds
        let publishes = async {
            for _ in 0..25 {
                let _ = client
                    .publish("voip/dial", b"5551234", Qos::AtLeastOnce, false)
                    .await;
            }
        };
        assert!(tokio::time::timeout(Duration::from_secs(2), publishes)
            .await
            .is_ok());
    }
}
