use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::MqttClient;
use super::client::MqttMessage;
use super::phone::MqttPhone;
use super::MqttConfig;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;
use crate::phone::PhoneDevice;

/// Type alias for the shared phones map, keyed by entity id
type PhonesMap = Arc<BTreeMap<String, Arc<Mutex<MqttPhone>>>>;

/// MQTT Integration for phoned
///
/// Bridges the phones configured under `[integrations.mqtt.phones]`: state
/// reports arrive on each phone's state topic and dial commands go out on
/// its command topic.
pub struct MqttIntegration<C: MqttClient> {
    client: Arc<Mutex<C>>,
    config: MqttConfig,
    phones: PhonesMap,
    to_engine: Option<FromIntegrationSender>,
    /// Handle to the background message processing task
    message_task: Option<JoinHandle<()>>,
}

impl<C: MqttClient> MqttIntegration<C> {
    /// Create a new MQTT integration
    pub fn new(client: C, config: &MqttConfig) -> Self {
        let phones = config
            .phones
            .iter()
            .map(|(object_id, phone_config)| {
                let phone = MqttPhone::from_config(object_id, phone_config);
                (phone.entity_id().to_string(), Arc::new(Mutex::new(phone)))
            })
            .collect();

        Self {
            client: Arc::new(Mutex::new(client)),
            config: config.clone(),
            phones: Arc::new(phones),
            to_engine: None,
            message_task: None,
        }
    }

    /// Process incoming MQTT messages in a background task
    ///
    /// This is spawned as a separate tokio task in setup() so that
    /// handle_message() can process commands concurrently.
    async fn process_messages_task(
        client: Arc<Mutex<C>>,
        phones: PhonesMap,
        to_engine: FromIntegrationSender,
    ) {
        loop {
            // Poll for message with a short lock hold time so publishes from
            // handle_message() are not starved
            let msg = {
                let mut client_guard = client.lock().await;
                tokio::time::timeout(
                    std::time::Duration::from_millis(100),
                    client_guard.poll_message(),
                )
                .await
                .unwrap_or_default()
            };

            match msg {
                Some(msg) => {
                    debug!("Received message on topic: {}", msg.topic);
                    Self::handle_state_update_static(&msg, &phones, &to_engine).await;
                }
                None => {
                    // No message available, yield to allow other tasks (like command handling)
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// Apply a state report to every phone listening on its topic
    async fn handle_state_update_static(
        msg: &MqttMessage,
        phones: &PhonesMap,
        to_engine: &FromIntegrationSender,
    ) {
        let mut matched = false;

        for (entity_id, phone_arc) in phones.iter() {
            let mut phone = phone_arc.lock().await;
            if !phone.listens_on(&msg.topic) {
                continue;
            }
            matched = true;

            let outcome = match phone.handle_payload(&msg.payload) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        "Ignoring non UTF-8 payload for {} on {}: {}",
                        entity_id, msg.topic, e
                    );
                    continue;
                }
            };

            // Report under the phone lock so reports reach the engine in
            // the order the phone changed
            if outcome.should_report() {
                Self::report_state_change_static(entity_id, phone.snapshot(), to_engine).await;
            }
        }

        if !matched {
            debug!("No phone listens on topic {}", msg.topic);
        }
    }

    /// Register an entity with the engine (static version)
    async fn register_entity_static(phone: &MqttPhone, to_engine: &FromIntegrationSender) {
        let msg = FromIntegrationMessage::EntityDiscovered {
            entity_id: phone.entity_id().to_string(),
            integration_name: "mqtt".to_string(),
            snapshot: phone.snapshot(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send EntityDiscovered message: {}", e);
        } else {
            info!("Registered entity: {}", phone.entity_id());
        }
    }

    /// Notify the engine that an entity has been removed (static version)
    async fn notify_entity_removed_static(entity_id: &str, to_engine: &FromIntegrationSender) {
        let msg = FromIntegrationMessage::EntityRemoved {
            entity_id: entity_id.to_string(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send EntityRemoved message: {}", e);
        } else {
            info!("Notified engine of entity removal: {}", entity_id);
        }
    }

    /// Report a state change to the engine (static version)
    async fn report_state_change_static(
        entity_id: &str,
        snapshot: crate::engine::PhoneSnapshot,
        to_engine: &FromIntegrationSender,
    ) {
        let msg = FromIntegrationMessage::PhoneStateChanged {
            entity_id: entity_id.to_string(),
            snapshot,
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send PhoneStateChanged message: {}", e);
        }
    }

    /// Place a call from a phone
    ///
    /// An optimistic phone reports its new state before the command is
    /// published. A failed publish is logged and not retried; the call still
    /// counts as placed for an optimistic phone.
    pub async fn place_call(
        &self,
        entity_id: &str,
        destination: &str,
    ) -> Result<(), Box<dyn Error + Send>> {
        let phone_arc = self
            .phones
            .get(entity_id)
            .ok_or_else(|| -> Box<dyn Error + Send> {
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Phone not found: {}", entity_id),
                ))
            })?
            .clone();

        let command = {
            let mut phone = phone_arc.lock().await;
            let command = phone
                .call(destination)
                .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;
            if let (true, Some(to_engine)) = (phone.optimistic(), &self.to_engine) {
                Self::report_state_change_static(entity_id, phone.snapshot(), to_engine).await;
            }
            command
        };

        {
            let mut client = self.client.lock().await;
            match client
                .publish(&command.topic, &command.payload, command.qos, command.retain)
                .await
            {
                Ok(()) => info!("Sent call command for {} to {}", entity_id, command.topic),
                Err(e) => warn!("Failed to publish call command for {}: {}", entity_id, e),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<C: MqttClient + 'static> Integration for MqttIntegration<C> {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        // Store sender for sending events to engine
        self.to_engine = Some(tx.clone());

        info!(
            "Connecting to MQTT broker at {}:{}",
            self.config.broker, self.config.port
        );
        {
            let mut client = self.client.lock().await;
            client.connect().await?;
        }
        info!("Connected to MQTT broker");

        for phone_arc in self.phones.values() {
            let phone = phone_arc.lock().await;

            // Register before subscribing so the retained state report finds
            // the phone already known to the engine
            Self::register_entity_static(&phone, &tx).await;

            match phone.state_topic() {
                Some(topic) => {
                    info!("Subscribing to {} for {}", topic, phone.entity_id());
                    let mut client = self.client.lock().await;
                    client.subscribe(topic, phone.qos()).await?;
                }
                None => info!(
                    "{} has no state topic, running in optimistic mode",
                    phone.entity_id()
                ),
            }
        }

        // Clone shared state for the background task
        let client = self.client.clone();
        let phones = self.phones.clone();

        let task = tokio::spawn(async move {
            Self::process_messages_task(client, phones, tx).await;
        });
        self.message_task = Some(task);

        info!("MQTT integration ready with {} phone(s)", self.phones.len());
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::PhoneCall {
                entity_id,
                destination,
            } => {
                info!("Placing call from {} to {}", entity_id, destination);
                self.place_call(&entity_id, &destination).await?;
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("MQTT integration shutting down");

        if let Some(task) = self.message_task.take() {
            task.abort();
        }

        if let Some(to_engine) = &self.to_engine {
            for entity_id in self.phones.keys() {
                Self::notify_entity_removed_static(entity_id, to_engine).await;
            }
        }

        let mut client = self.client.lock().await;
        client.disconnect().await
    }
}
