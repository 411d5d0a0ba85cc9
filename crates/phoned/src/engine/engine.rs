use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::event::Event;
use super::integration::boxed;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::IntegrationContext;
use super::integration::IntegrationResult;
use super::integration::ToIntegrationSender;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::State;
use crate::phone::PlaceCall;
use crate::phone::ServiceError;

/// phoned engine
///
/// This structure handles the flow of events between integrations and the
/// outside world: it routes service calls to the integration owning each
/// phone and maintains a view of every phone with `State`.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Fan-out of state changes to observers
    events: broadcast::Sender<Event>,

    /// Handles for integration tasks
    integration_handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

/// Events kept for slow observers before they start lagging
const EVENT_CHANNEL_SIZE: usize = 256;

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            events,
            integration_handles: Mutex::new(Vec::new()),
        }
    }

    /// Register integrations from configuration
    ///
    /// Runs every compiled-in integration factory against the config and
    /// registers those that are configured. Returns how many were registered.
    pub async fn register_integrations_from_config(&self, cfg: &crate::config::Config) -> usize {
        let ctx = IntegrationContext { config: cfg };
        let mut registered = 0;
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration).await;
            registered += 1;
        }
        registered
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub async fn register_integration(&self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        if let Ok(mut channels) = self.integration_channels.lock() {
            channels.insert(name.clone(), to_integration_tx);
        }

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine until the engine drops our channel
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        self.integration_handles.lock().await.push(handle);
    }

    /// Send a command to an integration
    ///
    /// Routes the command to the appropriate integration based on entity_id.
    pub fn send_command(&self, msg: ToIntegrationMessage) -> IntegrationResult {
        let entity_id = msg.entity_id().to_string();

        let integration_name = self
            .entity_integration_map
            .lock()
            .map_err(|e| boxed(std::io::Error::other(e.to_string())))?
            .get(&entity_id)
            .cloned()
            .ok_or_else(|| {
                boxed(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("No integration found for entity: {}", entity_id),
                ))
            })?;

        let channels = self
            .integration_channels
            .lock()
            .map_err(|e| boxed(std::io::Error::other(e.to_string())))?;

        let tx = channels.get(&integration_name).ok_or_else(|| {
            boxed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Integration channel not found: {}", integration_name),
            ))
        })?;

        tx.send(msg).map_err(boxed)
    }

    /// Dispatch a `phone.call_number` service call.
    ///
    /// Every target is checked before anything is sent, so an unknown entity
    /// id rejects the whole call. Returns the entity ids a command was sent to.
    pub fn call_service(&self, call: &PlaceCall) -> Result<Vec<String>, ServiceError> {
        let targets = {
            let map = self
                .entity_integration_map
                .lock()
                .map_err(|e| ServiceError::Invalid(e.to_string()))?;

            match &call.entity_ids {
                Some(ids) => {
                    if let Some(unknown) = ids.iter().find(|id| !map.contains_key(*id)) {
                        return Err(ServiceError::UnknownEntity(unknown.clone()));
                    }
                    ids.clone()
                }
                None => {
                    let mut all: Vec<String> = map.keys().cloned().collect();
                    all.sort();
                    all
                }
            }
        };

        for entity_id in &targets {
            debug!("Dispatching call to {} from {}", call.destination, entity_id);
            self.send_command(ToIntegrationMessage::PhoneCall {
                entity_id: entity_id.clone(),
                destination: call.destination.clone(),
            })
            .map_err(|e| ServiceError::Dispatch {
                entity_id: entity_id.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(targets)
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) -> IntegrationResult {
        info!("Engine starting");

        // Main event loop - only receives FromIntegration messages
        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Stop every integration and wait for their shutdown to finish.
    ///
    /// Dropping the command channels ends each integration's command loop,
    /// which then runs the integration's own shutdown.
    pub async fn shutdown(&self) {
        if let Ok(mut channels) = self.integration_channels.lock() {
            channels.clear();
        }

        let handles: Vec<JoinHandle<()>> = self.integration_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Integration task failed: {}", e);
            }
        }
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Whether the given phone, or any phone, is ringing.
    pub fn is_ringing(&self, entity_id: Option<&str>) -> bool {
        self.state.load().is_ringing(entity_id)
    }

    fn update_state(&self, f: impl FnOnce(&mut State)) {
        let mut state = State::clone(&self.state.load());
        f(&mut state);
        self.state.store(Arc::new(state));
    }

    fn publish(&self, event: Event) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
                snapshot,
            } => {
                info!(
                    "Entity discovered: {} (from {})",
                    entity_id, integration_name
                );

                // Record which integration owns this entity for command routing.
                if let Ok(mut map) = self.entity_integration_map.lock() {
                    map.insert(entity_id.clone(), integration_name);
                }

                self.update_state(|state| {
                    state.phones.insert(entity_id.clone(), snapshot.clone());
                });

                self.publish(Event::PhoneAdded {
                    entity_id,
                    snapshot,
                });
            }
            FromIntegrationMessage::EntityRemoved { entity_id } => {
                info!("Entity removed: {}", entity_id);

                self.update_state(|state| {
                    state.phones.remove(&entity_id);
                });

                // Remove from routing map
                if let Ok(mut map) = self.entity_integration_map.lock() {
                    map.remove(&entity_id);
                }

                self.publish(Event::PhoneRemoved { entity_id });
            }
            FromIntegrationMessage::PhoneStateChanged {
                entity_id,
                snapshot,
            } => {
                if !self.state.load().phones.contains_key(&entity_id) {
                    warn!("State change for unregistered phone {}, ignoring", entity_id);
                    return;
                }

                info!(
                    "Phone state changed: {} -> {} (callerid={:?})",
                    entity_id, snapshot.state, snapshot.caller_id
                );

                self.update_state(|state| {
                    state.phones.insert(entity_id.clone(), snapshot.clone());
                });

                self.publish(Event::PhoneStateChanged {
                    entity_id,
                    snapshot,
                });
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
