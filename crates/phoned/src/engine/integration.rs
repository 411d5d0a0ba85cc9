use std::error::Error;

use async_trait::async_trait;
use linkme::distributed_slice;
use tokio::sync::mpsc;

use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use crate::config::Config;

/// Error type crossing the engine/integration boundary
pub type IntegrationError = Box<dyn Error + Send>;

pub type IntegrationResult<T = ()> = Result<T, IntegrationError>;

/// Box any sendable error for the engine/integration boundary
pub fn boxed<E: Error + Send + 'static>(e: E) -> IntegrationError {
    Box::new(e)
}

/// Channel types for messages FROM integrations TO the engine
/// Bounded so that a chatty state topic cannot outrun the engine
pub type FromIntegrationSender = mpsc::Sender<FromIntegrationMessage>;
pub type FromIntegrationReceiver = mpsc::Receiver<FromIntegrationMessage>;

/// Channel types for messages FROM the engine TO integrations (unbounded - engine must not block)
pub type ToIntegrationSender = mpsc::UnboundedSender<ToIntegrationMessage>;

/// Result type for integration factory functions
pub type IntegrationFactoryResult = anyhow::Result<Option<Box<dyn Integration>>>;

pub struct IntegrationContext<'a> {
    pub config: &'a Config,
}

/// Factories for every compiled-in integration. Each returns `Ok(None)` when
/// its configuration section is absent.
#[distributed_slice]
pub static REGISTRY: [fn(&IntegrationContext) -> IntegrationFactoryResult];

/// Integration trait that all integrations must implement
#[async_trait]
pub trait Integration: Send + Sync {
    /// Get the name/identifier of this integration
    fn name(&self) -> &str;

    /// Connect, subscribe and announce entities.
    ///
    /// The integration keeps `tx` to report entities and state changes back to
    /// the engine for as long as it runs.
    async fn setup(&mut self, tx: FromIntegrationSender) -> IntegrationResult;

    /// Handle a command from the engine, e.g. place a call
    async fn handle_message(&mut self, msg: ToIntegrationMessage) -> IntegrationResult;

    /// Shut down the integration and withdraw its entities
    async fn shutdown(&mut self) -> IntegrationResult;
}
