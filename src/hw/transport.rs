use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;

use super::model::{FoundDevice, ServiceInfo};
use crate::error::InteractionError;
use crate::handlers::DisplayMatrix;

/// GATT write mode.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// One value notification received from a subscribed characteristic.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LinkNotification {
    /// Lowercase characteristic UUID.
    pub uuid: String,
    pub value: Vec<u8>,
}

/// Stream of notifications for every subscribed characteristic of one link.
pub type NotificationStream = Pin<Box<dyn Stream<Item = LinkNotification> + Send>>;

/// Discovers and connects peripherals.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Scans until a peripheral advertising `name` appears, then connects and
    /// enumerates its services.
    async fn discover(&self, name: &str) -> Result<Box<dyn BleLink>, InteractionError>;
}

/// An established connection to one peripheral.
///
/// Characteristics are addressed by lowercase UUID.
#[async_trait]
pub trait BleLink: Send + Sync {
    fn device(&self) -> &FoundDevice;

    fn services(&self) -> &[ServiceInfo];

    async fn read(&self, uuid: &str) -> Result<Vec<u8>, InteractionError>;

    async fn write(
        &self,
        uuid: &str,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError>;

    async fn subscribe(&self, uuid: &str) -> Result<(), InteractionError>;

    async fn unsubscribe(&self, uuid: &str) -> Result<(), InteractionError>;

    /// Opens the notification stream. Call before subscribing so no value is missed.
    async fn notifications(&self) -> Result<NotificationStream, InteractionError>;

    async fn disconnect(&self) -> Result<(), InteractionError>;
}

/// Sink for LED matrix frames.
#[async_trait]
pub trait LedDisplay: Send + Sync {
    /// Shows `matrix` at `brightness` for `timeout` tenths of a second.
    async fn display(
        &self,
        matrix: &DisplayMatrix,
        brightness: u8,
        timeout: u8,
    ) -> Result<(), InteractionError>;
}
