mod btleplug_backend;
mod fake_backend;
mod model;
mod session;
mod transport;

use std::sync::Arc;

use tracing::info;

pub use self::fake_backend::{BatteryRead, FakeTransport, FakeTransportConfig, NotificationFixture};
pub use self::model::{CharacteristicInfo, FoundDevice, ServiceInfo};
pub use self::session::{
    DEFAULT_BATTERY_READ_TIMEOUT, DEFAULT_DEVICE_NAME, DEFAULT_EVENT_QUEUE_CAPACITY,
    DeviceSessionManager, SessionConfig, SessionState,
};
pub use self::transport::{
    BleLink, BleTransport, LedDisplay, LinkNotification, NotificationStream, WriteMode,
};
use crate::error::InteractionError;

/// Creates the `btleplug`-backed transport.
pub async fn real_transport() -> Result<Arc<dyn BleTransport>, InteractionError> {
    let backend = btleplug_backend::BtleplugBackend::new().await?;
    info!("using btleplug BLE backend");
    Ok(Arc::new(backend))
}
