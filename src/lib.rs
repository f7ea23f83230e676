mod app;
mod cli;
mod error;
mod event;
mod fhem;
mod handlers;
mod hw;
mod notification;
mod protocol;
mod scenes;
mod telemetry;
mod utils;

pub use app::{FHEM_PREFIX, NUIMO_PREFIX, run, run_with_transport};
pub use cli::{Args, LogFormat, LogLevel};
pub use error::{CommandError, ConfigError, FhemError, FixtureError, InteractionError};
pub use event::{EventKey, InputEvent};
pub use fhem::{DEFAULT_FHEM_HOST, DEFAULT_FHEM_PORT, FhemClient};
pub use handlers::{
    DEFAULT_ICON_BRIGHTNESS, DEFAULT_ICON_TIMEOUT, DisplayMatrix, Icon, IconRenderer,
    MATRIX_BYTES, MATRIX_SIDE,
};
pub use hw::{
    BatteryRead, BleLink, BleTransport, CharacteristicInfo, DEFAULT_BATTERY_READ_TIMEOUT,
    DEFAULT_DEVICE_NAME, DEFAULT_EVENT_QUEUE_CAPACITY, DeviceSessionManager, FakeTransport,
    FakeTransportConfig, FoundDevice, LedDisplay, LinkNotification, NotificationFixture,
    NotificationStream, ServiceInfo, SessionConfig, SessionState, WriteMode, real_transport,
};
pub use notification::{
    DecodedNotification, NotificationDecodeError, NotificationHandler, NotificationSource,
};
pub use protocol::EndpointId;
pub use scenes::{
    Command, CommandRouter, EMPTY_PREFIX, ListenerId, NULL_SCENE_NAME, ROTATE_DEAD_ZONE,
    Resolution, RouteOutcome, Scene, SceneConfig, SceneController, SceneTable,
    resolve_config_path,
};
