use std::collections::HashMap;
use std::sync::LazyLock;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::notification::NotificationSource;

/// Known Nuimo GATT endpoints.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum EndpointId {
    /// Standard battery service.
    #[strum(to_string = "battery_service")]
    BatteryService,
    /// Battery level characteristic, read by keepalive and notified on change.
    #[strum(to_string = "battery_level")]
    BatteryLevel,
    /// Standard device information service.
    #[strum(to_string = "device_info_service")]
    DeviceInfoService,
    /// Manufacturer name string.
    #[strum(to_string = "manufacturer_name")]
    ManufacturerName,
    /// Nuimo LED matrix service.
    #[strum(to_string = "led_matrix_service")]
    LedMatrixService,
    /// Characteristic accepting LED matrix frames.
    #[strum(to_string = "led_matrix")]
    LedMatrix,
    /// Nuimo user input service.
    #[strum(to_string = "user_input_service")]
    UserInputService,
    /// Fly gesture notifications.
    #[strum(to_string = "fly_input")]
    FlyInput,
    /// Touch swipe notifications.
    #[strum(to_string = "swipe_input")]
    SwipeInput,
    /// Ring rotation notifications.
    #[strum(to_string = "rotate_input")]
    RotateInput,
    /// Button click notifications.
    #[strum(to_string = "click_input")]
    ClickInput,
}

impl EndpointId {
    /// Returns the decoder source for characteristics that produce notifications.
    #[must_use]
    pub fn notification_source(self) -> Option<NotificationSource> {
        match self {
            Self::BatteryLevel => Some(NotificationSource::Battery),
            Self::ManufacturerName => Some(NotificationSource::DeviceInfo),
            Self::FlyInput => Some(NotificationSource::Fly),
            Self::SwipeInput => Some(NotificationSource::Swipe),
            Self::RotateInput => Some(NotificationSource::Rotate),
            Self::ClickInput => Some(NotificationSource::Click),
            Self::BatteryService
            | Self::DeviceInfoService
            | Self::LedMatrixService
            | Self::LedMatrix
            | Self::UserInputService => None,
        }
    }

    /// Returns whether characteristics of this service are subscribed on connect.
    pub(crate) fn is_subscribed_service(self) -> bool {
        matches!(
            self,
            Self::BatteryService | Self::DeviceInfoService | Self::UserInputService
        )
    }
}

/// Endpoint category in GATT.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub(crate) enum EndpointKind {
    /// GATT service endpoint.
    #[strum(to_string = "service")]
    Service,
    /// GATT characteristic endpoint.
    #[strum(to_string = "characteristic")]
    Characteristic,
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    uuid: &'static str,
    kind: EndpointKind,
}

impl EndpointMetadata {
    /// Human-readable endpoint name.
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    /// Endpoint UUID in lowercase hyphenated form.
    pub(crate) fn uuid(self) -> &'static str {
        self.uuid
    }

    /// Endpoint kind.
    pub(crate) fn kind(self) -> EndpointKind {
        self.kind
    }
}

static ENDPOINTS_BY_UUID: LazyLock<HashMap<&'static str, EndpointId>> = LazyLock::new(|| {
    EndpointId::iter()
        .map(|endpoint| (endpoint_metadata(endpoint).uuid(), endpoint))
        .collect()
});

/// Resolves a service or characteristic UUID to a known endpoint.
pub(crate) fn endpoint_for_uuid(uuid: &str) -> Option<EndpointId> {
    ENDPOINTS_BY_UUID
        .get(uuid.to_ascii_lowercase().as_str())
        .copied()
}

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::BatteryService => EndpointMetadata {
            name: "battery service",
            uuid: "0000180f-0000-1000-8000-00805f9b34fb",
            kind: EndpointKind::Service,
        },
        EndpointId::BatteryLevel => EndpointMetadata {
            name: "battery level",
            uuid: "00002a19-0000-1000-8000-00805f9b34fb",
            kind: EndpointKind::Characteristic,
        },
        EndpointId::DeviceInfoService => EndpointMetadata {
            name: "device information service",
            uuid: "0000180a-0000-1000-8000-00805f9b34fb",
            kind: EndpointKind::Service,
        },
        EndpointId::ManufacturerName => EndpointMetadata {
            name: "manufacturer name",
            uuid: "00002a29-0000-1000-8000-00805f9b34fb",
            kind: EndpointKind::Characteristic,
        },
        EndpointId::LedMatrixService => EndpointMetadata {
            name: "Nuimo LED matrix service",
            uuid: "f29b1523-cb19-40f3-be5c-7241ecb82fd1",
            kind: EndpointKind::Service,
        },
        EndpointId::LedMatrix => EndpointMetadata {
            name: "Nuimo LED matrix",
            uuid: "f29b1524-cb19-40f3-be5c-7241ecb82fd1",
            kind: EndpointKind::Characteristic,
        },
        EndpointId::UserInputService => EndpointMetadata {
            name: "Nuimo user input service",
            uuid: "f29b1525-cb19-40f3-be5c-7241ecb82fd2",
            kind: EndpointKind::Service,
        },
        EndpointId::FlyInput => EndpointMetadata {
            name: "Nuimo fly gesture",
            uuid: "f29b1526-cb19-40f3-be5c-7241ecb82fd2",
            kind: EndpointKind::Characteristic,
        },
        EndpointId::SwipeInput => EndpointMetadata {
            name: "Nuimo swipe",
            uuid: "f29b1527-cb19-40f3-be5c-7241ecb82fd2",
            kind: EndpointKind::Characteristic,
        },
        EndpointId::RotateInput => EndpointMetadata {
            name: "Nuimo rotation",
            uuid: "f29b1528-cb19-40f3-be5c-7241ecb82fd2",
            kind: EndpointKind::Characteristic,
        },
        EndpointId::ClickInput => EndpointMetadata {
            name: "Nuimo click",
            uuid: "f29b1529-cb19-40f3-be5c-7241ecb82fd2",
            kind: EndpointKind::Characteristic,
        },
    }
}
