use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bon::Builder;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use super::model::{CharacteristicInfo, FoundDevice, ServiceInfo};
use super::session::DEFAULT_DEVICE_NAME;
use super::transport::{BleLink, BleTransport, LinkNotification, NotificationStream, WriteMode};
use crate::error::{FixtureError, InteractionError};
use crate::protocol::{self, EndpointId};

const FAKE_ADAPTER: &str = "fake0";
const FAKE_DEVICE_ID: &str = "FA:KE:00:00:00:01";
const FAKE_RSSI: i16 = -42;
const FAKE_MANUFACTURER: &str = "Senic";
const DEFAULT_BATTERY_LEVEL: u8 = 100;

/// Scripted outcome of one battery characteristic read.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BatteryRead {
    /// Reply with this level.
    Level(u8),
    /// Never reply.
    Hang,
    /// Fail the read.
    Fail,
}

/// Notification payloads in the form `source=hex,source=hex`.
///
/// Sources are `battery`, `info`, `click`, `rotate`, `swipe` and `fly`.
#[derive(Debug, Clone, Default, Eq, PartialEq, derive_more::Into)]
pub struct NotificationFixture {
    notifications: Vec<(EndpointId, Vec<u8>)>,
}

impl FromStr for NotificationFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let notifications = value
            .split(',')
            .map(str::trim)
            .filter(|record| !record.is_empty())
            .map(parse_notification_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { notifications })
    }
}

fn parse_notification_record(record: &str) -> Result<(EndpointId, Vec<u8>), FixtureError> {
    let Some((source, payload)) = record.split_once('=') else {
        return Err(FixtureError::InvalidRecord {
            record: record.to_string(),
        });
    };

    let endpoint = match source.trim().to_ascii_lowercase().as_str() {
        "battery" => EndpointId::BatteryLevel,
        "info" => EndpointId::ManufacturerName,
        "click" => EndpointId::ClickInput,
        "rotate" => EndpointId::RotateInput,
        "swipe" => EndpointId::SwipeInput,
        "fly" => EndpointId::FlyInput,
        other => {
            return Err(FixtureError::UnknownSource {
                name: other.to_string(),
            });
        }
    };
    Ok((endpoint, hex::decode(payload.trim())?))
}

/// Settings for constructing a fake transport.
#[derive(Debug, Builder)]
pub struct FakeTransportConfig {
    /// Advertised name of the simulated peripheral.
    #[builder(into, default = DEFAULT_DEVICE_NAME.to_string())]
    device_name: String,
    /// Level returned once scripted reads are exhausted.
    #[builder(default = DEFAULT_BATTERY_LEVEL)]
    battery_level: u8,
    /// Battery read outcomes consumed in order across all links.
    #[builder(default)]
    battery_reads: Vec<BatteryRead>,
    /// Notifications delivered on every new link.
    notifications: Option<NotificationFixture>,
    /// Number of initial discover calls that fail.
    #[builder(default)]
    failed_discoveries: usize,
    /// Endpoints left out of the simulated GATT table.
    #[builder(default)]
    omitted_endpoints: Vec<EndpointId>,
}

#[derive(Debug)]
struct FakeState {
    discover_attempts: usize,
    generation: usize,
    connected: bool,
    battery_reads: VecDeque<BatteryRead>,
    writes: Vec<(String, Vec<u8>)>,
    subscriptions: Vec<String>,
    notifier: Option<mpsc::UnboundedSender<LinkNotification>>,
}

#[derive(Debug)]
struct FakeShared {
    device_name: String,
    battery_level: u8,
    notifications: Vec<(EndpointId, Vec<u8>)>,
    failed_discoveries: usize,
    services: Vec<ServiceInfo>,
    state: Mutex<FakeState>,
}

impl FakeShared {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixture-driven transport used in tests and hardware-free runs.
///
/// Clones share one simulated peripheral.
#[derive(Debug, Clone)]
pub struct FakeTransport {
    shared: Arc<FakeShared>,
}

impl FakeTransport {
    /// Creates a fake transport from explicit settings.
    #[must_use]
    pub fn new(config: FakeTransportConfig) -> Self {
        let FakeTransportConfig {
            device_name,
            battery_level,
            battery_reads,
            notifications,
            failed_discoveries,
            omitted_endpoints,
        } = config;

        Self {
            shared: Arc::new(FakeShared {
                device_name,
                battery_level,
                notifications: notifications.map(Into::into).unwrap_or_default(),
                failed_discoveries,
                services: default_services(&omitted_endpoints),
                state: Mutex::new(FakeState {
                    discover_attempts: 0,
                    generation: 0,
                    connected: false,
                    battery_reads: battery_reads.into(),
                    writes: Vec::new(),
                    subscriptions: Vec::new(),
                    notifier: None,
                }),
            }),
        }
    }

    /// Returns how many times discovery has been attempted.
    #[must_use]
    pub fn discover_attempts(&self) -> usize {
        self.shared.state().discover_attempts
    }

    /// Returns whether a link is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.state().connected
    }

    /// Returns every payload written to `endpoint`, oldest first.
    #[must_use]
    pub fn writes_to(&self, endpoint: EndpointId) -> Vec<Vec<u8>> {
        let uuid = protocol::endpoint_metadata(endpoint).uuid();
        self.shared
            .state()
            .writes
            .iter()
            .filter(|(target, _)| target == uuid)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Returns whether `endpoint` is subscribed on the current link.
    #[must_use]
    pub fn is_subscribed(&self, endpoint: EndpointId) -> bool {
        let uuid = protocol::endpoint_metadata(endpoint).uuid();
        self.shared
            .state()
            .subscriptions
            .iter()
            .any(|subscribed| subscribed == uuid)
    }

    /// Pushes a notification on the current link.
    ///
    /// Returns `false` when nothing is connected or the endpoint is not subscribed.
    pub fn notify(&self, endpoint: EndpointId, payload: &[u8]) -> bool {
        let uuid = protocol::endpoint_metadata(endpoint).uuid();
        let state = self.shared.state();
        if !state.connected || !state.subscriptions.iter().any(|subscribed| subscribed == uuid) {
            return false;
        }
        state.notifier.as_ref().is_some_and(|notifier| {
            notifier
                .send(LinkNotification {
                    uuid: uuid.to_string(),
                    value: payload.to_vec(),
                })
                .is_ok()
        })
    }
}

#[async_trait]
impl BleTransport for FakeTransport {
    async fn discover(&self, name: &str) -> Result<Box<dyn BleLink>, InteractionError> {
        let generation = {
            let mut state = self.shared.state();
            state.discover_attempts += 1;
            if state.discover_attempts <= self.shared.failed_discoveries {
                debug!(attempt = state.discover_attempts, "simulating discovery failure");
                return Err(InteractionError::NoMatchingFixtureDevice {
                    name: name.to_string(),
                });
            }
            state.generation += 1;
            state.connected = true;
            state.subscriptions.clear();
            state.notifier = None;
            state.generation
        };

        let device = FoundDevice::new(
            FAKE_ADAPTER.to_string(),
            FAKE_DEVICE_ID.to_string(),
            Some(self.shared.device_name.clone()),
            Some(FAKE_RSSI),
        );
        if !device.has_local_name(name) {
            let mut state = self.shared.state();
            state.connected = false;
            return Err(InteractionError::NoMatchingFixtureDevice {
                name: name.to_string(),
            });
        }

        info!(generation, "fake peripheral connected");
        Ok(Box::new(FakeLink {
            shared: Arc::clone(&self.shared),
            device,
            generation,
        }))
    }
}

#[derive(Debug)]
struct FakeLink {
    shared: Arc<FakeShared>,
    device: FoundDevice,
    generation: usize,
}

impl FakeLink {
    fn ensure_live(&self, state: &FakeState) -> Result<(), InteractionError> {
        if state.connected && state.generation == self.generation {
            Ok(())
        } else {
            Err(InteractionError::LinkClosed)
        }
    }

    fn ensure_known(&self, uuid: &str) -> Result<(), InteractionError> {
        let known = self.shared.services.iter().any(|service| {
            service
                .characteristics()
                .iter()
                .any(|characteristic| characteristic.uuid() == uuid)
        });
        if known {
            Ok(())
        } else {
            Err(InteractionError::UnknownCharacteristic {
                uuid: uuid.to_string(),
            })
        }
    }
}

#[async_trait]
impl BleLink for FakeLink {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    fn services(&self) -> &[ServiceInfo] {
        &self.shared.services
    }

    async fn read(&self, uuid: &str) -> Result<Vec<u8>, InteractionError> {
        self.ensure_known(uuid)?;
        let outcome = {
            let mut state = self.shared.state();
            self.ensure_live(&state)?;
            if uuid == protocol::endpoint_metadata(EndpointId::ManufacturerName).uuid() {
                return Ok(FAKE_MANUFACTURER.as_bytes().to_vec());
            }
            state
                .battery_reads
                .pop_front()
                .unwrap_or(BatteryRead::Level(self.shared.battery_level))
        };

        match outcome {
            BatteryRead::Level(level) => Ok(vec![level]),
            BatteryRead::Fail => Err(InteractionError::LinkClosed),
            BatteryRead::Hang => std::future::pending().await,
        }
    }

    async fn write(
        &self,
        uuid: &str,
        payload: &[u8],
        _mode: WriteMode,
    ) -> Result<(), InteractionError> {
        self.ensure_known(uuid)?;
        let mut state = self.shared.state();
        self.ensure_live(&state)?;
        state.writes.push((uuid.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, uuid: &str) -> Result<(), InteractionError> {
        self.ensure_known(uuid)?;
        let mut state = self.shared.state();
        self.ensure_live(&state)?;
        if !state.subscriptions.iter().any(|subscribed| subscribed == uuid) {
            state.subscriptions.push(uuid.to_string());
        }
        Ok(())
    }

    async fn unsubscribe(&self, uuid: &str) -> Result<(), InteractionError> {
        let mut state = self.shared.state();
        self.ensure_live(&state)?;
        state.subscriptions.retain(|subscribed| subscribed != uuid);
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, InteractionError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        {
            let mut state = self.shared.state();
            self.ensure_live(&state)?;
            state.notifier = Some(sender);
        }

        let fixture: Vec<LinkNotification> = self
            .shared
            .notifications
            .iter()
            .map(|(endpoint, payload)| LinkNotification {
                uuid: protocol::endpoint_metadata(*endpoint).uuid().to_string(),
                value: payload.clone(),
            })
            .collect();
        Ok(Box::pin(
            tokio_stream::iter(fixture).chain(UnboundedReceiverStream::new(receiver)),
        ))
    }

    async fn disconnect(&self) -> Result<(), InteractionError> {
        let mut state = self.shared.state();
        if state.generation == self.generation {
            state.connected = false;
            state.subscriptions.clear();
            state.notifier = None;
        }
        Ok(())
    }
}

fn default_services(omitted: &[EndpointId]) -> Vec<ServiceInfo> {
    let services = [
        (
            EndpointId::BatteryService,
            vec![(EndpointId::BatteryLevel, &["read", "notify"][..])],
        ),
        (
            EndpointId::DeviceInfoService,
            vec![(EndpointId::ManufacturerName, &["read"][..])],
        ),
        (
            EndpointId::LedMatrixService,
            vec![(EndpointId::LedMatrix, &["write"][..])],
        ),
        (
            EndpointId::UserInputService,
            vec![
                (EndpointId::FlyInput, &["read", "notify"][..]),
                (EndpointId::SwipeInput, &["read", "notify"][..]),
                (EndpointId::RotateInput, &["read", "notify"][..]),
                (EndpointId::ClickInput, &["read", "notify"][..]),
            ],
        ),
    ];

    services
        .into_iter()
        .filter(|(service, _)| !omitted.contains(service))
        .map(|(service, characteristics)| {
            let characteristics = characteristics
                .into_iter()
                .filter(|(endpoint, _)| !omitted.contains(endpoint))
                .map(|(endpoint, properties)| {
                    CharacteristicInfo::new(
                        protocol::endpoint_metadata(endpoint).uuid().to_string(),
                        properties.iter().map(|label| (*label).to_string()).collect(),
                    )
                })
                .collect();
            ServiceInfo::new(
                protocol::endpoint_metadata(service).uuid().to_string(),
                characteristics,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::protocol::EndpointKind;

    // Test-only: lets `assert_matches!` format `Result<Box<dyn BleLink>, _>`.
    impl std::fmt::Debug for dyn BleLink {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("BleLink").finish_non_exhaustive()
        }
    }

    #[rstest]
    #[case("click=01", vec![(EndpointId::ClickInput, vec![0x01])])]
    #[case(
        "swipe=01, rotate=ECFF",
        vec![(EndpointId::SwipeInput, vec![0x01]), (EndpointId::RotateInput, vec![0xEC, 0xFF])]
    )]
    #[case("", vec![])]
    fn notification_fixture_parses_records(
        #[case] fixture: &str,
        #[case] expected: Vec<(EndpointId, Vec<u8>)>,
    ) {
        let parsed: NotificationFixture = fixture.parse().expect("fixture should parse");
        assert_eq!(expected, Vec::from(parsed));
    }

    #[rstest]
    #[case("click", "InvalidRecord")]
    #[case("knob=01", "UnknownSource")]
    #[case("click=0", "InvalidHex")]
    fn notification_fixture_rejects_malformed_records(#[case] fixture: &str, #[case] variant: &str) {
        let error = fixture
            .parse::<NotificationFixture>()
            .expect_err("malformed fixture should be rejected");
        assert!(format!("{error:?}").starts_with(variant));
    }

    #[test]
    fn default_services_expose_every_characteristic() {
        let services = default_services(&[]);
        let exposed: Vec<String> = services
            .iter()
            .flat_map(|service| service.characteristics())
            .map(|characteristic| characteristic.uuid().to_string())
            .collect();

        let characteristics = EndpointId::iter().filter(|endpoint| {
            protocol::endpoint_metadata(*endpoint).kind() == EndpointKind::Characteristic
        });
        for endpoint in characteristics {
            assert!(exposed.contains(&protocol::endpoint_metadata(endpoint).uuid().to_string()));
        }
    }

    #[tokio::test]
    async fn scripted_failures_precede_successful_discovery() {
        let transport = FakeTransport::new(
            FakeTransportConfig::builder()
                .failed_discoveries(1)
                .build(),
        );

        let first = transport.discover("nuimo").await;
        assert_matches!(first, Err(InteractionError::NoMatchingFixtureDevice { .. }));
        let second = transport.discover("nuimo").await;
        assert_matches!(second, Ok(_));
        assert_eq!(2, transport.discover_attempts());
    }

    #[tokio::test]
    async fn stale_link_rejects_operations_after_rediscovery() {
        let transport = FakeTransport::new(FakeTransportConfig::builder().build());
        let first = transport.discover("Nuimo").await.expect("first discovery");
        let _second = transport.discover("Nuimo").await.expect("second discovery");

        let battery = protocol::endpoint_metadata(EndpointId::BatteryLevel).uuid();
        assert_matches!(first.read(battery).await, Err(InteractionError::LinkClosed));
    }
}
