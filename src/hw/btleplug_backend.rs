use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tracing::{debug, info, instrument};

use super::model::{CharacteristicInfo, FoundDevice, ServiceInfo, matches_local_name};
use super::transport::{BleLink, BleTransport, LinkNotification, NotificationStream, WriteMode};
use crate::error::InteractionError;

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Transport backed by `btleplug`.
#[derive(Debug)]
pub(crate) struct BtleplugBackend {
    manager: Manager,
}

impl BtleplugBackend {
    /// Creates the real BLE backend.
    pub(crate) async fn new() -> Result<Self, InteractionError> {
        let manager = Manager::new().await?;
        Ok(Self { manager })
    }

    /// Scans indefinitely until a peripheral named `name` appears, then connects.
    #[instrument(skip(self), level = "debug")]
    async fn find_and_connect(&self, name: &str) -> Result<(Peripheral, FoundDevice), InteractionError> {
        let adapters = self.adapters().await?;
        info!(
            adapter_count = adapters.len(),
            "starting indefinite BLE scan"
        );

        for adapter in &adapters {
            adapter.adapter.start_scan(ScanFilter::default()).await?;
        }

        loop {
            for adapter in &adapters {
                let peripherals = adapter.adapter.peripherals().await?;
                for peripheral in peripherals {
                    let Some(properties) = peripheral.properties().await? else {
                        continue;
                    };
                    if !matches_local_name(properties.local_name.as_deref(), name) {
                        continue;
                    }

                    for handle in &adapters {
                        if let Err(error) = handle.adapter.stop_scan().await {
                            debug!(?error, "failed to stop adapter scan cleanly");
                        }
                    }

                    if !peripheral.is_connected().await? {
                        peripheral.connect().await?;
                    }
                    peripheral.discover_services().await?;

                    let device = FoundDevice::new(
                        adapter.name.clone(),
                        peripheral.id().to_string(),
                        properties.local_name,
                        properties.rssi,
                    );
                    info!(device_id = device.device_id(), "connected to matching peripheral");
                    return Ok((peripheral, device));
                }
            }

            sleep(SCAN_POLL_INTERVAL).await;
        }
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<AdapterHandle>, InteractionError> {
        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(InteractionError::NoAdapters);
        }

        let mut handles = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let name = adapter.adapter_info().await?;
            handles.push(AdapterHandle { adapter, name });
        }
        Ok(handles)
    }
}

#[async_trait]
impl BleTransport for BtleplugBackend {
    async fn discover(&self, name: &str) -> Result<Box<dyn BleLink>, InteractionError> {
        let (peripheral, device) = self.find_and_connect(name).await?;
        let (services, characteristics_by_uuid) = collect_services_and_characteristics(&peripheral);

        Ok(Box::new(RealLink {
            device,
            services,
            characteristics_by_uuid,
            peripheral,
        }))
    }
}

/// Link bound to a connected `btleplug` peripheral.
#[derive(Debug)]
struct RealLink {
    device: FoundDevice,
    services: Vec<ServiceInfo>,
    characteristics_by_uuid: HashMap<String, Characteristic>,
    peripheral: Peripheral,
}

impl RealLink {
    fn characteristic_for(&self, uuid: &str) -> Result<&Characteristic, InteractionError> {
        self.characteristics_by_uuid
            .get(uuid)
            .ok_or_else(|| InteractionError::UnknownCharacteristic {
                uuid: uuid.to_string(),
            })
    }
}

#[async_trait]
impl BleLink for RealLink {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    fn services(&self) -> &[ServiceInfo] {
        &self.services
    }

    #[instrument(skip(self), level = "trace")]
    async fn read(&self, uuid: &str) -> Result<Vec<u8>, InteractionError> {
        let characteristic = self.characteristic_for(uuid)?;
        Ok(self.peripheral.read(characteristic).await?)
    }

    #[instrument(skip(self, payload), level = "trace", fields(?mode, payload_len = payload.len()))]
    async fn write(
        &self,
        uuid: &str,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(uuid)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        self.peripheral
            .write(characteristic, payload, write_type)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn subscribe(&self, uuid: &str) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(uuid)?;
        self.peripheral.subscribe(characteristic).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn unsubscribe(&self, uuid: &str) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(uuid)?;
        self.peripheral.unsubscribe(characteristic).await?;
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, InteractionError> {
        let stream = self.peripheral.notifications().await?;
        Ok(Box::pin(stream.map(|notification| LinkNotification {
            uuid: notification.uuid.to_string().to_lowercase(),
            value: notification.value,
        })))
    }

    #[instrument(skip(self), level = "debug")]
    async fn disconnect(&self) -> Result<(), InteractionError> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct AdapterHandle {
    adapter: Adapter,
    name: String,
}

fn collect_services_and_characteristics(
    peripheral: &Peripheral,
) -> (Vec<ServiceInfo>, HashMap<String, Characteristic>) {
    let mut services = Vec::new();
    let mut characteristics_by_uuid = HashMap::new();

    for service in peripheral.services() {
        let service_uuid = service.uuid.to_string().to_lowercase();

        let mut characteristics = Vec::new();
        for characteristic in &service.characteristics {
            let characteristic_uuid = characteristic.uuid.to_string().to_lowercase();
            characteristics_by_uuid
                .entry(characteristic_uuid.clone())
                .or_insert_with(|| characteristic.clone());

            characteristics.push(CharacteristicInfo::new(
                characteristic_uuid,
                property_labels(characteristic.properties),
            ));
        }
        characteristics.sort_by(|left, right| left.uuid().cmp(right.uuid()));

        services.push(ServiceInfo::new(service_uuid, characteristics));
    }
    services.sort_by(|left, right| left.uuid().cmp(right.uuid()));

    (services, characteristics_by_uuid)
}

fn property_labels(flags: CharPropFlags) -> Vec<String> {
    let labels: Vec<String> = flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    if labels.is_empty() {
        vec!["none".to_string()]
    } else {
        labels
    }
}
