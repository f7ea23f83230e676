use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::model::ServiceInfo;
use super::transport::{BleLink, BleTransport, LedDisplay, NotificationStream, WriteMode};
use crate::error::InteractionError;
use crate::event::{EventKey, InputEvent};
use crate::handlers::{DisplayMatrix, encode_frame};
use crate::notification::{DecodedNotification, NotificationHandler, NotificationSource};
use crate::protocol::{self, EndpointId};
use crate::utils::format_hex;

/// Advertised name scanned for by default.
pub const DEFAULT_DEVICE_NAME: &str = "Nuimo";
/// Upper bound on one keepalive battery read.
pub const DEFAULT_BATTERY_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Events buffered before new ones are dropped.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 100;

/// Settings for a [`DeviceSessionManager`].
#[derive(Debug, Clone, Builder)]
pub struct SessionConfig {
    #[builder(into, default = DEFAULT_DEVICE_NAME.to_string())]
    device_name: String,
    #[builder(default = DEFAULT_BATTERY_READ_TIMEOUT)]
    battery_read_timeout: Duration,
    #[builder(default = DEFAULT_EVENT_QUEUE_CAPACITY)]
    event_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SessionConfig {
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    #[must_use]
    pub fn battery_read_timeout(&self) -> Duration {
        self.battery_read_timeout
    }
}

/// Link state published by the session manager.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum SessionState {
    #[display("disconnected")]
    Disconnected,
    #[display("discovering")]
    Discovering,
    #[display("connected")]
    Connected,
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct Binding {
    uuid: String,
    source: NotificationSource,
}

/// Characteristics resolved from a freshly connected peripheral.
#[derive(Debug, Clone, Eq, PartialEq)]
struct SubscriptionPlan {
    bindings: Vec<Binding>,
    battery_uuid: String,
    led_uuid: String,
    info_uuid: Option<String>,
}

#[instrument(skip(services), level = "debug", fields(service_count = services.len()))]
fn plan_subscriptions(services: &[ServiceInfo]) -> Result<SubscriptionPlan, InteractionError> {
    let mut bindings = Vec::new();
    let mut battery_uuid = None;
    let mut led_uuid = None;
    let mut info_uuid = None;

    for service in services {
        let Some(service_endpoint) = protocol::endpoint_for_uuid(service.uuid()) else {
            debug!(service_uuid = service.uuid(), "ignoring unrelated service");
            continue;
        };

        if service_endpoint == EndpointId::LedMatrixService {
            let preferred = service.characteristics().iter().find(|characteristic| {
                protocol::endpoint_for_uuid(characteristic.uuid()) == Some(EndpointId::LedMatrix)
            });
            if let Some(characteristic) = preferred.or_else(|| service.characteristics().first()) {
                led_uuid.get_or_insert_with(|| characteristic.uuid().to_ascii_lowercase());
            }
            continue;
        }

        if !service_endpoint.is_subscribed_service() {
            continue;
        }

        for characteristic in service.characteristics() {
            let uuid = characteristic.uuid().to_ascii_lowercase();
            let endpoint = protocol::endpoint_for_uuid(&uuid);
            match endpoint {
                Some(EndpointId::BatteryLevel) => {
                    battery_uuid.get_or_insert_with(|| uuid.clone());
                }
                Some(EndpointId::ManufacturerName) => {
                    info_uuid.get_or_insert_with(|| uuid.clone());
                }
                _ => {}
            }

            if !characteristic.supports_notify() {
                continue;
            }
            let source = endpoint
                .and_then(EndpointId::notification_source)
                .unwrap_or(NotificationSource::Unrecognised);
            bindings.push(Binding { uuid, source });
        }
    }

    match (battery_uuid, led_uuid) {
        (Some(battery_uuid), Some(led_uuid)) => Ok(SubscriptionPlan {
            bindings,
            battery_uuid,
            led_uuid,
            info_uuid,
        }),
        (battery_uuid, led_uuid) => {
            let missing: Vec<String> = [
                (battery_uuid.is_none(), EndpointId::BatteryLevel),
                (led_uuid.is_none(), EndpointId::LedMatrix),
            ]
            .into_iter()
            .filter(|(absent, _)| *absent)
            .map(|(_, endpoint)| {
                let metadata = protocol::endpoint_metadata(endpoint);
                format!("{} {}", metadata.name(), metadata.kind())
            })
            .collect();
            Err(InteractionError::MissingRequiredEndpoints {
                missing: missing.join(", "),
            })
        }
    }
}

#[derive(Debug, Clone)]
struct EventEmitter {
    sender: mpsc::Sender<InputEvent>,
}

impl EventEmitter {
    fn emit(&self, event: InputEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(key = %event.key(), "event queue full; dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                trace!(key = %event.key(), "event queue closed; dropping event");
            }
        }
    }
}

struct ActiveLink {
    link: Arc<dyn BleLink>,
    plan: SubscriptionPlan,
    pump: JoinHandle<()>,
}

impl ActiveLink {
    async fn teardown(self) {
        self.pump.abort();
        for binding in &self.plan.bindings {
            if let Err(error) = self.link.unsubscribe(&binding.uuid).await {
                debug!(%error, uuid = binding.uuid, "unsubscribe failed during teardown");
            }
        }
        if let Err(error) = self.link.disconnect().await {
            debug!(%error, "disconnect failed during teardown");
        }
    }
}

/// A discovered link that is disconnected on drop unless handed to the session.
struct PendingLink {
    link: Arc<dyn BleLink>,
    armed: bool,
}

impl PendingLink {
    fn new(link: Arc<dyn BleLink>) -> Self {
        Self { link, armed: true }
    }

    fn link(&self) -> &dyn BleLink {
        self.link.as_ref()
    }

    fn into_link(mut self) -> Arc<dyn BleLink> {
        self.armed = false;
        Arc::clone(&self.link)
    }
}

impl Drop for PendingLink {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let link = Arc::clone(&self.link);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("link setup abandoned; disconnecting");
                handle.spawn(async move {
                    if let Err(error) = link.disconnect().await {
                        debug!(%error, "disconnect of abandoned link failed");
                    }
                });
            }
            Err(_) => warn!("link setup abandoned outside a runtime; link left open"),
        }
    }
}

/// Owns the link to one Nuimo and turns its notifications into [`InputEvent`]s.
///
/// Connection lifecycle events (`connected`, `disconnected`) are delivered on the
/// same queue as input events.
pub struct DeviceSessionManager {
    transport: Arc<dyn BleTransport>,
    config: SessionConfig,
    emitter: EventEmitter,
    lifecycle: Mutex<()>,
    active: Mutex<Option<ActiveLink>>,
    state: watch::Sender<SessionState>,
}

impl std::fmt::Debug for DeviceSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSessionManager")
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl DeviceSessionManager {
    /// Creates a manager and the receiving end of its event queue.
    #[must_use]
    pub fn new(
        transport: Arc<dyn BleTransport>,
        config: SessionConfig,
    ) -> (Self, mpsc::Receiver<InputEvent>) {
        let (sender, receiver) = mpsc::channel(config.event_queue_capacity.max(1));
        let (state, _) = watch::channel(SessionState::Disconnected);
        let manager = Self {
            transport,
            config,
            emitter: EventEmitter { sender },
            lifecycle: Mutex::new(()),
            active: Mutex::new(None),
            state,
        };
        (manager, receiver)
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the current link state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watches link state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Discovers the device, subscribes to its notifying characteristics and
    /// starts forwarding decoded events.
    ///
    /// Emits a `connected` event once subscriptions are in place. Any link left
    /// over from an earlier call is torn down first.
    #[instrument(skip(self), level = "info", fields(device_name = %self.config.device_name))]
    pub async fn connect(&self) -> Result<(), InteractionError> {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            warn!("replacing an existing link");
            previous.teardown().await;
        }
        self.establish().await
    }

    /// Tears down the current link, if any, and connects again.
    #[instrument(skip(self), level = "info", fields(device_name = %self.config.device_name))]
    pub async fn reconnect(&self) -> Result<(), InteractionError> {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            previous.teardown().await;
        }
        self.state.send_replace(SessionState::Disconnected);
        info!("reconnecting");
        self.establish().await
    }

    /// Tears down the current link without reconnecting.
    #[instrument(skip(self), level = "info")]
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            previous.teardown().await;
            info!("disconnected");
        }
        self.state.send_replace(SessionState::Disconnected);
    }

    async fn establish(&self) -> Result<(), InteractionError> {
        self.state.send_replace(SessionState::Discovering);
        let (pending, plan, notifications) = match self.open_link().await {
            Ok(opened) => opened,
            Err(error) => {
                self.state.send_replace(SessionState::Disconnected);
                return Err(error);
            }
        };

        // The link must be visible to `display` before `connected` is observed.
        let mut active = self.active.lock().await;
        let link = pending.into_link();
        self.emitter.emit(InputEvent::signal(EventKey::Connected));
        let pump = tokio::spawn(pump_notifications(
            notifications,
            sources_by_uuid(&plan.bindings),
            self.emitter.clone(),
        ));
        *active = Some(ActiveLink { link, plan, pump });
        drop(active);

        self.state.send_replace(SessionState::Connected);
        Ok(())
    }

    async fn open_link(
        &self,
    ) -> Result<(PendingLink, SubscriptionPlan, NotificationStream), InteractionError> {
        let pending = PendingLink::new(Arc::from(
            self.transport.discover(&self.config.device_name).await?,
        ));
        let device = pending.link().device();
        info!(
            device_id = device.device_id(),
            adapter = device.adapter_name(),
            rssi = ?device.rssi(),
            "peripheral connected"
        );

        match subscribe_all(pending.link()).await {
            Ok((plan, notifications)) => {
                if let Some(info_uuid) = &plan.info_uuid {
                    log_device_info(pending.link(), info_uuid).await;
                }
                Ok((pending, plan, notifications))
            }
            Err(error) => {
                let link = pending.into_link();
                if let Err(disconnect_error) = link.disconnect().await {
                    debug!(%disconnect_error, "disconnect after failed setup also failed");
                }
                Err(error)
            }
        }
    }

    /// Reads the battery characteristic and emits the decoded `battery` event.
    ///
    /// Returns `None` when the payload does not decode.
    #[instrument(skip(self), level = "debug")]
    pub async fn read_battery(&self) -> Result<Option<i64>, InteractionError> {
        let (link, uuid) = self.link_for(|plan| plan.battery_uuid.clone()).await?;
        let payload = link.read(&uuid).await?;
        match NotificationHandler::decode(NotificationSource::Battery, &payload) {
            Ok(DecodedNotification::Events(events)) => {
                let level = events.first().map(InputEvent::value);
                for event in events {
                    self.emitter.emit(event);
                }
                Ok(level)
            }
            Ok(DecodedNotification::DeviceInfo(_)) => Ok(None),
            Err(error) => {
                warn!(%error, payload = %format_hex(&payload), "battery read did not decode");
                Ok(None)
            }
        }
    }

    /// Writes one LED matrix frame to the connected device.
    #[instrument(skip(self, matrix), level = "debug")]
    pub async fn display(
        &self,
        matrix: &DisplayMatrix,
        brightness: u8,
        timeout: u8,
    ) -> Result<(), InteractionError> {
        let (link, uuid) = self.link_for(|plan| plan.led_uuid.clone()).await?;
        let frame = encode_frame(matrix, brightness, timeout);
        link.write(&uuid, &frame, WriteMode::WithResponse).await
    }

    /// Probes the link with a bounded battery read every `interval`.
    ///
    /// A read that fails or outlasts the battery read timeout emits
    /// `disconnected` and triggers one reconnect attempt. Returns once `cancel`
    /// fires.
    #[instrument(skip(self, cancel), level = "info")]
    pub async fn keepalive(&self, interval: Duration, cancel: CancellationToken) {
        info!("keepalive started");
        loop {
            let outcome = tokio::select! {
                () = cancel.cancelled() => break,
                outcome = timeout(self.config.battery_read_timeout, self.read_battery()) => outcome,
            };

            let healthy = match outcome {
                Ok(Ok(level)) => {
                    debug!(?level, "keepalive battery read succeeded");
                    true
                }
                Ok(Err(error)) => {
                    warn!(%error, "keepalive battery read failed");
                    false
                }
                Err(_) => {
                    warn!(
                        timeout = %humantime::format_duration(self.config.battery_read_timeout),
                        "keepalive battery read timed out"
                    );
                    false
                }
            };

            if !healthy {
                self.emitter.emit(InputEvent::signal(EventKey::Disconnected));
                tokio::select! {
                    () = cancel.cancelled() => break,
                    result = self.reconnect() => {
                        if let Err(error) = result {
                            error!(%error, "reconnect failed; retrying after the next interval");
                        }
                    }
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = sleep(interval) => {}
            }
        }
        info!("keepalive stopped");
    }

    /// Runs [`Self::keepalive`] on a background task.
    pub fn spawn_keepalive(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.keepalive(interval, cancel).await })
    }

    async fn link_for(
        &self,
        select: impl FnOnce(&SubscriptionPlan) -> String,
    ) -> Result<(Arc<dyn BleLink>, String), InteractionError> {
        let active = self.active.lock().await;
        let active = active.as_ref().ok_or(InteractionError::NotConnected)?;
        Ok((Arc::clone(&active.link), select(&active.plan)))
    }
}

#[async_trait]
impl LedDisplay for DeviceSessionManager {
    async fn display(
        &self,
        matrix: &DisplayMatrix,
        brightness: u8,
        timeout: u8,
    ) -> Result<(), InteractionError> {
        DeviceSessionManager::display(self, matrix, brightness, timeout).await
    }
}

async fn subscribe_all(
    link: &dyn BleLink,
) -> Result<(SubscriptionPlan, NotificationStream), InteractionError> {
    let plan = plan_subscriptions(link.services())?;
    let notifications = link.notifications().await?;
    for binding in &plan.bindings {
        link.subscribe(&binding.uuid).await?;
        debug!(uuid = binding.uuid, source = ?binding.source, "subscribed");
    }
    info!(subscriptions = plan.bindings.len(), "notifications enabled");
    Ok((plan, notifications))
}

async fn log_device_info(link: &dyn BleLink, uuid: &str) {
    match link.read(uuid).await {
        Ok(payload) => match NotificationHandler::decode(NotificationSource::DeviceInfo, &payload) {
            Ok(DecodedNotification::DeviceInfo(text)) => info!(manufacturer = %text, "device info"),
            Ok(DecodedNotification::Events(_)) => {}
            Err(error) => debug!(%error, "device info did not decode"),
        },
        Err(error) => debug!(%error, "device info read failed"),
    }
}

fn sources_by_uuid(bindings: &[Binding]) -> HashMap<String, NotificationSource> {
    bindings
        .iter()
        .map(|binding| (binding.uuid.clone(), binding.source))
        .collect()
}

async fn pump_notifications(
    mut notifications: NotificationStream,
    sources: HashMap<String, NotificationSource>,
    emitter: EventEmitter,
) {
    while let Some(notification) = notifications.next().await {
        let Some(source) = sources.get(&notification.uuid).copied() else {
            trace!(uuid = notification.uuid, "notification from unbound characteristic");
            continue;
        };

        match NotificationHandler::decode(source, &notification.value) {
            Ok(DecodedNotification::Events(events)) => {
                for event in events {
                    emitter.emit(event);
                }
            }
            Ok(DecodedNotification::DeviceInfo(text)) => info!(%text, "device info notification"),
            Err(error) => debug!(
                %error,
                payload = %format_hex(&notification.value),
                "dropping undecodable notification"
            ),
        }
    }
    debug!("notification stream ended");
}
