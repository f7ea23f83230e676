use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::router::{CommandRouter, RouteOutcome};
use super::scene::{Scene, SceneTable};
use crate::event::{EventKey, InputEvent};

/// Rotation deltas within `-ROTATE_DEAD_ZONE..=ROTATE_DEAD_ZONE` resolve to nothing.
pub const ROTATE_DEAD_ZONE: i64 = 10;

const SCENE_ID_KEY: &str = "id";
const ROTATE_LEFT_KEY: &str = "rotate_left";
const ROTATE_RIGHT_KEY: &str = "rotate_right";
const BATTERY_OK_KEY: &str = "battery_ok";
const BATTERY_MEDIUM_KEY: &str = "battery_medium";
const BATTERY_LOW_KEY: &str = "battery_low";
const BATTERY_OK_ABOVE: i64 = 80;
const BATTERY_LOW_AT_OR_BELOW: i64 = 40;

/// The command template an event resolved to.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Resolution<'a> {
    /// Scene the template was looked up in.
    pub scene: &'a str,
    /// Key looked up in that scene.
    pub key: &'static str,
    /// Raw template, empty when the key is unmapped.
    pub template: &'a str,
}

/// Scene state machine: swipes move a cursor over the configured scenes and
/// every other event resolves against the current or the null scene.
#[derive(Debug)]
pub struct SceneController {
    table: SceneTable,
    cursor: AtomicUsize,
}

impl SceneController {
    /// Starts on the first configured scene.
    #[must_use]
    pub fn new(table: SceneTable) -> Self {
        Self {
            table,
            cursor: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn current_scene(&self) -> &Scene {
        self.scene_at(self.current_index())
    }

    /// Advances to the next scene, wrapping to the first.
    pub fn next_state(&self) -> &Scene {
        self.step(|cursor, count| (cursor + 1) % count)
    }

    /// Steps back to the previous scene, wrapping to the last.
    pub fn prev_state(&self) -> &Scene {
        self.step(|cursor, count| (cursor + count - 1) % count)
    }

    fn step(&self, advance: impl Fn(usize, usize) -> usize) -> &Scene {
        let count = self.table.len().max(1);
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                Some(advance(cursor, count))
            })
            .unwrap_or_else(|cursor| cursor);
        let scene = self.scene_at(advance(previous, count));
        info!(scene = scene.name(), "scene changed");
        scene
    }

    fn scene_at(&self, index: usize) -> &Scene {
        self.table
            .get(index)
            .unwrap_or_else(|| self.table.null_scene())
    }

    /// Maps an event to the template it triggers. `None` means the event
    /// triggers nothing at all.
    pub fn resolve(&self, event: &InputEvent) -> Option<Resolution<'_>> {
        match event.key() {
            EventKey::SwipeLeft => Some(Self::lookup(self.prev_state(), SCENE_ID_KEY)),
            EventKey::SwipeRight => Some(Self::lookup(self.next_state(), SCENE_ID_KEY)),
            EventKey::Rotate => {
                let key = match event.value() {
                    delta if delta > ROTATE_DEAD_ZONE => ROTATE_RIGHT_KEY,
                    delta if delta < -ROTATE_DEAD_ZONE => ROTATE_LEFT_KEY,
                    _ => return None,
                };
                Some(Self::lookup(self.current_scene(), key))
            }
            EventKey::Swipe => None,
            key @ (EventKey::Press | EventKey::Release | EventKey::SwipeUp | EventKey::SwipeDown) => {
                Some(Self::lookup(self.current_scene(), key.into()))
            }
            EventKey::Battery => Some(self.resolve_battery(event.value())),
            key @ (EventKey::Connected | EventKey::Disconnected) => {
                Some(Self::lookup(self.table.null_scene(), key.into()))
            }
            key => {
                let resolution = Self::lookup(self.table.null_scene(), key.into());
                if resolution.template.is_empty() {
                    warn!(key = resolution.key, "unhandled event");
                }
                Some(resolution)
            }
        }
    }

    fn resolve_battery(&self, level: i64) -> Resolution<'_> {
        let null_scene = self.table.null_scene();
        let tier = if level > BATTERY_OK_ABOVE {
            BATTERY_OK_KEY
        } else if level > BATTERY_LOW_AT_OR_BELOW {
            BATTERY_MEDIUM_KEY
        } else {
            BATTERY_LOW_KEY
        };

        let resolution = Self::lookup(null_scene, tier);
        if resolution.template.is_empty() {
            Self::lookup(null_scene, EventKey::Battery.into())
        } else {
            resolution
        }
    }

    fn lookup<'a>(scene: &'a Scene, key: &'static str) -> Resolution<'a> {
        Resolution {
            scene: scene.name(),
            key,
            template: scene.handle(key),
        }
    }

    /// Resolves and routes events in arrival order until the queue closes or
    /// `cancel` fires. Routing failures are logged and skipped.
    pub async fn listen(
        &self,
        mut events: mpsc::Receiver<InputEvent>,
        router: &CommandRouter,
        cancel: CancellationToken,
    ) {
        info!(scene = self.current_scene().name(), "scene controller ready");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else {
                        break;
                    };
                    self.dispatch(&event, router).await;
                }
            }
        }
        debug!("scene controller stopped");
    }

    #[instrument(skip_all, level = "debug", fields(key = %event.key(), value = event.value()))]
    async fn dispatch(&self, event: &InputEvent, router: &CommandRouter) {
        let Some(resolution) = self.resolve(event) else {
            trace!("event resolves to no command");
            return;
        };

        match router.route(resolution.template, event).await {
            Ok(RouteOutcome::Empty) => {
                debug!(scene = resolution.scene, lookup = resolution.key, "no command bound");
            }
            Ok(RouteOutcome::NoListener { prefix }) => {
                warn!(%prefix, scene = resolution.scene, "no listener for command prefix");
            }
            Ok(RouteOutcome::Dispatched {
                prefix,
                delivered,
                dropped,
            }) => {
                debug!(%prefix, delivered, dropped, "command dispatched");
            }
            Err(error) => {
                warn!(
                    %error,
                    scene = resolution.scene,
                    lookup = resolution.key,
                    "failed to route command"
                );
            }
        }
    }
}
