use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, instrument, warn};

use super::command::Command;
use crate::error::CommandError;
use crate::event::InputEvent;

/// Handle identifying one registered listener queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ListenerId(u64);

/// What happened to one routed command.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RouteOutcome {
    /// The template was blank; nothing was dispatched.
    Empty,
    /// No listener is registered for the prefix.
    NoListener { prefix: String },
    /// The rendered body was offered to every listener for the prefix.
    Dispatched {
        prefix: String,
        delivered: usize,
        dropped: usize,
    },
}

#[derive(Debug)]
struct Listener {
    id: ListenerId,
    sender: mpsc::Sender<String>,
}

/// Fans rendered commands out to listener queues keyed by prefix.
///
/// Delivery never waits: a full queue loses the newest command and a closed
/// queue is removed.
#[derive(Debug, Default)]
pub struct CommandRouter {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    next_id: AtomicU64,
}

impl CommandRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `sender` as a listener for commands prefixed with `prefix`.
    pub async fn register(&self, prefix: impl Into<String>, sender: mpsc::Sender<String>) -> ListenerId {
        let prefix = prefix.into();
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(%prefix, ?id, "listener registered");
        self.listeners
            .write()
            .await
            .entry(prefix)
            .or_default()
            .push(Listener { id, sender });
        id
    }

    /// Registers a new bounded queue for `prefix` and returns its receiver.
    pub async fn listen(
        &self,
        prefix: impl Into<String>,
        capacity: usize,
    ) -> (ListenerId, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (self.register(prefix, sender).await, receiver)
    }

    /// Removes a listener. Returns whether it was registered.
    pub async fn deregister(&self, prefix: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().await;
        let Some(sinks) = listeners.get_mut(prefix) else {
            return false;
        };
        let before = sinks.len();
        sinks.retain(|listener| listener.id != id);
        let removed = sinks.len() != before;
        if sinks.is_empty() {
            listeners.remove(prefix);
        }
        removed
    }

    /// Number of listeners registered for `prefix`.
    pub async fn listener_count(&self, prefix: &str) -> usize {
        self.listeners.read().await.get(prefix).map_or(0, Vec::len)
    }

    /// Parses `raw`, renders it against `event` and offers the body to every
    /// listener for its prefix.
    #[instrument(skip(self, event), level = "debug", fields(key = %event.key()))]
    pub async fn route(&self, raw: &str, event: &InputEvent) -> Result<RouteOutcome, CommandError> {
        let command = Command::parse(raw)?;
        if command.is_empty() {
            return Ok(RouteOutcome::Empty);
        }
        let body = command.render(event)?;
        let prefix = command.prefix();

        let mut delivered = 0;
        let mut dropped = 0;
        let mut closed = Vec::new();
        {
            let listeners = self.listeners.read().await;
            let Some(sinks) = listeners.get(prefix).filter(|sinks| !sinks.is_empty()) else {
                return Ok(RouteOutcome::NoListener {
                    prefix: prefix.to_string(),
                });
            };

            for listener in sinks {
                match listener.sender.try_send(body.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        dropped += 1;
                        warn!(prefix, id = ?listener.id, "listener queue full; dropping command");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dropped += 1;
                        closed.push(listener.id);
                    }
                }
            }
        }

        for id in closed {
            debug!(prefix, ?id, "pruning closed listener");
            self.deregister(prefix, id).await;
        }

        Ok(RouteOutcome::Dispatched {
            prefix: prefix.to_string(),
            delivered,
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::event::EventKey;

    fn press() -> InputEvent {
        InputEvent::new(EventKey::Press, 1, &[0x01])
    }

    #[tokio::test]
    async fn routes_only_to_matching_prefix() {
        let router = CommandRouter::new();
        let (_, mut fhem) = router.listen("fhem", 4).await;
        let (_, mut nuimo) = router.listen("nuimo", 4).await;

        let outcome = router
            .route("fhem:set lamp on", &press())
            .await
            .expect("command should route");

        assert_eq!(
            RouteOutcome::Dispatched {
                prefix: "fhem".to_string(),
                delivered: 1,
                dropped: 0
            },
            outcome
        );
        assert_eq!(Some("set lamp on".to_string()), fhem.recv().await);
        assert_matches!(nuimo.try_recv(), Err(mpsc::error::TryRecvError::Empty));
    }

    #[tokio::test]
    async fn fans_out_to_every_listener_for_prefix() {
        let router = CommandRouter::new();
        let (_, mut first) = router.listen("fhem", 4).await;
        let (_, mut second) = router.listen("fhem", 4).await;

        router
            .route("fhem:set lamp {{ value }}", &press())
            .await
            .expect("command should route");

        assert_eq!(Some("set lamp 1".to_string()), first.recv().await);
        assert_eq!(Some("set lamp 1".to_string()), second.recv().await);
    }

    #[tokio::test]
    async fn blank_template_is_not_dispatched() {
        let router = CommandRouter::new();
        let (_, mut empty) = router.listen("empty", 4).await;

        let outcome = router.route("  ", &press()).await.expect("blank should route");

        assert_eq!(RouteOutcome::Empty, outcome);
        assert_matches!(empty.try_recv(), Err(mpsc::error::TryRecvError::Empty));
    }

    #[tokio::test]
    async fn reports_missing_separator_and_missing_listener() {
        let router = CommandRouter::new();
        let (_, mut whole) = router.listen("set lamp on", 4).await;
        let (_, mut head) = router.listen("set", 4).await;
        let (_, mut empty) = router.listen("empty", 4).await;

        assert_matches!(
            router.route("set lamp on", &press()).await,
            Err(CommandError::MissingSeparator { .. })
        );
        for receiver in [&mut whole, &mut head, &mut empty] {
            assert_matches!(receiver.try_recv(), Err(mpsc::error::TryRecvError::Empty));
        }
        assert_eq!(
            RouteOutcome::NoListener {
                prefix: "hue".to_string()
            },
            router
                .route("hue:on", &press())
                .await
                .expect("command should route")
        );
    }

    #[tokio::test]
    async fn render_failure_dispatches_nothing() {
        let router = CommandRouter::new();
        let (_, mut fhem) = router.listen("fhem", 4).await;

        assert_matches!(
            router.route("fhem:set lamp {{ colour }}", &press()).await,
            Err(CommandError::UnknownField { .. })
        );
        assert_matches!(fhem.try_recv(), Err(mpsc::error::TryRecvError::Empty));
    }

    #[tokio::test]
    async fn full_queue_drops_newest_without_blocking() {
        let router = CommandRouter::new();
        let (_, mut fhem) = router.listen("fhem", 1).await;

        router.route("fhem:first", &press()).await.expect("first routes");
        let outcome = router.route("fhem:second", &press()).await.expect("second routes");

        assert_eq!(
            RouteOutcome::Dispatched {
                prefix: "fhem".to_string(),
                delivered: 0,
                dropped: 1
            },
            outcome
        );
        assert_eq!(Some("first".to_string()), fhem.recv().await);
        assert_matches!(fhem.try_recv(), Err(mpsc::error::TryRecvError::Empty));
    }

    #[tokio::test]
    async fn closed_listeners_are_pruned() {
        let router = CommandRouter::new();
        let (_, receiver) = router.listen("fhem", 1).await;
        drop(receiver);

        router.route("fhem:set lamp on", &press()).await.expect("command routes");

        assert_eq!(0, router.listener_count("fhem").await);
    }

    #[tokio::test]
    async fn deregister_removes_only_named_listener() {
        let router = CommandRouter::new();
        let (first, _first_rx) = router.listen("fhem", 1).await;
        let (_second, _second_rx) = router.listen("fhem", 1).await;

        assert!(router.deregister("fhem", first).await);
        assert!(!router.deregister("fhem", first).await);
        assert_eq!(1, router.listener_count("fhem").await);
    }
}
