use strum_macros::{AsRefStr, Display, EnumString, IntoStaticStr};

/// Semantic name of an input event.
///
/// The snake_case string form is the key used in scene configuration.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, AsRefStr, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum EventKey {
    Press,
    Release,
    Rotate,
    Swipe,
    SwipeLeft,
    SwipeRight,
    SwipeUp,
    SwipeDown,
    FlyLeft,
    FlyRight,
    FlyBackwards,
    FlyTowards,
    #[strum(to_string = "fly_updown")]
    FlyUpDown,
    Battery,
    Unknown,
    /// Synthetic event emitted after a link has been established.
    Connected,
    /// Synthetic event emitted when keepalive declares the link dead.
    Disconnected,
}

/// A decoded notification or synthetic connectivity signal.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InputEvent {
    key: EventKey,
    value: i64,
    raw: Vec<u8>,
}

impl InputEvent {
    pub(crate) fn new(key: EventKey, value: i64, raw: &[u8]) -> Self {
        Self {
            key,
            value,
            raw: raw.to_vec(),
        }
    }

    /// Creates an event that carries no payload.
    pub(crate) fn signal(key: EventKey) -> Self {
        Self {
            key,
            value: 0,
            raw: Vec::new(),
        }
    }

    /// Returns the semantic event key.
    #[must_use]
    pub fn key(&self) -> EventKey {
        self.key
    }

    /// Returns the signed magnitude; its meaning depends on the key.
    #[must_use]
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Returns the original notification payload.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(EventKey::SwipeLeft, "swipe_left")]
    #[case(EventKey::FlyUpDown, "fly_updown")]
    #[case(EventKey::FlyBackwards, "fly_backwards")]
    #[case(EventKey::Disconnected, "disconnected")]
    fn event_keys_use_configuration_names(#[case] key: EventKey, #[case] expected: &str) {
        assert_eq!(expected, key.as_ref());
        assert_eq!(Ok(key), expected.parse::<EventKey>());
    }
}
