use thiserror::Error;
use tracing::instrument;

use crate::event::{EventKey, InputEvent};

const CLICK_DOWN: u8 = 1;
const CLICK_UP: u8 = 0;

const DIR_LEFT: u64 = 0;
const DIR_RIGHT: u64 = 1;
const DIR_UP: u64 = 2;
const DIR_DOWN: u64 = 3;

const FLY_LEFT: u8 = 0;
const FLY_RIGHT: u8 = 1;
const FLY_BACKWARDS: u8 = 2;
const FLY_TOWARDS: u8 = 3;
const FLY_UPDOWN: u8 = 4;
const FLY_DISTANCE_OFFSET: usize = 2;

/// Role of the characteristic a notification arrived on.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum NotificationSource {
    Battery,
    DeviceInfo,
    Click,
    Rotate,
    Swipe,
    Fly,
    /// A characteristic the decoder has no rule for.
    Unrecognised,
}

/// Result of decoding one notification payload.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DecodedNotification {
    /// Zero or more routable input events, in emission order.
    Events(Vec<InputEvent>),
    /// Diagnostic device-info text. Never routed.
    DeviceInfo(String),
}

/// Errors returned while decoding notification payloads.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum NotificationDecodeError {
    #[error("{role:?} notification payload was empty")]
    EmptyPayload { role: NotificationSource },
    #[error("{role:?} notification needs at least {expected} bytes, got {actual}")]
    PayloadTooShort {
        role: NotificationSource,
        expected: usize,
        actual: usize,
    },
    #[error("{role:?} notification contains a truncated or oversized varint")]
    InvalidVarint { role: NotificationSource },
}

/// Decodes raw Nuimo notification payloads into typed events.
pub struct NotificationHandler;

impl NotificationHandler {
    /// Decodes one notification payload.
    ///
    /// ```
    /// use nuimo_bridge::{DecodedNotification, EventKey, NotificationHandler, NotificationSource};
    ///
    /// let decoded = NotificationHandler::decode(NotificationSource::Click, &[0x01])?;
    /// let DecodedNotification::Events(events) = decoded else { unreachable!() };
    /// assert_eq!(EventKey::Press, events[0].key());
    /// # Ok::<(), nuimo_bridge::NotificationDecodeError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is shorter than the source requires.
    #[instrument(skip(payload), level = "trace", fields(payload_len = payload.len()))]
    pub fn decode(
        source: NotificationSource,
        payload: &[u8],
    ) -> Result<DecodedNotification, NotificationDecodeError> {
        let events = match source {
            NotificationSource::Battery => {
                let level = read_uvarint(source, payload)?;
                vec![InputEvent::new(
                    EventKey::Battery,
                    saturating_i64(level),
                    payload,
                )]
            }
            NotificationSource::DeviceInfo => {
                return Ok(DecodedNotification::DeviceInfo(
                    String::from_utf8_lossy(payload).into_owned(),
                ));
            }
            NotificationSource::Click => decode_click(payload)?,
            NotificationSource::Rotate => decode_rotate(payload)?,
            NotificationSource::Swipe => decode_swipe(payload)?,
            NotificationSource::Fly => decode_fly(payload)?,
            NotificationSource::Unrecognised => {
                vec![InputEvent::new(EventKey::Unknown, 0, payload)]
            }
        };

        Ok(DecodedNotification::Events(events))
    }
}

fn decode_click(payload: &[u8]) -> Result<Vec<InputEvent>, NotificationDecodeError> {
    let Some(&state) = payload.first() else {
        return Err(NotificationDecodeError::EmptyPayload {
            role: NotificationSource::Click,
        });
    };

    let key = match state {
        CLICK_DOWN => EventKey::Press,
        CLICK_UP => EventKey::Release,
        _ => return Ok(Vec::new()),
    };
    Ok(vec![InputEvent::new(key, 0, payload)])
}

fn decode_rotate(payload: &[u8]) -> Result<Vec<InputEvent>, NotificationDecodeError> {
    let Some(bytes) = payload.first_chunk::<2>() else {
        return Err(NotificationDecodeError::PayloadTooShort {
            role: NotificationSource::Rotate,
            expected: 2,
            actual: payload.len(),
        });
    };

    let delta = i16::from_le_bytes(*bytes);
    Ok(vec![InputEvent::new(
        EventKey::Rotate,
        i64::from(delta),
        payload,
    )])
}

fn decode_swipe(payload: &[u8]) -> Result<Vec<InputEvent>, NotificationDecodeError> {
    let direction = read_uvarint(NotificationSource::Swipe, payload)?;
    let mut events = vec![InputEvent::new(
        EventKey::Swipe,
        saturating_i64(direction),
        payload,
    )];

    let directional = match direction {
        DIR_LEFT => Some(EventKey::SwipeLeft),
        DIR_RIGHT => Some(EventKey::SwipeRight),
        DIR_UP => Some(EventKey::SwipeUp),
        DIR_DOWN => Some(EventKey::SwipeDown),
        _ => None,
    };
    if let Some(key) = directional {
        events.push(InputEvent::new(key, 0, payload));
    }

    Ok(events)
}

fn decode_fly(payload: &[u8]) -> Result<Vec<InputEvent>, NotificationDecodeError> {
    if payload.len() < FLY_DISTANCE_OFFSET {
        return Err(NotificationDecodeError::PayloadTooShort {
            role: NotificationSource::Fly,
            expected: FLY_DISTANCE_OFFSET,
            actual: payload.len(),
        });
    }

    // A gesture without distance bytes reports distance 0.
    let tail = &payload[FLY_DISTANCE_OFFSET..];
    let distance = if tail.is_empty() {
        0
    } else {
        read_uvarint(NotificationSource::Fly, tail)?
    };
    let key = match payload[0] {
        FLY_LEFT => EventKey::FlyLeft,
        FLY_RIGHT => EventKey::FlyRight,
        FLY_BACKWARDS => EventKey::FlyBackwards,
        FLY_TOWARDS => EventKey::FlyTowards,
        FLY_UPDOWN => EventKey::FlyUpDown,
        _ => return Ok(Vec::new()),
    };
    Ok(vec![InputEvent::new(key, saturating_i64(distance), payload)])
}

/// Reads an unsigned LEB128 varint from the start of `payload`.
fn read_uvarint(role: NotificationSource, payload: &[u8]) -> Result<u64, NotificationDecodeError> {
    if payload.is_empty() {
        return Err(NotificationDecodeError::EmptyPayload { role });
    }

    let mut value = 0u64;
    for (index, byte) in payload.iter().enumerate() {
        let shift = 7 * index;
        if shift >= 64 || (shift == 63 && *byte > 1) {
            return Err(NotificationDecodeError::InvalidVarint { role });
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }

    Err(NotificationDecodeError::InvalidVarint { role })
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn events(source: NotificationSource, payload: &[u8]) -> Vec<(EventKey, i64)> {
        match NotificationHandler::decode(source, payload) {
            Ok(DecodedNotification::Events(events)) => events
                .iter()
                .map(|event| (event.key(), event.value()))
                .collect(),
            other => panic!("expected events, got {other:?}"),
        }
    }

    #[rstest]
    #[case(&[0x01], vec![(EventKey::Press, 0)])]
    #[case(&[0x00], vec![(EventKey::Release, 0)])]
    #[case(&[0x02], vec![])]
    fn click_maps_button_state(#[case] payload: &[u8], #[case] expected: Vec<(EventKey, i64)>) {
        assert_eq!(expected, events(NotificationSource::Click, payload));
    }

    #[rstest]
    #[case(&[0x14, 0x00], 20)]
    #[case(&[0xEC, 0xFF], -20)]
    #[case(&[0x00, 0x80], i64::from(i16::MIN))]
    fn rotate_reads_little_endian_signed_delta(#[case] payload: &[u8], #[case] expected: i64) {
        assert_eq!(
            vec![(EventKey::Rotate, expected)],
            events(NotificationSource::Rotate, payload)
        );
    }

    #[rstest]
    #[case(0, vec![(EventKey::Swipe, 0), (EventKey::SwipeLeft, 0)])]
    #[case(1, vec![(EventKey::Swipe, 1), (EventKey::SwipeRight, 0)])]
    #[case(2, vec![(EventKey::Swipe, 2), (EventKey::SwipeUp, 0)])]
    #[case(3, vec![(EventKey::Swipe, 3), (EventKey::SwipeDown, 0)])]
    #[case(99, vec![(EventKey::Swipe, 99)])]
    fn swipe_emits_generic_and_directional_events(
        #[case] code: u8,
        #[case] expected: Vec<(EventKey, i64)>,
    ) {
        assert_eq!(expected, events(NotificationSource::Swipe, &[code]));
    }

    #[rstest]
    #[case(&[0x00, 0x00, 0x05], vec![(EventKey::FlyLeft, 5)])]
    #[case(&[0x01, 0x00, 0x07], vec![(EventKey::FlyRight, 7)])]
    #[case(&[0x02, 0x00, 0x01], vec![(EventKey::FlyBackwards, 1)])]
    #[case(&[0x03, 0x00, 0x02], vec![(EventKey::FlyTowards, 2)])]
    #[case(&[0x04, 0x00, 0xAC, 0x02], vec![(EventKey::FlyUpDown, 300)])]
    #[case(&[0x09, 0x00, 0x01], vec![])]
    #[case(&[0x00, 0x05], vec![(EventKey::FlyLeft, 0)])]
    #[case(&[0x04, 0x00], vec![(EventKey::FlyUpDown, 0)])]
    fn fly_maps_direction_and_distance(
        #[case] payload: &[u8],
        #[case] expected: Vec<(EventKey, i64)>,
    ) {
        assert_eq!(expected, events(NotificationSource::Fly, payload));
    }

    #[test]
    fn battery_reports_level_and_keeps_raw_payload() {
        let decoded = NotificationHandler::decode(NotificationSource::Battery, &[0x55])
            .expect("battery payload should decode");
        let DecodedNotification::Events(events) = decoded else {
            panic!("battery should decode into events");
        };
        assert_eq!(1, events.len());
        assert_eq!(85, events[0].value());
        assert_eq!(&[0x55], events[0].raw());
    }

    #[test]
    fn device_info_is_diagnostic_text() {
        let decoded = NotificationHandler::decode(NotificationSource::DeviceInfo, b"Senic")
            .expect("device info should decode");
        assert_eq!(DecodedNotification::DeviceInfo("Senic".to_string()), decoded);
    }

    #[test]
    fn unrecognised_source_preserves_payload() {
        let decoded = NotificationHandler::decode(NotificationSource::Unrecognised, &[0xAA, 0x55])
            .expect("unrecognised payload should decode");
        let DecodedNotification::Events(events) = decoded else {
            panic!("unrecognised payload should decode into events");
        };
        assert_eq!(EventKey::Unknown, events[0].key());
        assert_eq!(&[0xAA, 0x55], events[0].raw());
    }

    #[rstest]
    #[case(NotificationSource::Battery, &[])]
    #[case(NotificationSource::Click, &[])]
    #[case(NotificationSource::Rotate, &[0x01])]
    #[case(NotificationSource::Swipe, &[])]
    #[case(NotificationSource::Fly, &[0x00])]
    #[case(NotificationSource::Fly, &[0x00, 0x00, 0x80])]
    #[case(NotificationSource::Battery, &[0x80, 0x80])]
    fn short_payloads_fail_closed(#[case] source: NotificationSource, #[case] payload: &[u8]) {
        let decoded = NotificationHandler::decode(source, payload);
        assert_matches!(decoded, Err(_));
    }

    #[test]
    fn overlong_varint_is_rejected() {
        let payload = [0xFF; 11];
        assert_matches!(
            read_uvarint(NotificationSource::Battery, &payload),
            Err(NotificationDecodeError::InvalidVarint { .. })
        );
    }
}
