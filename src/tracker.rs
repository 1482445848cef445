use log::{info, warn};

use crate::messages::{EventKey, PresenceEvent, PresenceSample, TrackedState, Transition};

/// Compares this cycle's sample with the tracked state and returns the
/// arrival or departure it implies, if any.
///
/// `state.present` always ends up equal to `sample.present`. Departures carry
/// the `N/A` key even when the departing tag's identity is known.
pub fn update(
    room: &str,
    sample: PresenceSample,
    state: &mut TrackedState,
) -> Option<PresenceEvent> {
    let event = match (state.present, sample.present) {
        (false, true) => {
            let identity = match sample.identity {
                Some(identity) => identity,
                None if state.last_identity.as_bytes().is_empty() => {
                    warn!("Arrival without a fresh read and no tag seen yet, key will be empty");
                    state.last_identity.clone()
                }
                None => {
                    warn!("Arrival without a fresh read, reusing last known tag");
                    state.last_identity.clone()
                }
            };
            state.last_identity = identity.clone();
            Some(PresenceEvent {
                room: room.to_string(),
                key: EventKey::Tag(identity),
                transition: Transition::In,
            })
        }
        (true, false) => Some(PresenceEvent {
            room: room.to_string(),
            key: EventKey::NotAvailable,
            transition: Transition::Out,
        }),
        _ => None,
    };

    state.present = sample.present;

    if let Some(event) = &event {
        info!("Room {}: {} ({})", event.room, event.transition, event.key);
    }
    event
}
