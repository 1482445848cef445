use std::fmt;
use std::str::FromStr;

use anyhow::{Context as _, bail};
use serde_derive::{Deserialize, Serialize};

/// Identity of a proximity tag, as read from the reader at selection time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagId(Vec<u8>);

impl TagId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        TagId(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Renders a UID as uppercase hex pairs joined by colons, e.g. `04:A3:9F:12`.
pub fn format_uid(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_uid(self.as_bytes()))
    }
}

impl FromStr for TagId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(TagId::default());
        }

        let bytes = s
            .split(':')
            .map(|pair| {
                if pair.len() != 2 {
                    bail!("expected two hex digits, got {pair:?}");
                }
                u8::from_str_radix(pair, 16).with_context(|| format!("invalid hex pair {pair:?}"))
            })
            .collect::<anyhow::Result<Vec<u8>>>()
            .with_context(|| format!("invalid tag id {s:?}"))?;

        Ok(TagId::new(bytes))
    }
}

/// One presence reading, produced fresh every cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PresenceSample {
    pub present: bool,
    /// Only set when the tag was freshly detected this cycle.
    pub identity: Option<TagId>,
}

impl PresenceSample {
    pub fn detected(identity: TagId) -> Self {
        PresenceSample {
            present: true,
            identity: Some(identity),
        }
    }

    pub fn still_present() -> Self {
        PresenceSample {
            present: true,
            identity: None,
        }
    }

    pub fn absent() -> Self {
        PresenceSample::default()
    }
}

/// Presence as of the end of the previous cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackedState {
    pub present: bool,
    pub last_identity: TagId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transition {
    In,
    Out,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::In => f.write_str("IN"),
            Transition::Out => f.write_str("OUT"),
        }
    }
}

/// Sentinel sent as the key of a departure; collectors match on it.
pub const KEY_NOT_AVAILABLE: &str = "N/A";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKey {
    Tag(TagId),
    NotAvailable,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKey::Tag(id) => fmt::Display::fmt(id, f),
            EventKey::NotAvailable => f.write_str(KEY_NOT_AVAILABLE),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresenceEvent {
    pub room: String,
    pub key: EventKey,
    pub transition: Transition,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uid() {
        assert_eq!(format_uid(&[0x04, 0xa3, 0x9f, 0x12]), "04:A3:9F:12");
        assert_eq!(format_uid(&[0x0a]), "0A");
        assert_eq!(format_uid(&[]), "");
    }

    #[test]
    fn test_tag_id_parse() {
        let id: TagId = "04:a3:9F:12".parse().unwrap();
        assert_eq!(id.as_bytes(), &[0x04, 0xa3, 0x9f, 0x12]);
        assert_eq!(id.to_string(), "04:A3:9F:12");
        assert_eq!("".parse::<TagId>().unwrap(), TagId::default());
    }

    #[test]
    fn test_tag_id_parse_rejects_malformed() {
        assert!("4:A3".parse::<TagId>().is_err());
        assert!("04:ZZ".parse::<TagId>().is_err());
        assert!("04A3".parse::<TagId>().is_err());
        assert!("04:".parse::<TagId>().is_err());
    }

    #[test]
    fn test_event_key_display() {
        let key = EventKey::Tag(TagId::new(vec![0xde, 0xad]));
        assert_eq!(key.to_string(), "DE:AD");
        assert_eq!(EventKey::NotAvailable.to_string(), "N/A");
    }

    #[test]
    fn test_tracked_state_default() {
        let state = TrackedState::default();
        assert!(!state.present);
        assert!(state.last_identity.as_bytes().is_empty());
    }
}
