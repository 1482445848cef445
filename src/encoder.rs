use std::io::Write;

use log::warn;
use serde_derive::{Deserialize, Serialize};

use crate::messages::{PresenceEvent, Transition};

/// Label written before each message on the debug sink.
pub const DEBUG_LABEL: &str = "JSON sent: ";

/// Record sent to the collector. Field order is part of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyMessage {
    pub room: String,
    pub key: String,
    pub state: Transition,
}

impl From<&PresenceEvent> for KeyMessage {
    fn from(event: &PresenceEvent) -> Self {
        KeyMessage {
            room: event.room.clone(),
            key: event.key.to_string(),
            state: event.transition,
        }
    }
}

/// Encodes an event as a single-line JSON object without the terminator.
pub fn encode(event: &PresenceEvent) -> serde_json::Result<String> {
    serde_json::to_string(&KeyMessage::from(event))
}

/// Decodes one record, with or without its line terminator.
pub fn decode(line: &str) -> serde_json::Result<KeyMessage> {
    serde_json::from_str(line.trim_end_matches(['\r', '\n']))
}

/// Writes each event to the collector link and echoes it to a debug console.
///
/// Neither write is acknowledged or retried; failures are logged and dropped.
pub struct EventSink<T, D> {
    transport: T,
    debug: D,
}

impl<T: Write, D: Write> EventSink<T, D> {
    pub fn new(transport: T, debug: D) -> Self {
        EventSink { transport, debug }
    }

    pub fn emit(&mut self, event: &PresenceEvent) {
        let message = match encode(event) {
            Ok(message) => message,
            Err(err) => {
                warn!("Error encoding {:?}: {:?}", event, err);
                return;
            }
        };

        if let Err(err) = writeln!(self.transport, "{message}").and_then(|()| self.transport.flush())
        {
            warn!("Error writing to transport: {:?}", err);
        }

        if let Err(err) = writeln!(self.debug, "{DEBUG_LABEL}{message}") {
            warn!("Error writing to debug sink: {:?}", err);
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> (T, D) {
        (self.transport, self.debug)
    }
}
