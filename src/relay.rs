use log::{debug, info, warn};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _};

use crate::encoder;
use crate::mqtt::MqttClient;

/// Turns one record from the collector link into a JSON object.
///
/// Monitors send JSON objects; older firmware sends `ROOM:STATE`. Anything
/// else is forwarded untouched under `raw`. Blank records yield `None`.
pub fn parse_record(record: &str) -> Option<Map<String, Value>> {
    let record = record.trim();
    if record.is_empty() {
        return None;
    }

    if let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(record) {
        return Some(payload);
    }

    let mut payload = Map::new();
    let parts: Vec<_> = record.split(':').collect();
    if parts.len() >= 2 {
        payload.insert("room".to_string(), Value::from(parts[0]));
        payload.insert("state".to_string(), Value::from(parts[1]));
    } else {
        warn!("Unrecognised record {:?}, forwarding raw", record);
        payload.insert("raw".to_string(), Value::from(record));
    }
    Some(payload)
}

/// Room a record belongs to. Firmware with numeric room ids sends them as
/// JSON numbers.
pub fn room_of(payload: &Map<String, Value>) -> String {
    match payload.get("room") {
        Some(Value::String(room)) => room.clone(),
        Some(room @ (Value::Number(_) | Value::Bool(_))) => room.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Whether a JSON record is a well-formed key event from a monitor.
pub fn is_key_event(record: &str) -> bool {
    encoder::decode(record).is_ok()
}

/// Forwards every record read from `input` until it reaches end of stream.
pub async fn run<I>(mut input: I, client: &MqttClient) -> anyhow::Result<u64>
where
    I: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut forwarded = 0u64;

    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        // Line noise is dropped one record at a time
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(err) => {
                warn!("Dropping record that is not UTF-8: {}", err);
                continue;
            }
        };

        debug!("Received record: {}", line.trim_end());
        let Some(payload) = parse_record(line) else {
            continue;
        };

        if line.trim_start().starts_with('{') && !is_key_event(line) {
            warn!("Malformed key event {:?}, forwarding as-is", line.trim());
        }

        let room = room_of(&payload);
        let body = Value::Object(payload).to_string();
        match client.publish_status(&room, body).await {
            Ok(()) => {
                info!("Relayed status for room {}", room);
                forwarded += 1;
            }
            Err(err) => warn!("Error publishing status for room {}: {:?}", room, err),
        }
    }

    info!("Input closed after {} records", forwarded);
    Ok(forwarded)
}
