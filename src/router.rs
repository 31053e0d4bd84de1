//! Message Router (C4): classifies an inbound line as a response or an event.
//!
//! Factored out of the transport event loop as a pure function, deliberately testable without a
//! socket.

use serde_json::Value;
use uuid::Uuid;

use crate::frame::{EventName, RawFrame, WireError};

/// A classified response: the envelope has already been stripped — only `payload`/
/// `error` ever reach the caller.
#[derive(Debug, Clone)]
pub struct ClassifiedResponse {
    pub id: Uuid,
    pub result: Result<Value, WireError>,
}

/// A classified event, normalized to its name and payload.
#[derive(Debug, Clone)]
pub struct ClassifiedEvent {
    pub name: EventName,
    pub payload: Value,
}

/// The outcome of classifying one inbound line.
pub enum Classified {
    Response(ClassifiedResponse),
    Event(ClassifiedEvent),
    /// Frame was well-formed JSON but didn't match any known shape — dropped silently.
    Unrecognized,
}

/// Classifies a raw inbound line.
///
/// Order of classification:
/// 1. A string `id` that the registry recognizes (`is_pending`) → response path.
/// 2. `type:"event"` with a string `name` → normalized event.
/// 3. A legacy `type` field naming a known event → event, unchanged shape.
/// 4. Otherwise dropped.
///
/// Response normalization handles both the current shape (`{type:"res", id, ok, payload, error}`)
/// and the legacy shape (`{id, result, error}`): `ok` is used if present, else inferred as
/// `error.is_none()`; the value is `payload` if present, else `result`.
pub fn classify(line: &str, is_pending: impl Fn(Uuid) -> bool) -> Option<Classified> {
    let raw: RawFrame = serde_json::from_str(line).ok()?;

    if let Some(id) = parse_id(raw.id.as_ref()) {
        if is_pending(id) {
            let ok = raw.ok.unwrap_or_else(|| raw.error.is_none());
            let value = raw.payload.or(raw.result).unwrap_or(Value::Null);
            let result = if ok {
                Ok(value)
            } else {
                Err(raw.error.unwrap_or(WireError {
                    code: "UNKNOWN".to_owned(),
                    message: "request failed".to_owned(),
                }))
            };
            return Some(Classified::Response(ClassifiedResponse {
                id,
                result,
            }));
        }
    }

    if raw.kind.as_deref() == Some("event") {
        if let Some(name) = raw.name.as_deref().and_then(EventName::parse) {
            return Some(Classified::Event(ClassifiedEvent {
                name,
                payload: raw.payload.unwrap_or(Value::Null),
            }));
        }
        return Some(Classified::Unrecognized);
    }

    // Legacy shape: a bare `type` field naming a known event, with no `id`.
    if raw.id.is_none() {
        if let Some(name) = raw.kind.as_deref().and_then(EventName::parse) {
            return Some(Classified::Event(ClassifiedEvent {
                name,
                payload: raw.payload.unwrap_or(Value::Null),
            }));
        }
    }

    Some(Classified::Unrecognized)
}

fn parse_id(id: Option<&Value>) -> Option<Uuid> {
    id?.as_str().and_then(|s| Uuid::parse_str(s).ok())
}
