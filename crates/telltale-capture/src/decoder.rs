//! Ingestion-endpoint matching and envelope decoding.
//!
//! The collector accepts batched envelopes of the form
//! `{ "api_key": "...", "events": [ { "event_type": "...", ... } ] }`.
//! Only `events` is consumed; everything here is a pure function of its
//! inputs.

use crate::error::DecodeError;
use crate::event::{AnalyticsEvent, CapturedBody, EventProperties, PropertyValue};
use serde_json::{Map, Value};
use telltale_config::{DEFAULT_COLLECTOR_HOST, DEFAULT_INGESTION_PATH, EndpointSettings};
use url::Url;

/// The collector's event-ingestion API.
///
/// A URL matches only when its host is the collector host (or a subdomain of
/// it) and its path contains the ingestion segment. Other APIs on the same
/// host, and the same path on other hosts, do not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionEndpoint {
    host: String,
    path: String,
}

impl IngestionEndpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into().trim().trim_end_matches('.').to_ascii_lowercase(),
            path: path.into().trim().to_string(),
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True if `url` is an absolute URL pointing at this endpoint.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };

        let host = host.to_ascii_lowercase();
        let host_ok = host == self.host
            || host
                .strip_suffix(self.host.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'));

        host_ok && parsed.path().contains(self.path.as_str())
    }
}

impl Default for IngestionEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTOR_HOST, DEFAULT_INGESTION_PATH)
    }
}

impl From<&EndpointSettings> for IngestionEndpoint {
    fn from(settings: &EndpointSettings) -> Self {
        Self::new(settings.host.clone(), settings.path.clone())
    }
}

/// A decoded request envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub api_key: Option<String>,
    /// Events in transmission order.
    pub events: Vec<AnalyticsEvent>,
    /// Entries in `events` that were not usable events.
    pub skipped: usize,
}

/// Parses an envelope body.
///
/// A missing or non-array `events` field yields an empty batch. Entries that
/// are not objects or lack a string `event_type` are skipped.
///
/// # Errors
///
/// Returns `DecodeError::MalformedJson` if the body is not JSON and
/// `DecodeError::NotAnObject` if the top level is not an object.
pub fn decode_envelope(body: &str) -> Result<Envelope, DecodeError> {
    let Value::Object(mut root) = serde_json::from_str::<Value>(body)? else {
        return Err(DecodeError::NotAnObject);
    };

    let api_key = match root.remove("api_key") {
        Some(Value::String(key)) => Some(key),
        _ => None,
    };

    let entries = match root.remove("events") {
        Some(Value::Array(entries)) => entries,
        _ => Vec::new(),
    };

    let total = entries.len();
    let events: Vec<AnalyticsEvent> = entries.into_iter().filter_map(event_from_value).collect();

    Ok(Envelope {
        api_key,
        skipped: total - events.len(),
        events,
    })
}

/// Decodes the events carried by a call, or nothing.
///
/// Returns an empty batch when the URL is not the ingestion endpoint or the
/// body cannot be decoded; never fails.
#[must_use]
pub fn decode_events(
    endpoint: &IngestionEndpoint,
    url: &str,
    body: &CapturedBody,
) -> Vec<AnalyticsEvent> {
    if !endpoint.matches(url) {
        return Vec::new();
    }

    body.as_text()
        .and_then(|text| decode_envelope(&text))
        .map(|envelope| envelope.events)
        .unwrap_or_default()
}

/// Builds an event from one envelope entry.
///
/// Metadata fields with an unexpected type are kept in `extra` rather than
/// rejecting the whole event.
fn event_from_value(value: Value) -> Option<AnalyticsEvent> {
    let Value::Object(mut fields) = value else {
        return None;
    };

    let event_type = match fields.remove("event_type") {
        Some(Value::String(event_type)) => event_type,
        _ => return None,
    };

    let event_properties: EventProperties = match fields.remove("event_properties") {
        Some(Value::Object(props)) => props
            .into_iter()
            .map(|(k, v)| (k, PropertyValue::from(v)))
            .collect(),
        _ => EventProperties::new(),
    };

    Some(AnalyticsEvent {
        event_type,
        event_properties,
        user_id: take_string(&mut fields, "user_id"),
        device_id: take_string(&mut fields, "device_id"),
        session_id: take_i64(&mut fields, "session_id"),
        time: take_i64(&mut fields, "time"),
        insert_id: take_string(&mut fields, "insert_id"),
        platform: take_string(&mut fields, "platform"),
        os_name: take_string(&mut fields, "os_name"),
        language: take_string(&mut fields, "language"),
        extra: fields,
    })
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    if !fields.get(key).is_some_and(Value::is_string) {
        return None;
    }
    match fields.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn take_i64(fields: &mut Map<String, Value>, key: &str) -> Option<i64> {
    let n = fields.get(key).and_then(Value::as_i64)?;
    fields.remove(key);
    Some(n)
}
