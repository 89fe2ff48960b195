//! Captured requests and the analytics events decoded from them.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use crate::error::DecodeError;

/// A single property value on an analytics event.
///
/// Properties are loosely typed on the wire; this closes them over the JSON
/// shapes predicates actually compare against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, from = "serde_json::Value")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<PropertyValue>),
    /// Nested objects are kept so logged payloads match the wire.
    Object(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// True if this is an array holding a string equal to `needle`.
    #[must_use]
    pub fn array_contains_str(&self, needle: &str) -> bool {
        self.as_array()
            .is_some_and(|items| items.iter().any(|v| v.as_str() == Some(needle)))
    }

    /// Scalar rendering used for free-text matching; `None` for containers and null.
    #[must_use]
    pub fn scalar_text(&self) -> Option<Cow<'_, str>> {
        match self {
            PropertyValue::String(s) => Some(Cow::Borrowed(s)),
            PropertyValue::Number(n) => Some(Cow::Owned(n.to_string())),
            PropertyValue::Bool(b) => Some(Cow::Owned(b.to_string())),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(b),
            Value::Number(n) => PropertyValue::Number(n),
            Value::String(s) => PropertyValue::String(s),
            Value::Array(items) => {
                PropertyValue::Array(items.into_iter().map(PropertyValue::from).collect())
            }
            Value::Object(map) => PropertyValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, PropertyValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Number(n.into())
    }
}

impl From<f64> for PropertyValue {
    /// Non-finite numbers have no JSON form and become `Null`.
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n).map_or(PropertyValue::Null, PropertyValue::Number)
    }
}

/// Property bag of an analytics event.
pub type EventProperties = BTreeMap<String, PropertyValue>;

/// One decoded telemetry record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_type: String,

    #[serde(default)]
    pub event_properties: EventProperties,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,

    /// Client timestamp in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Every other field the SDK sent.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AnalyticsEvent {
    /// Creates an event with no properties.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Self::default()
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.event_properties.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.event_properties.get(key)
    }

    /// String property, `None` if missing or not a string.
    #[must_use]
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(PropertyValue::as_str)
    }

    /// True if the property exists and equals `expected`.
    ///
    /// Numbers compare by value, so `5122762` matches `5122762.0`.
    #[must_use]
    pub fn property_eq(&self, key: &str, expected: impl Into<PropertyValue>) -> bool {
        let expected = expected.into();
        match (self.property(key), &expected) {
            (Some(PropertyValue::Number(a)), PropertyValue::Number(b)) => a.as_f64() == b.as_f64(),
            (Some(actual), _) => *actual == expected,
            (None, _) => false,
        }
    }

    /// Lower-cased string and number property values joined with spaces.
    ///
    /// Interaction payloads vary in which key carries the element text, so
    /// click predicates often search all of them.
    #[must_use]
    pub fn property_text(&self) -> String {
        self.event_properties
            .values()
            .filter(|v| matches!(v, PropertyValue::String(_) | PropertyValue::Number(_)))
            .filter_map(PropertyValue::scalar_text)
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Which outbound primitive carried a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// `fetch(input, init)`
    Fetch,
    /// `navigator.sendBeacon(url, data)`
    Beacon,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Fetch => f.write_str("fetch"),
            Transport::Beacon => f.write_str("sendBeacon"),
        }
    }
}

/// Request body as it was observed at the interception boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CapturedBody {
    Text(String),
    /// A non-string object body, re-serialized before decoding.
    Json(serde_json::Value),
    /// Blob, buffer, form data and similar; never decoded.
    Opaque(String),
    Absent,
}

impl CapturedBody {
    /// Returns the body as JSON text.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::EmptyBody` or `DecodeError::NonText` for bodies
    /// that cannot be parsed.
    pub fn as_text(&self) -> Result<Cow<'_, str>, DecodeError> {
        match self {
            CapturedBody::Text(text) => Ok(Cow::Borrowed(text)),
            CapturedBody::Json(value) => Ok(Cow::Owned(value.to_string())),
            CapturedBody::Opaque(kind) => Err(DecodeError::NonText { kind: kind.clone() }),
            CapturedBody::Absent => Err(DecodeError::EmptyBody),
        }
    }
}

/// An outbound call to the ingestion endpoint, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub transport: Transport,
    pub url: String,
    pub body: CapturedBody,
    pub received_at: SystemTime,
    /// Number of events decoded from the body.
    pub event_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn property_value_from_json_keeps_shape() {
        let value = PropertyValue::from(json!({
            "classes": ["video-modal", "btn"],
            "id": 5091193,
            "ok": true,
            "none": null,
        }));

        let PropertyValue::Object(map) = value else {
            panic!("expected object");
        };
        assert!(map["classes"].array_contains_str("video-modal"));
        assert_eq!(map["id"].as_i64(), Some(5_091_193));
        assert_eq!(map["ok"].as_bool(), Some(true));
        assert!(map["none"].is_null());
    }

    #[test]
    fn property_eq_compares_numbers_by_value() {
        let event = AnalyticsEvent::new("Viewed Page")
            .with_property("cse_entity_id", 5_122_762_i64)
            .with_property("current_time_seconds", 0.0);

        assert!(event.property_eq("cse_entity_id", 5_122_762_i64));
        assert!(event.property_eq("current_time_seconds", 0_i64));
        assert!(!event.property_eq("cse_entity_id", "5122762"));
        assert!(!event.property_eq("missing", true));
    }

    #[test]
    fn property_text_joins_scalars_lowercased() {
        let event = AnalyticsEvent::new("Clicked Element")
            .with_property("element_text", "See the lessons!")
            .with_property("element_classes", PropertyValue::Array(vec!["btn".into()]))
            .with_property("position", 3_i64);

        let text = event.property_text();
        assert!(text.contains("see the lessons!"));
        assert!(text.contains('3'));
        assert!(!text.contains("btn"));
    }

    #[test]
    fn captured_body_text_forms() {
        assert_eq!(CapturedBody::Text("{}".into()).as_text().unwrap(), "{}");
        assert_eq!(
            CapturedBody::Json(json!({"events": []})).as_text().unwrap(),
            r#"{"events":[]}"#
        );
        assert!(matches!(
            CapturedBody::Opaque("blob".into()).as_text(),
            Err(DecodeError::NonText { .. })
        ));
        assert!(matches!(
            CapturedBody::Absent.as_text(),
            Err(DecodeError::EmptyBody)
        ));
    }

    #[test]
    fn analytics_event_deserializes_with_extra_fields() {
        let event: AnalyticsEvent = serde_json::from_value(json!({
            "event_type": "Viewed Page",
            "event_properties": { "page_url_path": "/education" },
            "device_id": "abc",
            "library": "amplitude-ts/2.0.0"
        }))
        .unwrap();

        assert_eq!(event.str_property("page_url_path"), Some("/education"));
        assert_eq!(event.device_id.as_deref(), Some("abc"));
        assert_eq!(event.extra["library"], json!("amplitude-ts/2.0.0"));
    }
}
