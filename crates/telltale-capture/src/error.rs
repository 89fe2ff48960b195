//! Error types for capture and wait operations.
//!
//! Only [`CaptureError`] ever reaches a scenario. [`DecodeError`],
//! [`TransportWrapError`] and [`PredicateError`] are contained inside the
//! interception and wait layers: they are logged and recorded as diagnostic
//! notes, then treated as "nothing captured" or "no match".

use crate::wait::EventTypes;
use crate::event::EventProperties;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A body sent to the ingestion endpoint could not be turned into events.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON body: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("envelope is not a JSON object")]
    NotAnObject,

    #[error("non-text payload ({kind}) cannot be decoded")]
    NonText { kind: String },

    #[error("request has no body")]
    EmptyBody,
}

/// Inspecting an outbound call failed.
///
/// The call itself is still forwarded to the original transport.
#[derive(Debug, Error)]
pub enum TransportWrapError {
    /// The in-page hook sent a report the driver could not read.
    #[error("unreadable hook report: {0}")]
    MalformedReport(#[source] serde_json::Error),

    /// The in-page hook failed while inspecting a call.
    #[error("{transport} capture error: {message}")]
    HookFailed { transport: String, message: String },

    /// Capture code panicked while inspecting a call.
    #[error("{transport} capture panicked: {message}")]
    Panicked { transport: String, message: String },
}

/// A caller-supplied predicate panicked on one event.
#[derive(Debug, Error)]
#[error("predicate panicked on '{event_type}' event: {message}")]
pub struct PredicateError {
    pub event_type: String,
    pub message: String,
}

/// Why a wait reached its deadline.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeoutCause {
    /// Nothing at all was captured.
    NoEvents,
    /// Events were captured, none of a requested type.
    TypeAbsent,
    /// Events of a requested type were captured but the predicate rejected them all.
    PredicateMismatch {
        /// How many events of the requested type(s) were seen.
        candidates: usize,
        /// Properties of the first such event.
        sample: EventProperties,
    },
}

impl fmt::Display for TimeoutCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutCause::NoEvents => f.write_str("no analytics events were captured"),
            TimeoutCause::TypeAbsent => {
                f.write_str("no event of the requested type was captured")
            }
            TimeoutCause::PredicateMismatch { candidates, sample } => {
                let sample = serde_json::to_string(sample).unwrap_or_default();
                write!(
                    f,
                    "{candidates} event(s) of the requested type captured but none matched \
                     the predicate; first event properties: {sample}"
                )
            }
        }
    }
}

/// Errors surfaced by wait operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No satisfying analytics event arrived before the deadline.
    #[error(
        "analytics event not captured within {:?}: expected {}. Seen: {}. {}",
        .elapsed,
        .requested,
        join_or_none(.observed),
        .cause
    )]
    CaptureTimeout {
        requested: EventTypes,
        elapsed: Duration,
        /// Distinct event types seen during the wait, in first-seen order.
        observed: Vec<String>,
        cause: TimeoutCause,
    },

    /// A generic wait condition was not satisfied within the timeout.
    #[error("wait condition '{condition}' timed out after {timeout:?}")]
    WaitTimeout {
        condition: String,
        timeout: Duration,
    },
}

impl CaptureError {
    /// The timeout cause, if this is a capture timeout.
    #[must_use]
    pub fn timeout_cause(&self) -> Option<&TimeoutCause> {
        match self {
            CaptureError::CaptureTimeout { cause, .. } => Some(cause),
            CaptureError::WaitTimeout { .. } => None,
        }
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

/// A specialized Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_timeout_message_lists_observed_types() {
        let err = CaptureError::CaptureTimeout {
            requested: EventTypes::one("Viewed Page"),
            elapsed: Duration::from_millis(200),
            observed: vec!["Clicked Element".into(), "Played Video".into()],
            cause: TimeoutCause::TypeAbsent,
        };

        let message = err.to_string();
        assert!(message.contains("Viewed Page"));
        assert!(message.contains("Seen: Clicked Element, Played Video"));
        assert!(message.contains("no event of the requested type"));
    }

    #[test]
    fn capture_timeout_message_notes_nothing_seen() {
        let err = CaptureError::CaptureTimeout {
            requested: EventTypes::any_of(["Clicked CTA", "Clicked Link"]),
            elapsed: Duration::from_millis(200),
            observed: Vec::new(),
            cause: TimeoutCause::NoEvents,
        };

        let message = err.to_string();
        assert!(message.contains("one of: Clicked CTA, Clicked Link"));
        assert!(message.contains("Seen: (none)"));
    }

    #[test]
    fn predicate_mismatch_includes_sample() {
        let mut sample = EventProperties::new();
        sample.insert("page_url_path".into(), "/wrong-path".into());
        let cause = TimeoutCause::PredicateMismatch {
            candidates: 1,
            sample,
        };

        let text = cause.to_string();
        assert!(text.starts_with("1 event(s)"));
        assert!(text.contains(r#""page_url_path":"/wrong-path""#));
    }
}
