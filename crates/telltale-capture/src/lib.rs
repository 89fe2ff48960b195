//! # telltale-capture
//!
//! Captures analytics events a page sends to its collector, and lets tests
//! wait for them.
//!
//! ## Architecture
//!
//! - **IngestionEndpoint / decoder**: recognizes calls to the collector's
//!   event-ingestion API and decodes `{ "events": [...] }` envelopes
//! - **Interceptor / CapturingTransport**: observes outbound calls and
//!   forwards them untouched
//! - **HookSession**: routes reports from an in-page hook to the document
//!   that sent them, resetting the store when the page loads a new document
//! - **EventStore**: per-navigation, append-only log of decoded events
//! - **wait_for_event / wait_for_any_event**: poll the store until a matching
//!   event arrives or the deadline passes
//!
//! Nothing here knows about browsers. `telltale-browser` feeds a hook session
//! from a hook script running inside Chrome.
//!
//! ## Example Usage
//!
//! ```ignore
//! use telltale_capture::{
//!     CapturingTransport, EventStore, IngestionEndpoint, Interceptor, WaitRequest,
//! };
//!
//! let store = EventStore::new();
//! let transport = CapturingTransport::new(
//!     my_transport,
//!     Interceptor::install(IngestionEndpoint::default(), store.clone()),
//! );
//!
//! // ...code under test sends analytics through `transport`...
//!
//! let event = WaitRequest::event("Viewed Page")
//!     .matching(|e| e.property_eq("page_url_path", "/education"))
//!     .within(Duration::from_secs(5))
//!     .wait(&store)
//!     .await?;
//! ```
//!
//! ## Failure reporting
//!
//! A wait that misses its deadline fails with
//! [`CaptureError::CaptureTimeout`], which lists the event types that were
//! seen and says whether nothing arrived, the wrong types arrived, or the
//! right type arrived but the predicate rejected it.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod decoder;
pub mod error;
pub mod event;
pub mod intercept;
pub mod store;
pub mod wait;

// Re-export main types for convenience
pub use decoder::{Envelope, IngestionEndpoint, decode_envelope, decode_events};
pub use error::{CaptureError, DecodeError, PredicateError, Result, TimeoutCause, TransportWrapError};
pub use event::{
    AnalyticsEvent, CapturedBody, CapturedRequest, EventProperties, PropertyValue, Transport,
};
pub use intercept::{
    CaptureOutcome, CapturingTransport, HookSession, Interceptor, OutboundBody, OutboundTransport,
    RequestDescriptor, RequestInit, RequestTarget,
};
pub use store::{CaptureDiagnostics, EventStore};
pub use wait::{
    DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, EVENT_POLL_INTERVAL, EVENT_TIMEOUT, EventPredicate,
    EventTypes, WaitConfig, WaitRequest, wait_for, wait_for_any_event, wait_for_event,
    wait_for_events, wait_for_result,
};
