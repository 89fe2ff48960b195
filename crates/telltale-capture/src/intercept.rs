//! Transparent interception of outbound analytics calls.
//!
//! Two entry points feed the same [`Interceptor`]:
//!
//! - [`CapturingTransport`] decorates any [`OutboundTransport`]: it inspects
//!   each call, then forwards it to the wrapped transport unchanged.
//! - [`HookSession::observe_report`] accepts JSON reports sent by an in-page
//!   hook that wraps `fetch` and `navigator.sendBeacon` in a real browser,
//!   and resets the store whenever the hook starts in a new top-level
//!   document.
//!
//! Inspection is infallible from the caller's point of view. Decode failures,
//! malformed reports and even panics are logged, recorded as notes in the
//! [`EventStore`], and otherwise ignored.

use crate::decoder::{IngestionEndpoint, decode_envelope};
use crate::error::{DecodeError, TransportWrapError};
use crate::event::{CapturedBody, CapturedRequest, Transport};
use crate::store::EventStore;
use async_trait::async_trait;
use indexmap::IndexSet;
use serde::Deserialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// First argument of a fetch-like call.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestTarget {
    Url(String),
    Request(RequestDescriptor),
}

impl RequestTarget {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            RequestTarget::Url(url) => url,
            RequestTarget::Request(request) => &request.url,
        }
    }
}

impl From<&str> for RequestTarget {
    fn from(url: &str) -> Self {
        RequestTarget::Url(url.to_string())
    }
}

impl From<String> for RequestTarget {
    fn from(url: String) -> Self {
        RequestTarget::Url(url)
    }
}

/// A request object passed in place of a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: String,
}

/// Options of a fetch-like call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInit {
    pub method: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<OutboundBody>,
}

impl RequestInit {
    /// A POST with a text body.
    #[must_use]
    pub fn post(body: impl Into<String>) -> Self {
        Self {
            method: Some("POST".to_string()),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(OutboundBody::Text(body.into())),
        }
    }
}

/// Body of an outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBody {
    Text(String),
    /// A structured object handed to the transport without serializing it first.
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl From<Option<&OutboundBody>> for CapturedBody {
    fn from(body: Option<&OutboundBody>) -> Self {
        match body {
            Some(OutboundBody::Text(text)) => CapturedBody::Text(text.clone()),
            Some(OutboundBody::Json(value)) => CapturedBody::Json(value.clone()),
            Some(OutboundBody::Bytes(_)) => CapturedBody::Opaque("bytes".to_string()),
            None => CapturedBody::Absent,
        }
    }
}

/// The two outbound primitives a page uses to send analytics.
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    /// Whatever the underlying fetch resolves to (often a `Result`).
    type Response: Send;

    /// A request/response call.
    async fn fetch(&self, target: RequestTarget, init: RequestInit) -> Self::Response;

    /// A fire-and-forget send; true if the payload was queued.
    fn send_beacon(&self, url: &str, data: Option<OutboundBody>) -> bool;
}

/// What happened to one observed call.
#[derive(Debug)]
pub enum CaptureOutcome {
    /// Not addressed to the ingestion endpoint.
    Ignored,
    /// Decoded and stored; holds the number of events appended.
    Captured(usize),
    /// Addressed to the endpoint but not decodable.
    Undecodable(DecodeError),
    /// Observed after the store moved on to a newer navigation.
    Stale,
    /// The hook started in a new top-level document; capture now belongs to it.
    DocumentStarted,
    /// The call could not be inspected.
    Failed(TransportWrapError),
}

impl CaptureOutcome {
    /// Number of events stored by this call.
    #[must_use]
    pub fn captured(&self) -> usize {
        match self {
            CaptureOutcome::Captured(count) => *count,
            _ => 0,
        }
    }
}

/// Decodes calls to the ingestion endpoint into one navigation's store.
///
/// An interceptor is bound to the store generation that was current when it
/// was installed. Once the store is reset again, everything it observes is
/// dropped as stale.
#[derive(Debug, Clone)]
pub struct Interceptor {
    endpoint: IngestionEndpoint,
    store: EventStore,
    generation: u64,
}

impl Interceptor {
    /// Resets `store` for a new navigation and binds to the fresh generation.
    #[must_use]
    pub fn install(endpoint: IngestionEndpoint, store: EventStore) -> Self {
        let generation = store.reset();
        debug!(generation, host = endpoint.host(), "Installed analytics capture");
        Self {
            endpoint,
            store,
            generation,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &IngestionEndpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Inspects a fetch-like call.
    pub fn observe_fetch(&self, target: &RequestTarget, init: &RequestInit) -> CaptureOutcome {
        self.guarded(Transport::Fetch, || {
            self.capture(Transport::Fetch, target.url(), init.body.as_ref().into())
        })
    }

    /// Inspects a beacon call.
    pub fn observe_beacon(&self, url: &str, data: Option<&OutboundBody>) -> CaptureOutcome {
        self.guarded(Transport::Beacon, || {
            self.capture(Transport::Beacon, url, data.into())
        })
    }

    /// Inspects a call reported by the in-page hook.
    ///
    /// `payload` is the JSON the hook passed to the runtime binding. Reports
    /// stamped with another generation are stale. Document boundaries are
    /// not tracked here; see [`HookSession`] for that.
    pub fn observe_report(&self, payload: &str) -> CaptureOutcome {
        let report = match self.parse_report(payload) {
            Ok(report) => report,
            Err(outcome) => return outcome,
        };
        if report.generation() != self.generation {
            debug!(
                generation = report.generation(),
                current = self.generation,
                "Dropping stale hook report"
            );
            return CaptureOutcome::Stale;
        }
        self.handle_report(report)
    }

    fn parse_report(&self, payload: &str) -> Result<HookReport, CaptureOutcome> {
        serde_json::from_str::<HookReport>(payload).map_err(|e| {
            let err = TransportWrapError::MalformedReport(e);
            warn!("Ignoring hook report: {}", err);
            self.store.note_for(self.generation, err.to_string());
            CaptureOutcome::Failed(err)
        })
    }

    /// Handles a report already known to belong to this interceptor.
    fn handle_report(&self, report: HookReport) -> CaptureOutcome {
        match report {
            HookReport::Document { .. } => CaptureOutcome::Ignored,
            HookReport::Note { message, .. } => {
                if !self.store.note_for(self.generation, message) {
                    return CaptureOutcome::Stale;
                }
                CaptureOutcome::Ignored
            }
            HookReport::Error {
                transport, message, ..
            } => {
                let err = TransportWrapError::HookFailed {
                    transport: transport.to_string(),
                    message,
                };
                if !self.store.note_for(self.generation, err.to_string()) {
                    return CaptureOutcome::Stale;
                }
                warn!("{}", err);
                CaptureOutcome::Failed(err)
            }
            HookReport::Call {
                transport,
                url,
                body,
                body_kind,
                ..
            } => {
                let body = CapturedBody::from_report(body, body_kind.as_deref());
                self.guarded(transport, || self.capture(transport, &url, body))
            }
        }
    }

    /// Runs an inspection, converting a panic into a recorded failure.
    fn guarded(&self, transport: Transport, inspect: impl FnOnce() -> CaptureOutcome) -> CaptureOutcome {
        match catch_unwind(AssertUnwindSafe(inspect)) {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let err = TransportWrapError::Panicked {
                    transport: transport.to_string(),
                    message,
                };
                warn!("{}", err);
                self.store.note_for(self.generation, err.to_string());
                CaptureOutcome::Failed(err)
            }
        }
    }

    fn capture(&self, transport: Transport, url: &str, body: CapturedBody) -> CaptureOutcome {
        if !self.endpoint.matches(url) {
            return CaptureOutcome::Ignored;
        }

        let decoded = body.as_text().and_then(|text| decode_envelope(&text));

        let (events, outcome_err) = match decoded {
            Ok(envelope) => {
                if envelope.skipped > 0 {
                    debug!(skipped = envelope.skipped, "Skipped unusable envelope entries");
                }
                (envelope.events, None)
            }
            Err(err) => (Vec::new(), Some(err)),
        };

        let count = events.len();
        let note = match &outcome_err {
            None => format!("{transport} -> ingestion endpoint (parsed=true, events={count})"),
            Some(err) => format!("{transport} -> ingestion endpoint (parsed=false: {err})"),
        };

        let request = CapturedRequest {
            transport,
            url: url.to_string(),
            body,
            received_at: SystemTime::now(),
            event_count: count,
        };

        if !self.store.record_request(self.generation, request, events) {
            debug!(generation = self.generation, "Dropping {} capture for a previous navigation", transport);
            return CaptureOutcome::Stale;
        }
        self.store.note_for(self.generation, note);

        match outcome_err {
            None => {
                debug!(%transport, count, "Captured analytics batch");
                CaptureOutcome::Captured(count)
            }
            Some(err) => {
                debug!(%transport, "Ingestion request not decodable: {}", err);
                CaptureOutcome::Undecodable(err)
            }
        }
    }
}

/// A message from the in-page hook.
///
/// `document` is set only by hooks running in a top-level document.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum HookReport {
    Document {
        generation: u64,
        document: String,
        #[serde(default)]
        url: Option<String>,
    },
    Call {
        generation: u64,
        #[serde(default)]
        document: Option<String>,
        transport: Transport,
        url: String,
        #[serde(default)]
        body: serde_json::Value,
        #[serde(default)]
        body_kind: Option<String>,
    },
    Note {
        generation: u64,
        #[serde(default)]
        document: Option<String>,
        message: String,
    },
    Error {
        generation: u64,
        #[serde(default)]
        document: Option<String>,
        transport: Transport,
        message: String,
    },
}

impl HookReport {
    fn generation(&self) -> u64 {
        match self {
            HookReport::Document { generation, .. }
            | HookReport::Call { generation, .. }
            | HookReport::Note { generation, .. }
            | HookReport::Error { generation, .. } => *generation,
        }
    }

    fn document(&self) -> Option<&str> {
        match self {
            HookReport::Document { document, .. } => Some(document.as_str()),
            HookReport::Call { document, .. }
            | HookReport::Note { document, .. }
            | HookReport::Error { document, .. } => document.as_deref(),
        }
    }
}

/// Routes in-page hook reports to the document that sent them.
///
/// A session spans one installed hook script, which runs again in every
/// document the page loads, including ones the page navigates to by itself.
/// The hook announces each top-level document before reporting any call from
/// it. When a new document is announced the session re-installs its
/// [`Interceptor`], resetting the store, so events from the page that was
/// left can never satisfy a wait on the page that replaced it. Reports from a
/// document that was left, or from an older hook script, are stale.
#[derive(Debug)]
pub struct HookSession {
    endpoint: IngestionEndpoint,
    store: EventStore,
    hook_generation: u64,
    state: Mutex<SessionState>,
}

#[derive(Debug)]
struct SessionState {
    interceptor: Interceptor,
    document: Option<String>,
    retired: IndexSet<String>,
}

impl HookSession {
    /// Resets `store` and starts a session for a freshly installed hook.
    #[must_use]
    pub fn start(endpoint: IngestionEndpoint, store: EventStore) -> Self {
        let interceptor = Interceptor::install(endpoint.clone(), store.clone());
        Self {
            hook_generation: interceptor.generation(),
            endpoint,
            store,
            state: Mutex::new(SessionState {
                interceptor,
                document: None,
                retired: IndexSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The generation the hook script must stamp on its reports.
    #[must_use]
    pub fn hook_generation(&self) -> u64 {
        self.hook_generation
    }

    #[must_use]
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// The interceptor for the current document.
    #[must_use]
    pub fn interceptor(&self) -> Interceptor {
        self.lock().interceptor.clone()
    }

    /// Id of the current top-level document, once the hook announced one.
    #[must_use]
    pub fn document(&self) -> Option<String> {
        self.lock().document.clone()
    }

    /// Handles one JSON report from the hook.
    pub fn observe_report(&self, payload: &str) -> CaptureOutcome {
        let mut guard = self.lock();
        let state = &mut *guard;

        let report = match state.interceptor.parse_report(payload) {
            Ok(report) => report,
            Err(outcome) => return outcome,
        };
        if report.generation() != self.hook_generation {
            debug!(
                generation = report.generation(),
                current = self.hook_generation,
                "Dropping report from a previous hook"
            );
            return CaptureOutcome::Stale;
        }

        if let HookReport::Document { document, url, .. } = report {
            return self.enter_document(state, document, url.as_deref());
        }

        if let Some(sent) = report.document() {
            if state.retired.contains(sent) {
                debug!(document = sent, "Dropping report from a document that was left");
                return CaptureOutcome::Stale;
            }
            match state.document.as_deref() {
                Some(current) if current != sent => {
                    debug!(document = sent, current, "Dropping report from another document");
                    return CaptureOutcome::Stale;
                }
                Some(_) => {}
                None => state.document = Some(sent.to_string()),
            }
        }

        state.interceptor.handle_report(report)
    }

    fn enter_document(
        &self,
        state: &mut SessionState,
        document: String,
        url: Option<&str>,
    ) -> CaptureOutcome {
        if state.retired.contains(&document) {
            return CaptureOutcome::Stale;
        }

        match state.document.take() {
            Some(current) if current == document => {
                state.document = Some(current);
                return CaptureOutcome::Ignored;
            }
            Some(previous) => {
                state.retired.insert(previous);
                state.interceptor = Interceptor::install(self.endpoint.clone(), self.store.clone());
                info!(url, "Page navigated; capture reset for the new document");
            }
            // The store was reset when the session started
            None => {}
        }

        let interceptor = &state.interceptor;
        let note = match url {
            Some(url) => format!("document started: {url}"),
            None => "document started".to_string(),
        };
        interceptor.store.note_for(interceptor.generation, note);
        state.document = Some(document);
        CaptureOutcome::DocumentStarted
    }
}

impl CapturedBody {
    /// Interprets a body as reported by the hook.
    ///
    /// Strings arrive verbatim, plain objects arrive as JSON, and anything the
    /// hook could not serialize arrives as `null` with its kind.
    fn from_report(body: serde_json::Value, kind: Option<&str>) -> Self {
        match (body, kind) {
            (serde_json::Value::String(text), _) => CapturedBody::Text(text),
            (serde_json::Value::Null, None | Some("none" | "undefined")) => CapturedBody::Absent,
            (serde_json::Value::Null, Some(kind)) => CapturedBody::Opaque(kind.to_string()),
            (value, _) => CapturedBody::Json(value),
        }
    }
}

/// Decorator that captures analytics calls and forwards every call unchanged.
#[derive(Debug, Clone)]
pub struct CapturingTransport<T> {
    inner: T,
    interceptor: Interceptor,
}

impl<T> CapturingTransport<T> {
    #[must_use]
    pub fn new(inner: T, interceptor: Interceptor) -> Self {
        Self { inner, interceptor }
    }

    #[must_use]
    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    #[must_use]
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Unwraps the original transport.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: OutboundTransport> OutboundTransport for CapturingTransport<T> {
    type Response = T::Response;

    async fn fetch(&self, target: RequestTarget, init: RequestInit) -> Self::Response {
        self.interceptor.observe_fetch(&target, &init);
        self.inner.fetch(target, init).await
    }

    fn send_beacon(&self, url: &str, data: Option<OutboundBody>) -> bool {
        self.interceptor.observe_beacon(url, data.as_ref());
        self.inner.send_beacon(url, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const INGEST: &str = "https://api2.amplitude.com/2/httpapi";

    fn interceptor() -> Interceptor {
        Interceptor::install(IngestionEndpoint::default(), EventStore::new())
    }

    #[test]
    fn install_resets_store() {
        let store = EventStore::new();
        store.append_batch(vec![crate::AnalyticsEvent::new("Old")]);

        let interceptor = Interceptor::install(IngestionEndpoint::default(), store.clone());

        assert!(store.is_empty());
        assert_eq!(interceptor.generation(), store.generation());
    }

    #[test]
    fn observe_fetch_accepts_request_descriptor() {
        let interceptor = interceptor();
        let target = RequestTarget::Request(RequestDescriptor {
            url: INGEST.to_string(),
            method: "POST".to_string(),
        });
        let init = RequestInit::post(r#"{"events":[{"event_type":"A"},{"event_type":"B"}]}"#);

        let outcome = interceptor.observe_fetch(&target, &init);

        assert_eq!(outcome.captured(), 2);
        assert_eq!(interceptor.store().requests().len(), 1);
    }

    #[test]
    fn observe_beacon_reserializes_object_bodies() {
        let interceptor = interceptor();
        let data = OutboundBody::Json(json!({"events": [{"event_type": "Played Video"}]}));

        let outcome = interceptor.observe_beacon(INGEST, Some(&data));

        assert_eq!(outcome.captured(), 1);
        assert_eq!(interceptor.store().events()[0].event_type, "Played Video");
    }

    #[test]
    fn binary_beacon_is_recorded_not_decoded() {
        let interceptor = interceptor();
        let outcome = interceptor.observe_beacon(INGEST, Some(&OutboundBody::Bytes(vec![1, 2])));

        assert!(matches!(
            outcome,
            CaptureOutcome::Undecodable(DecodeError::NonText { .. })
        ));
        assert!(interceptor.store().is_empty());
        assert_eq!(interceptor.store().requests().len(), 1);
        assert!(interceptor.store().notes()[0].contains("parsed=false"));
    }

    #[test]
    fn report_call_is_decoded() {
        let interceptor = interceptor();
        let payload = json!({
            "kind": "call",
            "generation": interceptor.generation(),
            "transport": "fetch",
            "url": INGEST,
            "body": r#"{"events":[{"event_type":"Viewed Page"}]}"#,
            "body_kind": "string"
        })
        .to_string();

        assert_eq!(interceptor.observe_report(&payload).captured(), 1);
    }

    #[test]
    fn report_from_previous_generation_is_stale() {
        let store = EventStore::new();
        let old = Interceptor::install(IngestionEndpoint::default(), store.clone());
        let current = Interceptor::install(IngestionEndpoint::default(), store.clone());
        let payload = json!({
            "kind": "call",
            "generation": old.generation(),
            "transport": "beacon",
            "url": INGEST,
            "body": r#"{"events":[{"event_type":"Viewed Page"}]}"#
        })
        .to_string();

        assert!(matches!(current.observe_report(&payload), CaptureOutcome::Stale));
        assert!(matches!(old.observe_report(&payload), CaptureOutcome::Stale));
        assert!(store.is_empty());
    }

    #[test]
    fn malformed_report_is_noted_not_raised() {
        let interceptor = interceptor();

        let outcome = interceptor.observe_report("{not json");

        assert!(matches!(
            outcome,
            CaptureOutcome::Failed(TransportWrapError::MalformedReport(_))
        ));
        assert_eq!(interceptor.store().notes().len(), 1);
    }

    #[test]
    fn hook_notes_and_errors_are_recorded() {
        let interceptor = interceptor();
        let generation = interceptor.generation();

        interceptor.observe_report(
            &json!({"kind": "note", "generation": generation, "message": "No window.fetch available to patch"})
                .to_string(),
        );
        interceptor.observe_report(
            &json!({"kind": "error", "generation": generation, "transport": "beacon", "message": "boom"})
                .to_string(),
        );

        let notes = interceptor.store().notes();
        assert_eq!(notes[0], "No window.fetch available to patch");
        assert_eq!(notes[1], "sendBeacon capture error: boom");
    }

    fn document_report(session: &HookSession, document: &str) -> String {
        json!({
            "kind": "document",
            "generation": session.hook_generation(),
            "document": document,
            "url": format!("https://www.example.org/{document}")
        })
        .to_string()
    }

    fn page_view_report(session: &HookSession, document: Option<&str>, path: &str) -> String {
        json!({
            "kind": "call",
            "generation": session.hook_generation(),
            "document": document,
            "transport": "fetch",
            "url": INGEST,
            "body": json!({
                "events": [{"event_type": "Viewed Page", "event_properties": {"page_url_path": path}}]
            })
            .to_string(),
            "body_kind": "string"
        })
        .to_string()
    }

    fn paths(store: &EventStore) -> Vec<String> {
        store
            .events()
            .iter()
            .filter_map(|e| e.str_property("page_url_path").map(str::to_string))
            .collect()
    }

    #[test]
    fn new_document_replaces_previous_documents_events() {
        let store = EventStore::new();
        let session = HookSession::start(IngestionEndpoint::default(), store.clone());

        assert!(matches!(
            session.observe_report(&document_report(&session, "first")),
            CaptureOutcome::DocumentStarted
        ));
        session.observe_report(&page_view_report(&session, Some("first"), "/first"));
        assert_eq!(paths(&store), ["/first"]);

        // The page followed a link on its own
        assert!(matches!(
            session.observe_report(&document_report(&session, "second")),
            CaptureOutcome::DocumentStarted
        ));
        assert!(store.is_empty());
        session.observe_report(&page_view_report(&session, Some("second"), "/second"));

        assert_eq!(paths(&store), ["/second"]);
        assert_eq!(session.document().as_deref(), Some("second"));
    }

    #[test]
    fn late_report_from_left_document_is_stale() {
        let store = EventStore::new();
        let session = HookSession::start(IngestionEndpoint::default(), store.clone());
        session.observe_report(&document_report(&session, "first"));
        session.observe_report(&document_report(&session, "second"));

        let late = session.observe_report(&page_view_report(&session, Some("first"), "/first"));

        assert!(matches!(late, CaptureOutcome::Stale));
        assert!(store.is_empty());
        assert!(matches!(
            session.observe_report(&document_report(&session, "first")),
            CaptureOutcome::Stale
        ));
        assert_eq!(session.document().as_deref(), Some("second"));
    }

    #[test]
    fn repeated_document_announcement_keeps_events() {
        let store = EventStore::new();
        let session = HookSession::start(IngestionEndpoint::default(), store.clone());
        session.observe_report(&document_report(&session, "only"));
        session.observe_report(&page_view_report(&session, Some("only"), "/only"));

        assert!(matches!(
            session.observe_report(&document_report(&session, "only")),
            CaptureOutcome::Ignored
        ));
        assert_eq!(paths(&store), ["/only"]);
    }

    #[test]
    fn frame_reports_without_document_join_current_document() {
        let store = EventStore::new();
        let session = HookSession::start(IngestionEndpoint::default(), store.clone());
        session.observe_report(&document_report(&session, "top"));

        let outcome = session.observe_report(&page_view_report(&session, None, "/embedded"));

        assert_eq!(outcome.captured(), 1);
        assert_eq!(paths(&store), ["/embedded"]);
    }

    #[test]
    fn session_drops_reports_from_older_hook() {
        let store = EventStore::new();
        let old = HookSession::start(IngestionEndpoint::default(), store.clone());
        let old_report = page_view_report(&old, Some("a"), "/old");
        let current = HookSession::start(IngestionEndpoint::default(), store.clone());

        assert!(matches!(current.observe_report(&old_report), CaptureOutcome::Stale));
        assert!(matches!(old.observe_report(&old_report), CaptureOutcome::Stale));
        assert!(store.is_empty());
        assert_eq!(current.interceptor().generation(), store.generation());
    }

    #[test]
    fn report_body_kinds() {
        assert_eq!(
            CapturedBody::from_report(json!(null), Some("blob")),
            CapturedBody::Opaque("blob".into())
        );
        assert_eq!(CapturedBody::from_report(json!(null), None), CapturedBody::Absent);
        assert_eq!(
            CapturedBody::from_report(json!({"events": []}), Some("object")),
            CapturedBody::Json(json!({"events": []}))
        );
    }
}
