//! Per-navigation event log.
//!
//! The store is written by the interception layer and read by the wait
//! protocol. Both sides share one `Arc<Mutex<..>>`; the lock is never held
//! across an `.await`, and every read returns a snapshot copy.
//!
//! Each [`reset`](EventStore::reset) starts a new generation. Writes carry
//! the generation they were captured under, and writes from an older
//! generation are dropped, so a request still in flight from the previous
//! page can never satisfy a wait on the current one.

use crate::event::{AnalyticsEvent, CapturedRequest};
use indexmap::IndexSet;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct CaptureState {
    generation: u64,
    events: Vec<AnalyticsEvent>,
    requests: Vec<CapturedRequest>,
    notes: Vec<String>,
}

/// Thread-safe, append-only analytics event log for one page lifetime.
///
/// Cheaply cloneable; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    state: Arc<Mutex<CaptureState>>,
}

impl EventStore {
    /// Creates an empty store at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        // A panic while holding the lock cannot leave a batch half-written
        // (appends are a single `extend`), so the data is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discards everything and starts a new generation, which is returned.
    pub fn reset(&self) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        state.events.clear();
        state.requests.clear();
        state.notes.clear();
        state.generation
    }

    /// The current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Appends a decoded batch to the current generation.
    ///
    /// Returns the number of events appended.
    pub fn append_batch(&self, events: Vec<AnalyticsEvent>) -> usize {
        let mut state = self.lock();
        let count = events.len();
        state.events.extend(events);
        count
    }

    /// Appends a batch captured under `generation`.
    ///
    /// Returns false, appending nothing, if the store has been reset since.
    pub fn append_batch_for(&self, generation: u64, events: Vec<AnalyticsEvent>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.events.extend(events);
        true
    }

    /// Records a request and its decoded batch in one step.
    ///
    /// Returns false if `generation` is stale.
    pub fn record_request(
        &self,
        generation: u64,
        request: CapturedRequest,
        events: Vec<AnalyticsEvent>,
    ) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.requests.push(request);
        state.events.extend(events);
        true
    }

    /// Adds a diagnostic note to the current generation.
    pub fn note(&self, note: impl Into<String>) {
        self.lock().notes.push(note.into());
    }

    /// Adds a diagnostic note if `generation` is current.
    pub fn note_for(&self, generation: u64, note: impl Into<String>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.notes.push(note.into());
        true
    }

    /// Snapshot of captured events in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.lock().events.clone()
    }

    /// Snapshot of captured ingestion requests.
    #[must_use]
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.lock().requests.clone()
    }

    /// Snapshot of diagnostic notes.
    #[must_use]
    pub fn notes(&self) -> Vec<String> {
        self.lock().notes.clone()
    }

    /// Distinct event types in first-seen order.
    #[must_use]
    pub fn event_types(&self) -> IndexSet<String> {
        self.lock()
            .events
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summary of the current generation for debug output.
    #[must_use]
    pub fn diagnostics(&self) -> CaptureDiagnostics {
        let state = self.lock();
        let mut event_types = IndexSet::new();
        for event in &state.events {
            event_types.insert(event.event_type.clone());
        }

        CaptureDiagnostics {
            generation: state.generation,
            request_count: state.requests.len(),
            event_count: state.events.len(),
            event_types: event_types.into_iter().collect(),
            notes: state.notes.clone(),
        }
    }
}

/// Point-in-time summary of an [`EventStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureDiagnostics {
    pub generation: u64,
    pub request_count: usize,
    pub event_count: usize,
    pub event_types: Vec<String>,
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CapturedBody, Transport};
    use std::time::SystemTime;

    fn events(types: &[&str]) -> Vec<AnalyticsEvent> {
        types.iter().map(|t| AnalyticsEvent::new(*t)).collect()
    }

    #[test]
    fn reset_empties_and_bumps_generation() {
        let store = EventStore::new();
        assert_eq!(store.generation(), 0);
        store.append_batch(events(&["A"]));
        store.note("hello");

        let generation = store.reset();

        assert_eq!(generation, 1);
        assert!(store.is_empty());
        assert!(store.notes().is_empty());
        assert!(store.requests().is_empty());
    }

    #[test]
    fn stale_generation_writes_are_dropped() {
        let store = EventStore::new();
        let old = store.reset();
        let current = store.reset();

        assert!(!store.append_batch_for(old, events(&["Stale"])));
        assert!(!store.note_for(old, "stale"));
        assert!(store.append_batch_for(current, events(&["Fresh"])));

        let types: Vec<_> = store.event_types().into_iter().collect();
        assert_eq!(types, ["Fresh"]);
        assert!(store.notes().is_empty());
    }

    #[test]
    fn record_request_for_stale_generation_keeps_nothing() {
        let store = EventStore::new();
        let old = store.reset();
        store.reset();
        let request = CapturedRequest {
            transport: Transport::Fetch,
            url: "https://api2.amplitude.com/2/httpapi".into(),
            body: CapturedBody::Absent,
            received_at: SystemTime::now(),
            event_count: 1,
        };

        assert!(!store.record_request(old, request, events(&["Late"])));
        assert!(store.requests().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn batches_append_in_order() {
        let store = EventStore::new();
        store.append_batch(events(&["A", "B"]));
        store.append_batch(events(&["C", "A"]));

        let seen: Vec<_> = store.events().into_iter().map(|e| e.event_type).collect();
        assert_eq!(seen, ["A", "B", "C", "A"]);
        let types: Vec<_> = store.event_types().into_iter().collect();
        assert_eq!(types, ["A", "B", "C"]);
    }

    #[test]
    fn snapshots_are_stable_without_new_activity() {
        let store = EventStore::new();
        store.append_batch(events(&["A", "B"]));
        assert_eq!(store.events(), store.events());
    }

    #[test]
    fn diagnostics_summarize_current_generation() {
        let store = EventStore::new();
        let generation = store.reset();
        let request = CapturedRequest {
            transport: Transport::Beacon,
            url: "https://api2.amplitude.com/2/httpapi".into(),
            body: CapturedBody::Absent,
            received_at: SystemTime::now(),
            event_count: 2,
        };
        assert!(store.record_request(generation, request, events(&["A", "A"])));
        store.note("sendBeacon -> ingestion endpoint");

        let diagnostics = store.diagnostics();
        assert_eq!(diagnostics.generation, 1);
        assert_eq!(diagnostics.request_count, 1);
        assert_eq!(diagnostics.event_count, 2);
        assert_eq!(diagnostics.event_types, ["A"]);
        assert_eq!(diagnostics.notes.len(), 1);
    }
}
