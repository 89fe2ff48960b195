//! Waiting on captured analytics events.
//!
//! Telemetry reaches the store through a chain the driver cannot observe
//! directly: page load, SDK batching and flush, network send, interception.
//! Waits therefore poll the [`EventStore`] on a fixed interval until a match
//! appears or the deadline passes.
//!
//! # Design
//!
//! Every wait is a plain loop around `tokio::time::sleep` with a deadline
//! check. The last sleep is clamped to the remaining time, so a failing wait
//! returns close to its deadline rather than up to one interval late.
//! Dropping the future abandons the wait.

use crate::error::{CaptureError, PredicateError, Result, TimeoutCause};
use crate::event::AnalyticsEvent;
use crate::store::EventStore;
use indexmap::IndexSet;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;
use telltale_config::WaitSettings;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Default timeout for page-level wait operations (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default poll interval for page-level conditions (100ms).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default deadline for analytics event waits (60 seconds).
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default poll interval for analytics event waits (500ms).
pub const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration for wait operations.
///
/// Allows customizing timeout and poll interval for different scenarios.
/// For example, CI environments might need longer timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Maximum time to wait for the condition.
    pub timeout: Duration,

    /// How often to check if the condition is satisfied.
    pub poll_interval: Duration,
}

impl WaitConfig {
    /// Creates a new wait configuration.
    #[must_use]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Creates a config with custom timeout and default poll interval.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, DEFAULT_POLL_INTERVAL)
    }

    /// Defaults for analytics event waits: 60s deadline, 500ms interval.
    #[must_use]
    pub fn for_events() -> Self {
        Self::new(EVENT_TIMEOUT, EVENT_POLL_INTERVAL)
    }

    /// Event-wait defaults with a custom deadline.
    #[must_use]
    pub fn events_within(timeout: Duration) -> Self {
        Self::new(timeout, EVENT_POLL_INTERVAL)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

impl From<&WaitSettings> for WaitConfig {
    fn from(settings: &WaitSettings) -> Self {
        Self::new(settings.timeout(), settings.poll_interval())
    }
}

/// Time to sleep before the next poll, or `None` once the deadline has passed.
fn next_sleep(start: Instant, config: WaitConfig) -> Option<Duration> {
    let elapsed = start.elapsed();
    if elapsed >= config.timeout {
        return None;
    }
    Some(config.poll_interval.min(config.timeout - elapsed))
}

/// Waits for a condition to become true, with timeout.
///
/// The condition function is called repeatedly at `poll_interval` until
/// it returns true or the timeout expires.
///
/// # Errors
///
/// Returns `CaptureError::WaitTimeout` when the deadline passes.
pub async fn wait_for<F, Fut>(condition: F, config: WaitConfig, description: &str) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();

    loop {
        if condition().await {
            return Ok(());
        }

        match next_sleep(start, config) {
            Some(delay) => sleep(delay).await,
            None => {
                return Err(CaptureError::WaitTimeout {
                    condition: description.to_string(),
                    timeout: config.timeout,
                });
            }
        }
    }
}

/// Waits for a condition that returns a `Result<bool, E>`.
///
/// Similar to `wait_for`, but the condition can return errors.
/// If the condition returns an error, we continue waiting (the error
/// might be transient, like a page mid-navigation).
///
/// # Errors
///
/// Returns `CaptureError::WaitTimeout` when the deadline passes.
pub async fn wait_for_result<F, Fut, E>(
    condition: F,
    config: WaitConfig,
    description: &str,
) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<bool, E>>,
    E: fmt::Display,
{
    let start = Instant::now();

    loop {
        match condition().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => debug!("Wait condition '{}' errored, retrying: {}", description, e),
        }

        match next_sleep(start, config) {
            Some(delay) => sleep(delay).await,
            None => {
                return Err(CaptureError::WaitTimeout {
                    condition: description.to_string(),
                    timeout: config.timeout,
                });
            }
        }
    }
}

/// The event type, or set of acceptable types, a wait is looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypes(Vec<String>);

impl EventTypes {
    /// Exactly one acceptable type.
    #[must_use]
    pub fn one(event_type: impl Into<String>) -> Self {
        Self(vec![event_type.into()])
    }

    /// Any of several types.
    #[must_use]
    pub fn any_of<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(types.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn contains(&self, event_type: &str) -> bool {
        self.0.iter().any(|t| t == event_type)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for EventTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => f.write_str(single),
            types => write!(f, "one of: {}", types.join(", ")),
        }
    }
}

impl From<&str> for EventTypes {
    fn from(event_type: &str) -> Self {
        Self::one(event_type)
    }
}

impl From<String> for EventTypes {
    fn from(event_type: String) -> Self {
        Self::one(event_type)
    }
}

impl From<Vec<String>> for EventTypes {
    fn from(types: Vec<String>) -> Self {
        Self(types)
    }
}

impl From<&[&str]> for EventTypes {
    fn from(types: &[&str]) -> Self {
        Self::any_of(types.iter().copied())
    }
}

/// A check over one event's type-matched payload.
pub type EventPredicate = dyn Fn(&AnalyticsEvent) -> bool + Send + Sync;

/// Runs a predicate, treating a panic as "no match".
fn predicate_matches(predicate: &EventPredicate, event: &AnalyticsEvent) -> bool {
    match catch_unwind(AssertUnwindSafe(|| predicate(event))) {
        Ok(matched) => matched,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            let err = PredicateError {
                event_type: event.event_type.clone(),
                message,
            };
            debug!("{}", err);
            false
        }
    }
}

/// Result of checking one snapshot.
enum Scan {
    Found(AnalyticsEvent),
    Pending(TimeoutCause),
}

fn scan(events: &[AnalyticsEvent], types: &EventTypes, predicate: Option<&EventPredicate>) -> Scan {
    let mut candidates = events.iter().filter(|e| types.contains(&e.event_type));

    let Some(first) = candidates.next() else {
        return Scan::Pending(if events.is_empty() {
            TimeoutCause::NoEvents
        } else {
            TimeoutCause::TypeAbsent
        });
    };

    let Some(predicate) = predicate else {
        return Scan::Found(first.clone());
    };

    if predicate_matches(predicate, first) {
        return Scan::Found(first.clone());
    }

    let mut rejected = 1;
    for event in candidates {
        if predicate_matches(predicate, event) {
            return Scan::Found(event.clone());
        }
        rejected += 1;
    }

    Scan::Pending(TimeoutCause::PredicateMismatch {
        candidates: rejected,
        sample: first.event_properties.clone(),
    })
}

/// Waits for the first event of `event_type` satisfying `predicate`.
///
/// Resolves as soon as a match is in the store; the earliest-arrived match
/// wins. Panicking predicates count as "no match" for that event.
///
/// # Errors
///
/// Returns `CaptureError::CaptureTimeout` if no match arrives in time.
pub async fn wait_for_event(
    store: &EventStore,
    event_type: &str,
    predicate: Option<&EventPredicate>,
    config: WaitConfig,
) -> Result<AnalyticsEvent> {
    wait_for_matching(store, &EventTypes::one(event_type), predicate, config).await
}

/// Like [`wait_for_event`], accepting any of several event types.
///
/// # Errors
///
/// Returns `CaptureError::CaptureTimeout` if no match arrives in time.
pub async fn wait_for_any_event(
    store: &EventStore,
    types: &EventTypes,
    predicate: Option<&EventPredicate>,
    config: WaitConfig,
) -> Result<AnalyticsEvent> {
    wait_for_matching(store, types, predicate, config).await
}

async fn wait_for_matching(
    store: &EventStore,
    types: &EventTypes,
    predicate: Option<&EventPredicate>,
    config: WaitConfig,
) -> Result<AnalyticsEvent> {
    let start = Instant::now();
    let mut observed: IndexSet<String> = IndexSet::new();

    loop {
        let events = store.events();
        observed.extend(events.iter().map(|e| e.event_type.clone()));

        let cause = match scan(&events, types, predicate) {
            Scan::Found(event) => {
                debug!(event_type = %event.event_type, elapsed = ?start.elapsed(), "Matched analytics event");
                return Ok(event);
            }
            Scan::Pending(cause) => cause,
        };

        match next_sleep(start, config) {
            Some(delay) => sleep(delay).await,
            None => {
                // A reset mid-wait can leave an empty store after types were seen.
                let cause = match cause {
                    TimeoutCause::NoEvents if !observed.is_empty() => TimeoutCause::TypeAbsent,
                    cause => cause,
                };
                return Err(CaptureError::CaptureTimeout {
                    requested: types.clone(),
                    elapsed: start.elapsed(),
                    observed: observed.into_iter().collect(),
                    cause,
                });
            }
        }
    }
}

/// Waits until at least one event of any type has been captured.
///
/// # Errors
///
/// Returns `CaptureError::WaitTimeout` if the store stays empty.
pub async fn wait_for_events(store: &EventStore, config: WaitConfig) -> Result<Vec<AnalyticsEvent>> {
    wait_for(|| async { !store.is_empty() }, config, "any analytics event").await?;
    Ok(store.events())
}

/// A reusable description of an event wait.
///
/// ```ignore
/// let event = WaitRequest::event("Viewed Page")
///     .matching(|e| e.property_eq("page_url_path", "/education"))
///     .within(Duration::from_secs(10))
///     .wait(&store)
///     .await?;
/// ```
pub struct WaitRequest {
    types: EventTypes,
    predicate: Option<Box<EventPredicate>>,
    config: WaitConfig,
}

impl WaitRequest {
    /// Waits for one event type with event-wait defaults.
    #[must_use]
    pub fn event(event_type: impl Into<String>) -> Self {
        Self::any(EventTypes::one(event_type))
    }

    /// Waits for any of `types` with event-wait defaults.
    #[must_use]
    pub fn any(types: impl Into<EventTypes>) -> Self {
        Self {
            types: types.into(),
            predicate: None,
            config: WaitConfig::for_events(),
        }
    }

    #[must_use]
    pub fn matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AnalyticsEvent) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    #[must_use]
    pub fn within(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: WaitConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn types(&self) -> &EventTypes {
        &self.types
    }

    #[must_use]
    pub fn config(&self) -> WaitConfig {
        self.config
    }

    /// Runs the wait against `store`.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::CaptureTimeout` if no match arrives in time.
    pub async fn wait(&self, store: &EventStore) -> Result<AnalyticsEvent> {
        wait_for_matching(store, &self.types, self.predicate.as_deref(), self.config).await
    }
}

impl fmt::Debug for WaitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitRequest")
            .field("types", &self.types)
            .field("has_predicate", &self.predicate.is_some())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn wait_for_succeeds_immediately() {
        let result = wait_for(|| async { true }, WaitConfig::default(), "test condition").await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn wait_for_succeeds_eventually() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = wait_for(
            move || {
                let c = counter_clone.clone();
                async move {
                    let count = c.fetch_add(1, Ordering::SeqCst);
                    count >= 3
                }
            },
            WaitConfig::new(Duration::from_secs(5), Duration::from_millis(10)),
            "counter >= 3",
        )
        .await;

        assert!(result.is_ok());
        assert!(counter.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let result = wait_for(
            || async { false },
            WaitConfig::new(Duration::from_millis(100), Duration::from_millis(10)),
            "impossible condition",
        )
        .await;

        assert!(matches!(result, Err(CaptureError::WaitTimeout { .. })));
    }

    #[tokio::test]
    async fn wait_for_result_retries_through_errors() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = wait_for_result(
            move || {
                let c = c.clone();
                async move {
                    match c.fetch_add(1, Ordering::SeqCst) {
                        0 => Err("navigating"),
                        n => Ok(n >= 2),
                    }
                }
            },
            WaitConfig::new(Duration::from_secs(5), Duration::from_millis(5)),
            "ready",
        )
        .await;

        assert!(result.is_ok());
    }

    #[test]
    fn event_types_display() {
        assert_eq!(EventTypes::one("Viewed Page").to_string(), "Viewed Page");
        assert_eq!(
            EventTypes::from(&["Clicked CTA", "Clicked Link"][..]).to_string(),
            "one of: Clicked CTA, Clicked Link"
        );
    }

    #[test]
    fn scan_prefers_earliest_match() {
        let events = vec![
            AnalyticsEvent::new("Viewed Page").with_property("n", 1_i64),
            AnalyticsEvent::new("Clicked Element"),
            AnalyticsEvent::new("Viewed Page").with_property("n", 2_i64),
            AnalyticsEvent::new("Viewed Page").with_property("n", 3_i64),
        ];
        let predicate = |e: &AnalyticsEvent| e.property("n").and_then(|v| v.as_i64()) >= Some(2);

        match scan(&events, &EventTypes::one("Viewed Page"), Some(&predicate)) {
            Scan::Found(event) => assert!(event.property_eq("n", 2_i64)),
            Scan::Pending(cause) => panic!("expected a match, got {cause}"),
        }
    }

    #[test]
    fn scan_survives_panicking_predicate() {
        let events = vec![
            AnalyticsEvent::new("Viewed Page"),
            AnalyticsEvent::new("Viewed Page").with_property("page_url_path", "/ok"),
        ];
        let predicate = |e: &AnalyticsEvent| {
            let path = e.str_property("page_url_path").expect("missing path");
            path == "/ok"
        };

        assert!(matches!(
            scan(&events, &EventTypes::one("Viewed Page"), Some(&predicate)),
            Scan::Found(_)
        ));
    }

    #[test]
    fn scan_classifies_pending_causes() {
        let none: Vec<AnalyticsEvent> = Vec::new();
        assert!(matches!(
            scan(&none, &EventTypes::one("A"), None),
            Scan::Pending(TimeoutCause::NoEvents)
        ));

        let other = vec![AnalyticsEvent::new("B")];
        assert!(matches!(
            scan(&other, &EventTypes::one("A"), None),
            Scan::Pending(TimeoutCause::TypeAbsent)
        ));

        let rejected = vec![AnalyticsEvent::new("A"), AnalyticsEvent::new("A")];
        let never = |_: &AnalyticsEvent| false;
        match scan(&rejected, &EventTypes::one("A"), Some(&never)) {
            Scan::Pending(TimeoutCause::PredicateMismatch { candidates, .. }) => {
                assert_eq!(candidates, 2);
            }
            _ => panic!("expected predicate mismatch"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn event_wait_deadline_is_not_overshot() {
        let store = EventStore::new();
        let config = WaitConfig::new(Duration::from_millis(200), Duration::from_millis(150));

        let err = wait_for_event(&store, "Viewed Page", None, config)
            .await
            .unwrap_err();

        let CaptureError::CaptureTimeout { elapsed, .. } = err else {
            panic!("expected capture timeout");
        };
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(350));
    }
}
