//! A browser tab that captures analytics traffic.
//!
//! Each `Page` registers a CDP runtime binding once, then on every
//! [`visit_and_capture_url`](Page::visit_and_capture_url) resets its event
//! store, swaps in a hook script bound to a new [`HookSession`], and
//! navigates. Reports from the hook are handled by the current session on a
//! background task. When the page later loads another document by itself
//! (a followed link, a redirect) the session resets the store again.

use crate::consent::ConsentCookies;
use crate::error::{BrowserError, Result};
use crate::hook::{BINDING_NAME, HookScript};
use crate::site::TargetSite;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, RemoveScriptToEvaluateOnNewDocumentParams,
    ScriptIdentifier,
};
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::page::Page as ChromePage;
use futures::StreamExt;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use telltale_capture::{
    AnalyticsEvent, CaptureDiagnostics, CaptureError, CaptureOutcome, CapturedRequest,
    EventPredicate, EventStore, EventTypes, HookSession, IngestionEndpoint, WaitConfig, wait_for,
    wait_for_result,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

type SessionSlot = Arc<Mutex<Option<Arc<HookSession>>>>;

/// A browser page with analytics capture attached.
#[derive(Debug)]
pub struct Page {
    inner: ChromePage,
    store: EventStore,
    endpoint: IngestionEndpoint,
    session: SessionSlot,
    hook_script: tokio::sync::Mutex<Option<ScriptIdentifier>>,
    listener: ReportListener,
}

impl Page {
    /// Registers the capture binding and starts listening for hook reports.
    pub(crate) async fn attach(page: ChromePage, endpoint: IngestionEndpoint) -> Result<Self> {
        let mut reports = page.event_listener::<EventBindingCalled>().await?;
        page.execute(AddBindingParams::new(BINDING_NAME)).await?;

        let session: SessionSlot = Arc::default();
        let slot = Arc::clone(&session);
        let listener = ReportListener(tokio::spawn(async move {
            while let Some(report) = reports.next().await {
                if report.name != BINDING_NAME {
                    continue;
                }
                let current = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
                match current {
                    Some(session) => match session.observe_report(&report.payload) {
                        CaptureOutcome::DocumentStarted => {
                            debug!(document = ?session.document(), "Capturing for new document");
                        }
                        outcome => trace!(?outcome, "Hook report handled"),
                    },
                    None => debug!("Hook report arrived before any capture was installed"),
                }
            }
        }));

        Ok(Self {
            inner: page,
            store: EventStore::new(),
            endpoint,
            session,
            hook_script: tokio::sync::Mutex::new(None),
            listener,
        })
    }

    /// The store this page captures into.
    #[must_use]
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    #[must_use]
    pub fn endpoint(&self) -> &IngestionEndpoint {
        &self.endpoint
    }

    /// Visits `path` on `site` with capture installed.
    ///
    /// # Errors
    ///
    /// Returns an error if the site's health check fails, the hook cannot be
    /// installed, or navigation fails.
    pub async fn visit_and_capture(&self, site: &dyn TargetSite, path: &str) -> Result<()> {
        site.health_check().await?;
        self.visit_and_capture_url(&site.url(path)).await
    }

    /// Resets the store, installs a fresh hook, and navigates to `url`.
    ///
    /// Events from the previous visit are gone once this returns, and late
    /// reports from the previous document are dropped. The same holds for
    /// every document the page navigates to afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the hook cannot be installed or navigation fails.
    pub async fn visit_and_capture_url(&self, url: &str) -> Result<()> {
        let session = Arc::new(HookSession::start(self.endpoint.clone(), self.store.clone()));
        let script = HookScript::new(BINDING_NAME, session.hook_generation(), &self.endpoint);
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);

        self.install_hook(&script).await?;

        info!(url, generation = script.generation(), "Visiting with analytics capture");
        self.navigate(url).await
    }

    async fn install_hook(&self, script: &HookScript) -> Result<()> {
        let mut current = self.hook_script.lock().await;

        if let Some(previous) = current.take() {
            // A leftover hook only produces stale reports, which the store drops
            if let Err(e) = self
                .inner
                .execute(RemoveScriptToEvaluateOnNewDocumentParams::new(previous))
                .await
            {
                warn!("Failed to remove previous capture hook: {}", e);
            }
        }

        let added = self
            .inner
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script.render()))
            .await?;
        *current = Some(added.result.identifier);
        Ok(())
    }

    /// Navigates to an absolute URL and waits for the document to load.
    ///
    /// # Errors
    ///
    /// Returns `NavigationFailed` if the page fails to load or times out.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.inner
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        self.wait_for_load(WaitConfig::default()).await
    }

    /// Waits for `document.readyState` to become `"complete"`.
    ///
    /// # Errors
    ///
    /// Returns a wait timeout if the document never finishes loading.
    pub async fn wait_for_load(&self, config: WaitConfig) -> Result<()> {
        wait_for_result(
            || {
                let page = self.inner.clone();
                async move {
                    let result = page
                        .evaluate("document.readyState")
                        .await
                        .map_err(|e| BrowserError::ScriptExecutionFailed(e.to_string()))?;

                    let ready = result
                        .value()
                        .and_then(|v| v.as_str())
                        .is_some_and(|s| s == "complete");

                    Ok::<_, BrowserError>(ready)
                }
            },
            config,
            "document ready",
        )
        .await?;
        Ok(())
    }

    /// Executes JavaScript in the page and deserializes the result.
    ///
    /// ```ignore
    /// let title: String = page.evaluate("document.title").await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if script execution fails or the result cannot be deserialized.
    pub async fn evaluate<T>(&self, script: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let result = self
            .inner
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptExecutionFailed(e.to_string()))?;

        result
            .into_value()
            .map_err(|e| BrowserError::ScriptExecutionFailed(e.to_string()))
    }

    /// Waits for a CSS selector to match an element.
    ///
    /// # Errors
    ///
    /// Returns a wait timeout if nothing matches in time.
    pub async fn wait_for_selector(&self, selector: &str, config: WaitConfig) -> Result<()> {
        let script = format!("!!document.querySelector({})", js_string(selector));

        wait_for_result(
            || {
                let page = self.inner.clone();
                let script = script.clone();
                async move {
                    let result = page
                        .evaluate(script.as_str())
                        .await
                        .map_err(|e| BrowserError::ScriptExecutionFailed(e.to_string()))?;

                    Ok::<_, BrowserError>(
                        result
                            .value()
                            .and_then(serde_json::Value::as_bool)
                            .unwrap_or(false),
                    )
                }
            },
            config,
            &format!("selector '{selector}'"),
        )
        .await?;
        Ok(())
    }

    /// Clicks the first element matching `selector` with a real mouse event.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if nothing matches within the default wait.
    pub async fn click(&self, selector: &str) -> Result<()> {
        self.wait_for_selector(selector, WaitConfig::default())
            .await
            .map_err(|_| BrowserError::ElementNotFound {
                selector: selector.to_string(),
                text: None,
            })?;

        let element = self.inner.find_element(selector).await?;
        element.click().await?;
        debug!(selector, "Clicked element");
        Ok(())
    }

    /// Clicks the first element matching `selector` whose text contains `text`.
    ///
    /// The click is dispatched from script, so hidden and covered elements
    /// can still be clicked.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if no such element appears within the default wait.
    pub async fn click_text(&self, selector: &str, text: &str) -> Result<()> {
        self.with_element(
            selector,
            text,
            "el.scrollIntoView({ block: 'center' }); el.click();",
        )
        .await?;
        debug!(selector, text, "Clicked element by text");
        Ok(())
    }

    /// Cancels the default action of the next click on the matching element.
    ///
    /// Links stay on the current page, so the click's analytics can be
    /// captured before the document unloads.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if no such element appears within the default wait.
    pub async fn prevent_next_click_navigation(&self, selector: &str, text: &str) -> Result<()> {
        self.with_element(
            selector,
            text,
            "el.addEventListener('click', (e) => e.preventDefault(), { once: true });",
        )
        .await
    }

    /// Polls until an element matching `selector` and containing `text`
    /// exists, then runs `action` with it bound to `el`.
    async fn with_element(&self, selector: &str, text: &str, action: &str) -> Result<()> {
        let script = format!(
            "(() => {{ \
                const text = {text}; \
                const el = Array.from(document.querySelectorAll({selector})) \
                    .find((n) => (n.textContent || '').includes(text)); \
                if (!el) return false; \
                {action} \
                return true; \
            }})()",
            text = js_string(text),
            selector = js_string(selector),
        );

        wait_for_result(
            || {
                let page = self.inner.clone();
                let script = script.clone();
                async move {
                    let result = page
                        .evaluate(script.as_str())
                        .await
                        .map_err(|e| BrowserError::ScriptExecutionFailed(e.to_string()))?;
                    Ok::<_, BrowserError>(result.value().and_then(serde_json::Value::as_bool) == Some(true))
                }
            },
            WaitConfig::default(),
            &format!("element '{selector}' containing '{text}'"),
        )
        .await
        .map_err(|_| BrowserError::ElementNotFound {
            selector: selector.to_string(),
            text: Some(text.to_string()),
        })
    }

    /// Writes consent cookies for the site under test.
    ///
    /// # Errors
    ///
    /// Returns an error if a cookie is invalid or CDP rejects it.
    pub async fn set_consent(&self, consent: &ConsentCookies) -> Result<()> {
        info!(domain = consent.domain(), "Setting analytics consent cookies");
        self.inner.set_cookies(consent.to_cookie_params()?).await?;
        Ok(())
    }

    /// Snapshot of events captured since the last visit, in arrival order.
    #[must_use]
    pub fn captured_events(&self) -> Vec<AnalyticsEvent> {
        self.store.events()
    }

    /// Distinct captured event types in first-seen order.
    #[must_use]
    pub fn captured_event_types(&self) -> IndexSet<String> {
        self.store.event_types()
    }

    #[must_use]
    pub fn captured_requests(&self) -> Vec<CapturedRequest> {
        self.store.requests()
    }

    /// Waits for an event of `event_type` matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns a capture timeout naming the event types that were seen.
    pub async fn wait_for_event(
        &self,
        event_type: &str,
        predicate: Option<&EventPredicate>,
        config: WaitConfig,
    ) -> Result<AnalyticsEvent> {
        Ok(telltale_capture::wait_for_event(&self.store, event_type, predicate, config).await?)
    }

    /// Waits for an event of any of `types` matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns a capture timeout naming the event types that were seen.
    pub async fn wait_for_any_event(
        &self,
        types: &EventTypes,
        predicate: Option<&EventPredicate>,
        config: WaitConfig,
    ) -> Result<AnalyticsEvent> {
        Ok(telltale_capture::wait_for_any_event(&self.store, types, predicate, config).await?)
    }

    /// Waits until at least one event has been captured.
    ///
    /// # Errors
    ///
    /// Returns a capture timeout if the page sends nothing.
    pub async fn wait_for_events(&self, config: WaitConfig) -> Result<Vec<AnalyticsEvent>> {
        Ok(telltale_capture::wait_for_events(&self.store, config).await?)
    }

    /// Waits until at least one request reached the ingestion endpoint.
    ///
    /// Unlike [`wait_for_events`](Self::wait_for_events) this succeeds even
    /// when the body could not be decoded.
    ///
    /// # Errors
    ///
    /// Returns a wait timeout if nothing was sent.
    pub async fn wait_for_ingestion(&self, config: WaitConfig) -> Result<CapturedRequest> {
        wait_for(
            || {
                let store = self.store.clone();
                async move { !store.requests().is_empty() }
            },
            config,
            "request to the ingestion endpoint",
        )
        .await?;

        let first = self.store.requests().into_iter().next().ok_or_else(|| {
            CaptureError::WaitTimeout {
                condition: "request to the ingestion endpoint".to_string(),
                timeout: config.timeout,
            }
        })?;
        info!(url = %first.url, transport = %first.transport, "Observed ingestion request");
        Ok(first)
    }

    /// Page state plus a capture summary, for debugging a failed wait.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be queried.
    pub async fn diagnostics(&self) -> Result<PageDiagnostics> {
        let state: PageState = self.evaluate(PAGE_STATE_SCRIPT).await?;
        Ok(PageDiagnostics {
            href: state.href,
            ready_state: state.ready_state,
            has_fetch: state.has_fetch,
            has_send_beacon: state.has_send_beacon,
            active_consent_groups: state.active_groups,
            capture: self.store.diagnostics(),
        })
    }

    /// Logs [`diagnostics`](Self::diagnostics) as pretty JSON.
    ///
    /// Failures are logged, never returned.
    pub async fn log_diagnostics(&self) {
        match self.diagnostics().await {
            Ok(diagnostics) => match serde_json::to_string_pretty(&diagnostics) {
                Ok(json) => info!("Capture diagnostics:\n{}", json),
                Err(e) => warn!("Failed to serialize capture diagnostics: {}", e),
            },
            Err(e) => warn!("Failed to collect capture diagnostics: {}", e),
        }
    }

    /// Logs the distinct event types captured so far.
    pub fn log_captured_event_types(&self) {
        let types = self.store.event_types();
        if types.is_empty() {
            info!("Captured analytics event types: (none)");
        } else {
            let list: Vec<&str> = types.iter().map(String::as_str).collect();
            info!("Captured analytics event types: {}", list.join(", "));
        }
    }

    /// Returns the current page URL.
    ///
    /// # Errors
    ///
    /// Returns an error if script execution fails.
    pub async fn url(&self) -> Result<String> {
        self.evaluate("window.location.href").await
    }

    /// Returns the page title.
    ///
    /// # Errors
    ///
    /// Returns an error if script execution fails.
    pub async fn title(&self) -> Result<String> {
        self.evaluate("document.title").await
    }

    /// Takes a PNG screenshot of the page.
    ///
    /// # Errors
    ///
    /// Returns an error if screenshot capture fails.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.inner
            .screenshot(chromiumoxide::page::ScreenshotParams::default())
            .await
            .map_err(|e| BrowserError::ScriptExecutionFailed(e.to_string()))
    }

    /// Stops listening for hook reports and closes the tab.
    ///
    /// The store stays readable through any clones taken from [`store`](Self::store).
    ///
    /// # Errors
    ///
    /// Returns an error if closing the page fails.
    pub async fn close(self) -> Result<()> {
        self.listener.stop();
        self.inner.close().await?;
        Ok(())
    }
}

/// The task feeding hook reports to the current session.
///
/// Stops when dropped, so a page dropped without [`Page::close`] does not
/// leave it running until the CDP stream ends.
#[derive(Debug)]
struct ReportListener(JoinHandle<()>);

impl ReportListener {
    fn stop(&self) {
        self.0.abort();
    }
}

impl Drop for ReportListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn js_string(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

const PAGE_STATE_SCRIPT: &str = "({ \
    href: window.location.href, \
    readyState: document.readyState, \
    hasFetch: typeof window.fetch === 'function', \
    hasSendBeacon: typeof (window.navigator && window.navigator.sendBeacon) === 'function', \
    activeGroups: typeof window.OnetrustActiveGroups === 'string' ? window.OnetrustActiveGroups \
        : (typeof window.OptanonActiveGroups === 'string' ? window.OptanonActiveGroups : null) \
})";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageState {
    href: String,
    ready_state: String,
    has_fetch: bool,
    has_send_beacon: bool,
    active_groups: Option<String>,
}

/// Page state and capture summary at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageDiagnostics {
    pub href: String,
    pub ready_state: String,
    pub has_fetch: bool,
    pub has_send_beacon: bool,
    /// Consent groups the consent manager reports as active.
    pub active_consent_groups: Option<String>,
    #[serde(flatten)]
    pub capture: CaptureDiagnostics,
}
