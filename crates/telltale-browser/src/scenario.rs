//! Declarative analytics scenarios.
//!
//! A scenario visits one page, optionally interacts with it, and waits for
//! one expected event:
//!
//! ```ignore
//! let scenario = Scenario::viewed(
//!     "Viewed Lesson Info (Digital Literacy)",
//!     "/education/digital-literacy",
//!     "Viewed Lesson Info",
//! )
//! .matching(props::prop_eq("cse_entity_id", 5_122_762_i64));
//!
//! let runner = ScenarioRunner::from_config(&TelltaleConfig::load(None)?)?;
//! let event = runner.run(&page, &scenario).await?;
//! ```

use crate::consent::ConsentCookies;
use crate::error::Result;
use crate::page::Page;
use crate::site::{StaticSite, TargetSite};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use telltale_capture::{AnalyticsEvent, EventPredicate, EventTypes, WaitConfig};
use telltale_config::{ConfigError, DEFAULT_CLICK_EVENT_TYPES, TelltaleConfig};
use tracing::{info, warn};

/// Which event types satisfy a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    Event(String),
    AnyOf(Vec<String>),
    /// Any of the runner's configured click event types.
    AnyClick,
}

/// One interaction performed after the page loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Click(String),
    ClickText { selector: String, text: String },
    /// Keep the next click on the matching element from leaving the page.
    PreventNavigation { selector: String, text: String },
    WaitForSelector(String),
    Sleep(Duration),
}

impl Step {
    async fn perform(&self, page: &Page) -> Result<()> {
        match self {
            Step::Click(selector) => page.click(selector).await,
            Step::ClickText { selector, text } => page.click_text(selector, text).await,
            Step::PreventNavigation { selector, text } => {
                page.prevent_next_click_navigation(selector, text).await
            }
            Step::WaitForSelector(selector) => {
                page.wait_for_selector(selector, WaitConfig::default()).await
            }
            Step::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(())
            }
        }
    }
}

/// A page visit plus the analytics event it must produce.
pub struct Scenario {
    pub name: String,
    pub path: String,
    pub expect: Expectation,
    pub predicate: Option<Arc<EventPredicate>>,
    pub steps: Vec<Step>,
}

impl Scenario {
    /// A page-view scenario expecting `event_type`.
    pub fn viewed(
        name: impl Into<String>,
        path: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            expect: Expectation::Event(event_type.into()),
            predicate: None,
            steps: Vec::new(),
        }
    }

    /// An interaction scenario accepting any configured click type.
    pub fn clicked(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            expect: Expectation::AnyClick,
            predicate: None,
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn expecting(mut self, expect: Expectation) -> Self {
        self.expect = expect;
        self
    }

    #[must_use]
    pub fn matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AnalyticsEvent) -> bool + Send + Sync + 'static,
    {
        let predicate: Arc<EventPredicate> = Arc::new(predicate);
        self.predicate = Some(predicate);
        self
    }

    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("expect", &self.expect)
            .field("has_predicate", &self.predicate.is_some())
            .field("steps", &self.steps)
            .finish()
    }
}

/// Runs scenarios against one site.
pub struct ScenarioRunner {
    site: Arc<dyn TargetSite>,
    consent: Option<ConsentCookies>,
    event_wait: WaitConfig,
    require_ingestion_hit: bool,
    click_event_types: Vec<String>,
}

impl ScenarioRunner {
    pub fn new(site: impl TargetSite + 'static) -> Self {
        Self {
            site: Arc::new(site),
            consent: None,
            event_wait: WaitConfig::for_events(),
            require_ingestion_hit: true,
            click_event_types: DEFAULT_CLICK_EVENT_TYPES
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
        }
    }

    /// Builds a runner for `browser.base_url` with configured consent,
    /// waits and click types.
    ///
    /// # Errors
    ///
    /// Returns a config error if no base URL is configured.
    pub fn from_config(config: &TelltaleConfig) -> Result<Self> {
        let base_url = config
            .browser
            .base_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::InvalidValue {
                field: "browser.base_url",
                reason: "a site is required to run scenarios".to_string(),
            })?;

        let mut runner = Self::new(StaticSite::new(base_url))
            .with_event_wait(WaitConfig::from(&config.wait))
            .with_click_event_types(config.click_event_types.clone());
        runner.consent = ConsentCookies::from_settings(&config.consent);
        Ok(runner)
    }

    #[must_use]
    pub fn with_consent(mut self, consent: ConsentCookies) -> Self {
        self.consent = Some(consent);
        self
    }

    #[must_use]
    pub fn with_event_wait(mut self, config: WaitConfig) -> Self {
        self.event_wait = config;
        self
    }

    /// Whether a visit must produce at least one ingestion request before
    /// steps run (default: true).
    #[must_use]
    pub fn require_ingestion_hit(mut self, required: bool) -> Self {
        self.require_ingestion_hit = required;
        self
    }

    #[must_use]
    pub fn with_click_event_types(mut self, types: Vec<String>) -> Self {
        self.click_event_types = types;
        self
    }

    #[must_use]
    pub fn site(&self) -> &dyn TargetSite {
        self.site.as_ref()
    }

    /// The event types a scenario accepts.
    #[must_use]
    pub fn expected_types(&self, expect: &Expectation) -> EventTypes {
        match expect {
            Expectation::Event(event_type) => EventTypes::one(event_type.clone()),
            Expectation::AnyOf(types) => EventTypes::from(types.clone()),
            Expectation::AnyClick => EventTypes::from(self.click_event_types.clone()),
        }
    }

    /// Runs `scenario` on `page` and returns the matched event.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error, or a capture timeout listing
    /// the event types that were seen.
    pub async fn run(&self, page: &Page, scenario: &Scenario) -> Result<AnalyticsEvent> {
        info!(scenario = %scenario.name, path = %scenario.path, "Running analytics scenario");

        if let Some(consent) = &self.consent {
            page.set_consent(consent).await?;
        }

        page.visit_and_capture(self.site.as_ref(), &scenario.path).await?;

        if self.require_ingestion_hit {
            page.wait_for_ingestion(self.event_wait).await?;
        }
        page.log_diagnostics().await;

        for step in &scenario.steps {
            step.perform(page).await?;
        }

        let types = self.expected_types(&scenario.expect);
        let result = page
            .wait_for_any_event(&types, scenario.predicate.as_deref(), self.event_wait)
            .await;

        page.log_captured_event_types();
        let event = result?;

        match serde_json::to_string_pretty(&event) {
            Ok(json) => info!("Matched event payload ({}):\n{}", scenario.name, json),
            Err(e) => warn!("Failed to serialize matched event: {}", e),
        }
        Ok(event)
    }
}

impl fmt::Debug for ScenarioRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioRunner")
            .field("site", &self.site.base_url())
            .field("consent", &self.consent)
            .field("event_wait", &self.event_wait)
            .field("require_ingestion_hit", &self.require_ingestion_hit)
            .field("click_event_types", &self.click_event_types)
            .finish()
    }
}
