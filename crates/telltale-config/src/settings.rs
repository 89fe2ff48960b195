//! Configuration sections shared by the capture engine and the browser layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default analytics collector host.
pub const DEFAULT_COLLECTOR_HOST: &str = "api2.amplitude.com";

/// Default event-ingestion path segment on the collector.
pub const DEFAULT_INGESTION_PATH: &str = "/2/httpapi";

/// Event types accepted as "a click happened" when a scenario does not name one.
pub const DEFAULT_CLICK_EVENT_TYPES: &[&str] = &[
    "Clicked CTA",
    "Clicked Link",
    "Clicked Button",
    "Clicked Homepage CTA",
    "Clicked Home Page CTA",
    "Clicked Element",
    "[Amplitude] Dead Click",
];

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelltaleConfig {
    pub endpoint: EndpointSettings,
    pub wait: WaitSettings,
    pub browser: BrowserSettings,
    pub consent: ConsentSettings,
    pub click_event_types: Vec<String>,
}

impl Default for TelltaleConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointSettings::default(),
            wait: WaitSettings::default(),
            browser: BrowserSettings::default(),
            consent: ConsentSettings::default(),
            click_event_types: DEFAULT_CLICK_EVENT_TYPES
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
        }
    }
}

/// Where analytics events are ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Collector host; subdomains of it also match.
    pub host: String,
    /// Path segment that must appear in the URL path.
    pub path: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_COLLECTOR_HOST.to_string(),
            path: DEFAULT_INGESTION_PATH.to_string(),
        }
    }
}

/// Deadline and poll interval for event waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSettings {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl WaitSettings {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Site under test; scenario paths are joined onto it.
    pub base_url: Option<String>,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Chrome executable (None = auto-detect).
    pub chrome_path: Option<String>,
    /// Extra Chrome arguments appended to the defaults.
    pub args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            headless: true,
            window_width: 1920,
            window_height: 1080,
            chrome_path: None,
            args: Vec::new(),
        }
    }
}

/// Consent cookies written before navigation so the site emits analytics.
///
/// Nothing is written unless `domain` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentSettings {
    pub domain: Option<String>,
    /// Consent groups granted, e.g. `C0001` (strictly necessary) and `C0002` (performance).
    pub groups: Vec<String>,
    pub version: String,
    pub consent_id: String,
}

impl Default for ConsentSettings {
    fn default() -> Self {
        Self {
            domain: None,
            groups: vec!["C0001".to_string(), "C0002".to_string()],
            version: "202401.1.0".to_string(),
            consent_id: "telltale-consent".to_string(),
        }
    }
}
