//! # telltale-browser
//!
//! Drives headless Chrome through chromiumoxide and checks the analytics
//! events a site sends to its collector.
//!
//! ## Architecture
//!
//! - **TestBrowser**: Chrome process lifecycle
//! - **Page**: a tab with capture attached; visits, interactions, waits
//! - **HookScript**: the in-page `fetch` / `sendBeacon` wrapper, installed
//!   before any page script and reporting over a CDP runtime binding
//! - **ConsentCookies**: OneTrust consent so the analytics SDK loads
//! - **TargetSite**: base URL that scenario paths are joined onto
//! - **Scenario / ScenarioRunner**: visit, interact, wait, log
//!
//! Capture, decoding and waiting live in `telltale-capture`; this crate only
//! feeds hook reports into its `HookSession`.
//!
//! ## Example Usage
//!
//! ```ignore
//! use telltale_browser::{TestBrowser, TestBrowserConfig, WaitConfig};
//!
//! #[tokio::test]
//! #[ignore]
//! async fn lesson_page_view_is_tracked() -> Result<(), Box<dyn std::error::Error>> {
//!     let browser = TestBrowser::launch(TestBrowserConfig::default()).await?;
//!     let page = browser.new_page().await?;
//!
//!     page.visit_and_capture_url("https://www.example.org/education/digital-literacy").await?;
//!
//!     let event = page
//!         .wait_for_event(
//!             "Viewed Lesson Info",
//!             Some(&|e| e.str_property("page_url_path") == Some("/education/digital-literacy")),
//!             WaitConfig::for_events(),
//!         )
//!         .await?;
//!     assert_eq!(event.event_type, "Viewed Lesson Info");
//!
//!     browser.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Testing Strategy
//!
//! Unit tests cover script generation, cookies and configuration. Tests that
//! need Chrome are `#[ignore]`d; run them with `cargo test -- --ignored`.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod browser;
pub mod consent;
pub mod error;
pub mod hook;
pub mod logging;
pub mod page;
pub mod props;
pub mod scenario;
pub mod site;

// Re-export main types for convenience
pub use browser::{TestBrowser, TestBrowserConfig};
pub use consent::{ConsentCookie, ConsentCookies};
pub use error::{BrowserError, Result};
pub use hook::{BINDING_NAME, HookScript};
pub use logging::{LogLevel, init_logging, init_logging_from_env};
pub use page::{Page, PageDiagnostics};
pub use scenario::{Expectation, Scenario, ScenarioRunner, Step};
pub use site::{StaticSite, TargetSite};
pub use telltale_capture::{
    AnalyticsEvent, CaptureError, EventPredicate, EventTypes, PropertyValue, TimeoutCause,
    WaitConfig,
};
