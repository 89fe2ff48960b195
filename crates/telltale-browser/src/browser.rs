//! Browser lifecycle management.
//!
//! `TestBrowser` launches Chrome, drives the CDP handler, and hands out
//! [`Page`]s that capture analytics traffic to the configured endpoint.
//!
//! # Resource Safety
//!
//! Dropping a `TestBrowser` kills the Chrome process, but `close()` is the
//! graceful path and should be preferred.

use crate::error::{BrowserError, Result};
use crate::page::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::sync::Arc;
use telltale_capture::IngestionEndpoint;
use telltale_config::{BrowserSettings, TelltaleConfig};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Configuration for launching a test browser.
#[derive(Debug, Clone)]
pub struct TestBrowserConfig {
    /// Run in headless mode (default: true).
    pub headless: bool,

    /// Browser window size (default: 1920x1080).
    pub window_size: (u32, u32),

    /// Additional Chrome arguments.
    pub args: Vec<String>,

    /// Chrome executable path (None = auto-detect).
    pub chrome_path: Option<String>,

    /// Collector endpoint whose traffic pages capture.
    pub endpoint: IngestionEndpoint,
}

impl TestBrowserConfig {
    /// Creates a new config with defaults for headless testing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from the `[browser]` settings.
    ///
    /// Extra args are appended to the container-friendly defaults.
    #[must_use]
    pub fn from_settings(settings: &BrowserSettings) -> Self {
        Self::default()
            .with_headless(settings.headless)
            .with_window_size(settings.window_width, settings.window_height)
            .with_args(settings.args.clone())
            .with_chrome_path(settings.chrome_path.clone())
    }

    /// Builds a config from a loaded [`TelltaleConfig`].
    #[must_use]
    pub fn from_config(config: &TelltaleConfig) -> Self {
        Self::from_settings(&config.browser).with_endpoint(IngestionEndpoint::from(&config.endpoint))
    }

    /// Enables visible mode for debugging.
    #[must_use]
    pub fn visible(self) -> Self {
        self.with_headless(false)
    }

    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Sets a custom window size.
    #[must_use]
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    /// Adds additional Chrome arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args.extend(args);
        self
    }

    #[must_use]
    pub fn with_chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    /// Sets the collector endpoint to capture.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: IngestionEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    fn to_browser_config(&self) -> Result<BrowserConfig> {
        let mut config = BrowserConfig::builder();

        // chromiumoxide launches headless unless told otherwise
        if !self.headless {
            config = config.with_head();
        }

        config = config.window_size(self.window_size.0, self.window_size.1);

        // One profile per instance so parallel tests don't share a ProcessSingleton
        let user_data_dir =
            std::env::temp_dir().join(format!("telltale-browser-{}", uuid::Uuid::new_v4()));
        config = config.user_data_dir(user_data_dir);

        for arg in &self.args {
            config = config.arg(arg.clone());
        }

        if let Some(path) = &self.chrome_path {
            config = config.chrome_executable(path.clone());
        }

        config.build().map_err(|e| BrowserError::LaunchFailed {
            reason: format!("invalid browser configuration: {e}"),
            source: None,
        })
    }
}

impl Default for TestBrowserConfig {
    fn default() -> Self {
        Self {
            headless: !cfg!(feature = "visible"),
            window_size: (1920, 1080),
            args: vec![
                // Containers without user namespaces can't run the sandbox
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            chrome_path: None,
            endpoint: IngestionEndpoint::default(),
        }
    }
}

/// A managed browser instance.
///
/// ```ignore
/// let browser = TestBrowser::launch(TestBrowserConfig::default()).await?;
/// let page = browser.new_page().await?;
/// page.visit_and_capture_url("https://www.example.org/education").await?;
/// browser.close().await?;
/// ```
pub struct TestBrowser {
    inner: Arc<Mutex<Option<Browser>>>,
    endpoint: IngestionEndpoint,
}

impl TestBrowser {
    /// Launches Chrome and starts driving its CDP connection.
    ///
    /// # Errors
    ///
    /// Returns `LaunchFailed` if Chrome is not installed, not executable,
    /// or fails to start.
    pub async fn launch(config: TestBrowserConfig) -> Result<Self> {
        debug!("Launching browser with config: {:?}", config);

        let browser_config = config.to_browser_config()?;

        let (browser, mut handler) =
            Browser::launch(browser_config)
                .await
                .map_err(|e| BrowserError::LaunchFailed {
                    reason: "failed to launch Chrome process".to_string(),
                    source: Some(Box::new(e)),
                })?;

        // chromiumoxide only processes CDP messages while the handler is polled
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser handler error: {}", e);
                }
            }
        });

        debug!("Browser launched successfully");

        Ok(Self {
            inner: Arc::new(Mutex::new(Some(browser))),
            endpoint: config.endpoint,
        })
    }

    /// Opens a new tab with analytics capture attached.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` if the browser has been closed, or a CDP
    /// error if the capture binding cannot be registered.
    pub async fn new_page(&self) -> Result<Page> {
        let browser = self.inner.lock().await;

        let browser = browser.as_ref().ok_or(BrowserError::AlreadyClosed)?;

        let chrome_page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ConnectionFailed(e.to_string()))?;

        Page::attach(chrome_page, self.endpoint.clone()).await
    }

    /// The endpoint pages from this browser capture.
    #[must_use]
    pub fn endpoint(&self) -> &IngestionEndpoint {
        &self.endpoint
    }

    /// Closes the browser and waits for the Chrome process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser fails to close gracefully.
    pub async fn close(self) -> Result<()> {
        let mut browser_guard = self.inner.lock().await;

        if let Some(mut browser) = browser_guard.take() {
            debug!("Closing browser gracefully");
            browser
                .close()
                .await
                .map_err(|e| BrowserError::ConnectionFailed(e.to_string()))?;
            if let Err(e) = browser.wait().await {
                warn!("Chrome process did not exit cleanly: {}", e);
            }
        }

        Ok(())
    }

    /// Returns true if the browser has been closed.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

impl Drop for TestBrowser {
    fn drop(&mut self) {
        // chromiumoxide's Browser::drop kills the process if close() never ran
        if let Ok(guard) = self.inner.try_lock() {
            if guard.is_some() {
                warn!("TestBrowser dropped without close(); killing Chrome");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_are_applied_on_top_of_defaults() {
        let settings = BrowserSettings {
            headless: false,
            window_width: 1280,
            window_height: 720,
            chrome_path: Some("/usr/bin/chromium".into()),
            args: vec!["--lang=en-US".into()],
            ..BrowserSettings::default()
        };

        let config = TestBrowserConfig::from_settings(&settings);

        assert!(!config.headless);
        assert_eq!(config.window_size, (1280, 720));
        assert_eq!(config.chrome_path.as_deref(), Some("/usr/bin/chromium"));
        assert!(config.args.iter().any(|a| a == "--no-sandbox"));
        assert!(config.args.iter().any(|a| a == "--lang=en-US"));
    }

    #[test]
    fn endpoint_comes_from_config() {
        let mut config = TelltaleConfig::default();
        config.endpoint.host = "api.eu.amplitude.com".into();

        let browser_config = TestBrowserConfig::from_config(&config);

        assert_eq!(browser_config.endpoint.host(), "api.eu.amplitude.com");
        assert_eq!(browser_config.endpoint.path(), "/2/httpapi");
    }

    #[tokio::test]
    #[ignore] // Requires Chrome to be installed
    async fn browser_launch_and_close() {
        let browser = TestBrowser::launch(TestBrowserConfig::default())
            .await
            .expect("failed to launch browser");

        assert!(!browser.is_closed().await);

        browser.close().await.expect("failed to close browser");
    }
}
