//! Error types for browser-driven capture.
//!
//! Launch, navigation and scripting failures are kept apart from capture
//! timeouts, which arrive unchanged from `telltale-capture`.

use telltale_capture::CaptureError;
use telltale_config::ConfigError;
use thiserror::Error;

/// The main error type for browser operations.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Failed to launch the browser process.
    ///
    /// Usually Chrome is missing or not executable.
    #[error("failed to launch browser: {reason}")]
    LaunchFailed {
        /// Human-readable reason for the launch failure
        reason: String,
        /// Optional underlying error that caused the failure
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The DevTools connection rejected a command.
    #[error("CDP connection failed: {0}")]
    ConnectionFailed(String),

    /// Navigation to a URL failed.
    #[error("navigation to '{url}' failed: {reason}")]
    NavigationFailed {
        /// The URL that failed to load
        url: String,
        /// Reason for the navigation failure
        reason: String,
    },

    /// JavaScript execution in the page context failed.
    #[error("JavaScript execution failed: {0}")]
    ScriptExecutionFailed(String),

    /// No element matched a selector (and text, if one was given).
    #[error("no element matches '{selector}'{}", .text.as_ref().map(|t| format!(" containing '{t}'")).unwrap_or_default())]
    ElementNotFound {
        /// CSS selector that was queried
        selector: String,
        /// Text the element had to contain
        text: Option<String>,
    },

    /// A consent cookie could not be built.
    #[error("invalid consent cookie '{name}': {reason}")]
    InvalidCookie {
        /// Cookie name
        name: String,
        /// Reason reported by the cookie builder
        reason: String,
    },

    /// An operation was attempted on a closed browser instance.
    #[error("browser instance is already closed")]
    AlreadyClosed,

    /// Settings needed for the operation are missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An analytics wait or generic wait did not succeed.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Wraps errors from the chromiumoxide library.
    #[error("chromiumoxide error: {0}")]
    ChromiumOxide(#[from] chromiumoxide::error::CdpError),

    /// Generic I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    /// True if this is an analytics capture timeout.
    #[must_use]
    pub fn is_capture_timeout(&self) -> bool {
        matches!(self, BrowserError::Capture(CaptureError::CaptureTimeout { .. }))
    }
}

/// A specialized Result type for browser operations.
pub type Result<T> = std::result::Result<T, BrowserError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn element_not_found_mentions_text() {
        let err = BrowserError::ElementNotFound {
            selector: "button".into(),
            text: Some("Play Video".into()),
        };
        assert_eq!(err.to_string(), "no element matches 'button' containing 'Play Video'");

        let err = BrowserError::ElementNotFound {
            selector: "#cta".into(),
            text: None,
        };
        assert_eq!(err.to_string(), "no element matches '#cta'");
    }

    #[test]
    fn capture_errors_pass_through() {
        let err: BrowserError = CaptureError::WaitTimeout {
            condition: "document ready".into(),
            timeout: Duration::from_secs(1),
        }
        .into();
        assert!(!err.is_capture_timeout());
        assert!(err.to_string().contains("document ready"));
    }
}
