//! The site under test.
//!
//! Scenarios name pages by path. A `TargetSite` supplies the base URL those
//! paths are joined onto, and can refuse navigation early when the site is
//! known to be unreachable.

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// A deployed or locally served site whose analytics are under test.
#[async_trait]
pub trait TargetSite: Send + Sync {
    /// Base URL without a trailing slash, e.g. `https://www.example.org`.
    fn base_url(&self) -> &str;

    /// Called before each visit. The default assumes the site is up.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Joins `path` onto the base URL.
    ///
    /// ```ignore
    /// site.url("/education") // "https://www.example.org/education"
    /// ```
    fn url(&self, path: &str) -> String {
        let base = self.base_url().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }
}

impl fmt::Debug for dyn TargetSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetSite")
            .field("base_url", &self.base_url())
            .finish()
    }
}

/// A site at a fixed URL that the harness does not manage.
#[derive(Debug, Clone)]
pub struct StaticSite {
    base_url: String,
}

impl StaticSite {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TargetSite for StaticSite {
    fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_join_with_single_slash() {
        let site = StaticSite::new("https://www.example.org");
        assert_eq!(site.url("/education"), "https://www.example.org/education");
        assert_eq!(site.url("education"), "https://www.example.org/education");

        let with_slash = StaticSite::new("https://www.example.org/");
        assert_eq!(
            with_slash.url("/education/digital-literacy"),
            "https://www.example.org/education/digital-literacy"
        );
    }

    #[test]
    fn default_health_check_passes() {
        let site = StaticSite::new("http://127.0.0.1:9");
        assert!(tokio_test::block_on(site.health_check()).is_ok());
    }
}
