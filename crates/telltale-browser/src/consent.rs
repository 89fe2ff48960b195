//! OneTrust-style consent cookies.
//!
//! Sites behind a consent banner only load their analytics SDK once the
//! performance group has been granted, so these cookies are written before
//! the first navigation.

use crate::error::{BrowserError, Result};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chrono::{DateTime, Utc};
use telltale_config::ConsentSettings;

pub const ALERT_BOX_CLOSED: &str = "OptanonAlertBoxClosed";
pub const CONSENT: &str = "OptanonConsent";
pub const ACTIVE_GROUPS: &str = "OptanonActiveGroups";

/// One cookie to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentCookie {
    pub name: String,
    pub value: String,
}

/// The set of cookies that records a granted consent for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentCookies {
    domain: String,
    secure: bool,
    cookies: Vec<ConsentCookie>,
}

impl ConsentCookies {
    /// Builds the three OneTrust cookies granting `settings.groups`.
    #[must_use]
    pub fn one_trust(domain: impl Into<String>, settings: &ConsentSettings, now: DateTime<Utc>) -> Self {
        let groups = settings
            .groups
            .iter()
            .map(|g| format!("{g}:1"))
            .collect::<Vec<_>>()
            .join(",");

        let consent = [
            "isIABGlobal=false".to_string(),
            format!(
                "datestamp={}",
                urlencoding::encode(&now.format("%a %b %d %Y %H:%M:%S GMT%z").to_string())
            ),
            format!("version={}", settings.version),
            format!("consentId={}", urlencoding::encode(&settings.consent_id)),
            "interactionCount=1".to_string(),
            format!("groups={}", urlencoding::encode(&groups)),
            "AwaitingReconsent=false".to_string(),
        ]
        .join("&");

        let active_groups = format!(",{},", settings.groups.join(","));

        Self {
            domain: domain.into(),
            secure: true,
            cookies: vec![
                ConsentCookie {
                    name: ALERT_BOX_CLOSED.to_string(),
                    value: "true".to_string(),
                },
                ConsentCookie {
                    name: CONSENT.to_string(),
                    value: consent,
                },
                ConsentCookie {
                    name: ACTIVE_GROUPS.to_string(),
                    value: active_groups,
                },
            ],
        }
    }

    /// Builds cookies from settings, or `None` when no domain is configured.
    #[must_use]
    pub fn from_settings(settings: &ConsentSettings) -> Option<Self> {
        settings
            .domain
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(|domain| Self::one_trust(domain, settings, Utc::now()))
    }

    /// Allows the cookies over plain HTTP, for local test servers.
    #[must_use]
    pub fn insecure(mut self) -> Self {
        self.secure = false;
        self
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn cookies(&self) -> &[ConsentCookie] {
        &self.cookies
    }

    /// Value of the cookie called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    /// Converts to CDP cookie parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCookie` if the CDP builder rejects a cookie.
    pub fn to_cookie_params(&self) -> Result<Vec<CookieParam>> {
        self.cookies
            .iter()
            .map(|cookie| {
                CookieParam::builder()
                    .name(cookie.name.clone())
                    .value(cookie.value.clone())
                    .domain(self.domain.clone())
                    .path("/")
                    .secure(self.secure)
                    .build()
                    .map_err(|reason| BrowserError::InvalidCookie {
                        name: cookie.name.clone(),
                        reason,
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cookies() -> ConsentCookies {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        ConsentCookies::one_trust("qa.example.org", &ConsentSettings::default(), now)
    }

    #[test]
    fn writes_the_three_onetrust_cookies() {
        let cookies = cookies();
        let names: Vec<_> = cookies.cookies().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, [ALERT_BOX_CLOSED, CONSENT, ACTIVE_GROUPS]);
        assert_eq!(cookies.get(ALERT_BOX_CLOSED), Some("true"));
        assert_eq!(cookies.get(ACTIVE_GROUPS), Some(",C0001,C0002,"));
    }

    #[test]
    fn consent_value_grants_groups() {
        let cookies = cookies();
        let consent = cookies.get(CONSENT).unwrap();

        assert!(consent.starts_with("isIABGlobal=false&datestamp=Tue%20Mar%2005%202024%2014%3A07%3A09"));
        assert!(consent.contains("&version=202401.1.0&"));
        assert!(consent.contains("&consentId=telltale-consent&"));
        assert!(consent.contains("&interactionCount=1&"));
        assert!(consent.contains("&groups=C0001%3A1%2CC0002%3A1&"));
        assert!(consent.ends_with("&AwaitingReconsent=false"));
    }

    #[test]
    fn no_domain_means_no_cookies() {
        assert_eq!(ConsentCookies::from_settings(&ConsentSettings::default()), None);

        let settings = ConsentSettings {
            domain: Some("qa.example.org".into()),
            ..ConsentSettings::default()
        };
        let cookies = ConsentCookies::from_settings(&settings).unwrap();
        assert_eq!(cookies.domain(), "qa.example.org");
    }

    #[test]
    fn cookie_params_carry_domain_and_security() {
        let params = cookies().insecure().to_cookie_params().unwrap();

        assert_eq!(params.len(), 3);
        for param in &params {
            assert_eq!(param.domain.as_deref(), Some("qa.example.org"));
            assert_eq!(param.path.as_deref(), Some("/"));
            assert_eq!(param.secure, Some(false));
        }
    }
}
