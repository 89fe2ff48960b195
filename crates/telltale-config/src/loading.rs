use crate::error::{ConfigError, Result};
use crate::settings::TelltaleConfig;
use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use std::path::Path;
use tracing::debug;

/// Config file picked up from the working directory when no path is given.
pub const CONFIG_FILE_NAME: &str = "telltale.toml";

/// Prefix for environment overrides (`TELLTALE_WAIT__TIMEOUT_MS=5000`).
pub const ENV_PREFIX: &str = "TELLTALE_";

/// Comma-separated override for the accepted click event types.
pub const CLICK_EVENT_TYPES_ENV: &str = "TELLTALE_CLICK_EVENT_TYPES";

impl TelltaleConfig {
    /// Builds the provider stack without extracting it.
    /// Priority: environment variables > config file > defaults
    #[must_use]
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let config_file = config_path.map(Path::to_path_buf).or_else(|| {
            let default_path = Path::new(CONFIG_FILE_NAME);
            default_path.exists().then(|| default_path.to_path_buf())
        });

        if let Some(path) = config_file {
            debug!("Merging config file {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        // The click list is a plain comma-separated string, handled in `load`.
        figment.merge(
            Env::prefixed(ENV_PREFIX)
                .split("__")
                .ignore(&["click_event_types"]),
        )
    }

    /// Loads and validates configuration from defaults, file and environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` when a source cannot be parsed and
    /// `ConfigError::InvalidValue` when validation fails.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config: Self = Self::figment(config_path).extract()?;

        if let Ok(raw) = std::env::var(CLICK_EVENT_TYPES_ENV) {
            let types = parse_event_type_list(&raw);
            if !types.is_empty() {
                config.click_event_types = types;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "endpoint.host",
                reason: "collector host must not be empty".to_string(),
            });
        }

        if self.endpoint.path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "endpoint.path",
                reason: "ingestion path must not be empty".to_string(),
            });
        }

        if self.wait.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "wait.poll_interval_ms",
                reason: "poll interval must be greater than zero".to_string(),
            });
        }

        if self.wait.poll_interval_ms >= self.wait.timeout_ms {
            return Err(ConfigError::InvalidValue {
                field: "wait.poll_interval_ms",
                reason: format!(
                    "poll interval ({}ms) must be shorter than the timeout ({}ms)",
                    self.wait.poll_interval_ms, self.wait.timeout_ms
                ),
            });
        }

        Ok(())
    }
}

/// Splits a comma-separated list of event types, dropping blanks.
#[must_use]
pub fn parse_event_type_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_event_type_list_trims_and_drops_blanks() {
        assert_eq!(
            parse_event_type_list(" Clicked CTA, ,Clicked Link ,"),
            vec!["Clicked CTA".to_string(), "Clicked Link".to_string()]
        );
        assert!(parse_event_type_list("  ").is_empty());
    }

    #[test]
    fn validate_rejects_poll_interval_not_shorter_than_timeout() {
        let mut config = TelltaleConfig::default();
        config.wait.timeout_ms = 500;
        config.wait.poll_interval_ms = 500;

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "wait.poll_interval_ms",
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_empty_endpoint() {
        let mut config = TelltaleConfig::default();
        config.endpoint.path = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
