//! Configuration for telltale.
//!
//! Settings are layered with figment: built-in defaults, then an optional
//! `telltale.toml`, then `TELLTALE_`-prefixed environment variables
//! (`__` separates nested keys).
//!
//! ```ignore
//! use telltale_config::TelltaleConfig;
//!
//! let config = TelltaleConfig::load(None)?;
//! assert_eq!(config.endpoint.path, "/2/httpapi");
//! ```

pub mod error;
mod loading;
pub mod settings;

pub use error::{ConfigError, Result};
pub use loading::{CLICK_EVENT_TYPES_ENV, CONFIG_FILE_NAME, ENV_PREFIX, parse_event_type_list};
pub use settings::{
    BrowserSettings, ConsentSettings, DEFAULT_CLICK_EVENT_TYPES, DEFAULT_COLLECTOR_HOST,
    DEFAULT_INGESTION_PATH, EndpointSettings, TelltaleConfig, WaitSettings,
};
