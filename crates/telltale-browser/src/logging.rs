//! Subscriber setup for test binaries.
//!
//! The library only emits `tracing` events; call one of these once per
//! process to see capture notes and scenario output.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Verbosity of telltale output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Silent,
    Error,
    Warn,
    /// Scenario progress and matched events (default)
    #[default]
    Info,
    /// Also every captured batch and hook note
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Silent => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "silent" | "off" => Ok(LogLevel::Silent),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("Invalid log level: {other}")),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Silent => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(name)
    }
}

/// Installs a global subscriber at `level`; `RUST_LOG` directives still apply.
///
/// Only the first call in a process has any effect, and a subscriber that
/// was installed elsewhere is left in place.
pub fn init_logging(level: LogLevel) {
    INIT.call_once(|| {
        let filter = EnvFilter::builder()
            .with_default_directive(level.as_filter().into())
            .from_env_lossy();
        install(filter);
    });
}

/// Installs a global subscriber from `RUST_LOG`, defaulting to info.
pub fn init_logging_from_env() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(LogLevel::Info.to_string()));
        install(filter);
    });
}

fn install(filter: EnvFilter) {
    // try_init: test harnesses often install their own subscriber first
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false).without_time())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!(" Debug ".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("off".parse::<LogLevel>().unwrap(), LogLevel::Silent);
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for level in [LogLevel::Silent, LogLevel::Warn, LogLevel::Trace] {
            assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
        }
    }

    #[test]
    fn repeated_init_is_harmless() {
        init_logging(LogLevel::Warn);
        init_logging(LogLevel::Debug);
        init_logging_from_env();
    }
}
