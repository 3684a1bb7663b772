//! Tracing subscriber setup for binaries and tests.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the application. [`init`] is the one the `midi-ports` binary uses.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// Build the filter: `RUST_LOG` if set, else the configured directive.
///
/// An unparsable directive falls back to `info`.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::try_new(&config.level).unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .parse_lossy("")
    })
}

/// Install a global fmt subscriber.
///
/// Returns `false` if a global subscriber was already set, in which case
/// nothing changes.
pub fn init(config: &LoggingConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Full => builder.try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        let config = LoggingConfig::default();
        let _ = init(&config);
        assert!(!init(&config));
    }

    #[test]
    fn test_bad_directive_falls_back() {
        let config = LoggingConfig {
            level: "midi_port_driver=loud".to_string(),
            ..LoggingConfig::default()
        };
        // Must not panic.
        let _ = env_filter(&config);
    }
}
