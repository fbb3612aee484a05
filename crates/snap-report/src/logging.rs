//! Console logging.
//!
//! Everything the reporter prints (suite setup, test start and end, captured
//! screenshots, absorbed errors) goes through `tracing`. [`init`] installs a
//! `tracing-subscriber` formatter; `RUST_LOG` overrides the verbosity.

use tracing_subscriber::EnvFilter;

/// Console verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Warnings and errors only
    Quiet,
    /// Test lifecycle and steps
    #[default]
    Normal,
    /// Include file housekeeping
    Verbose,
    /// Everything
    Debug,
}

impl Verbosity {
    /// Filter directive for this level
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "info",
            Self::Verbose => "debug",
            Self::Debug => "trace",
        }
    }
}

/// Install the global console subscriber.
///
/// Returns `false` if a subscriber was already installed, in which case the
/// existing one keeps running.
pub fn init(verbosity: Verbosity) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

/// Install a JSON-lines subscriber, for CI log collectors.
pub fn init_json(verbosity: Verbosity) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_normal() {
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn test_directives() {
        assert_eq!(Verbosity::Quiet.directive(), "warn");
        assert_eq!(Verbosity::Normal.directive(), "info");
        assert_eq!(Verbosity::Verbose.directive(), "debug");
        assert_eq!(Verbosity::Debug.directive(), "trace");
    }

    #[test]
    fn test_second_init_is_noop() {
        let _ = init(Verbosity::Quiet);
        assert!(!init(Verbosity::Debug));
        assert!(!init_json(Verbosity::Debug));
    }
}
