//! Tracing setup for the pim binary.
//!
//! Logging is off unless a filter is configured. Output goes to stderr so it
//! never mixes with command output on stdout.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::resolver::DEFAULT_LOG_LEVEL;

/// Build a filter from a directive string.
///
/// Blank, oversized or unparsable directives yield `None`.
pub fn parse_filter(raw: &str) -> Option<EnvFilter> {
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > 4096 {
        return None;
    }
    EnvFilter::try_new(raw).ok()
}

/// Install the global subscriber.
///
/// A second call is a no-op.
pub fn init(directive: &str) {
    let filter = parse_filter(directive).unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        assert!(parse_filter("debug").is_some());
        assert!(parse_filter("pim=trace,warn").is_some());
        assert!(parse_filter("   ").is_none());
        assert!(parse_filter(&"x".repeat(5000)).is_none());
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init("off");
        init("not a [valid filter");
    }
}
