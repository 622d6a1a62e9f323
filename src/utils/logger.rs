//! Logging setup
//!
//! The engine logs under the `settle` target. `SETTLE_LOG` takes a full
//! `EnvFilter` directive and wins over the verbosity flag.

use tracing_subscriber::EnvFilter;

/// Filter directive for the engine's logs
pub const LOG_ENV: &str = "SETTLE_LOG";

/// Directive used by [`init_logger`]. An unparsable `configured` value is
/// reported on stderr and ignored.
pub fn filter_directive(verbose: bool, configured: Option<&str>) -> String {
    let fallback = if verbose { "settle=debug" } else { "settle=info" };
    match configured.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directive) => match EnvFilter::try_new(directive) {
            Ok(_) => directive.to_string(),
            Err(e) => {
                eprintln!("Ignoring {LOG_ENV}={directive}: {e}");
                fallback.to_string()
            }
        },
        None => fallback.to_string(),
    }
}

pub fn init_logger(verbose: bool) {
    let configured = std::env::var(LOG_ENV).ok();
    let filter = EnvFilter::new(filter_directive(verbose, configured.as_deref()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_picks_level() {
        assert_eq!(filter_directive(false, None), "settle=info");
        assert_eq!(filter_directive(true, None), "settle=debug");
        assert_eq!(filter_directive(true, Some("  ")), "settle=debug");
    }

    #[test]
    fn test_configured_directive_wins() {
        assert_eq!(
            filter_directive(false, Some("settle=trace,tokio=warn")),
            "settle=trace,tokio=warn"
        );
        assert_eq!(filter_directive(false, Some("settle=loud")), "settle=info");
    }
}
