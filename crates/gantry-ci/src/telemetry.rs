//! Tracing setup for gantry binaries.
//!
//! Log lines go to stderr so `gantry run` can print its report on
//! stdout without interleaving. The `GANTRY_LOG` environment variable
//! overrides the default level with a full filter directive.

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

const FILTER_ENV: &str = "GANTRY_LOG";

/// Install the global subscriber.
///
/// `level` is the default verbosity; `json` switches to
/// newline-delimited JSON lines for log collectors. A second call
/// leaves the already-installed subscriber in place.
pub fn init_tracing(json: bool, level: Level) {
    let custom = std::env::var(FILTER_ENV).ok();
    let builder = fmt()
        .with_env_filter(build_filter(custom.as_deref(), level))
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.compact().try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

fn build_filter(custom: Option<&str>, level: Level) -> EnvFilter {
    custom
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(level.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_does_not_panic() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }

    #[test]
    fn test_filter_defaults_to_level() {
        let filter = build_filter(None, Level::WARN);
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn test_filter_prefers_custom_directives() {
        let filter = build_filter(Some("gantry_ci=debug"), Level::WARN);
        assert_eq!(filter.to_string(), "gantry_ci=debug");
    }

    #[test]
    fn test_filter_falls_back_on_invalid_directives() {
        let filter = build_filter(Some("gantry_ci=debug=extra"), Level::INFO);
        assert_eq!(filter.to_string(), "info");
    }
}
