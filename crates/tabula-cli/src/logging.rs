//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the `-v` count picks the level for
//! the tabula crates and everything else stays at `warn`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogFormat;

fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_directive(verbosity: u8) -> String {
    let level = level_for(verbosity);
    format!("warn,tabula={level},tabula_cli={level},tower_http={level}")
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean.
pub fn init(verbosity: u8, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("Logging already initialised: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(default_directive(0), "warn,tabula=warn,tabula_cli=warn,tower_http=warn");
        assert!(default_directive(2).contains("tabula=debug"));
        assert!(default_directive(7).contains("tabula=trace"));
    }
}
