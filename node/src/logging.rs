//! # Relay Logging
//!
//! Sets up `tracing` for `tally-node`. The output format comes from
//! `--log-format` / `TALLY_LOG_FORMAT`, and the filter from `RUST_LOG` with a
//! per-crate default supplied by `main`.
//!
//! Every line goes to stderr; `tally-node version` prints to stdout.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How relay log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored multi-field lines with source locations.
    Pretty,
    /// One JSON object per event, for log shippers.
    Json,
}

impl LogFormat {
    /// `"json"` in any case selects [`LogFormat::Json`]; anything else,
    /// including typos, falls back to [`LogFormat::Pretty`].
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Installs the global subscriber. Panics if one is already installed.
///
/// Peer sessions log under `tally_protocol::network`, so per-peer chatter
/// can be turned up on its own:
///
/// ```text
/// RUST_LOG=tally_node=info,tally_protocol::network=debug
/// ```
pub fn init_logging(default_filter: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_current_span(false),
                )
                .init();
        }
    }

    tracing::debug!(?format, "relay logging ready");
}
