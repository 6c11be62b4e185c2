//! Tracing setup for the `faultcorpus` binary.
//!
//! Reports go to stdout, so every log line goes to stderr. Call
//! [`init_tracing`] once at start; a second call is a no-op.

use tracing::Level;
use tracing_subscriber::filter::{Directive, EnvFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Crates whose events follow the requested level. Everything else is
/// held at `warn` unless `RUST_LOG` says otherwise.
const OWN_TARGETS: &[&str] = &["faultcorpus", "faultcorpus_core", "faultcorpus_oracle"];

/// Filter used when `RUST_LOG` is unset or unparsable.
pub fn default_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_ascii_lowercase();
    let mut filter = EnvFilter::new("warn");
    for target in OWN_TARGETS {
        if let Ok(directive) = format!("{target}={level}").parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Install the global subscriber.
///
/// `json` selects newline-delimited JSON records; `level` applies to the
/// faultcorpus crates when `RUST_LOG` is unset.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    let layer = fmt::layer().with_writer(std::io::stderr).with_target(json);
    let layer = if json {
        layer.json().with_current_span(true).boxed()
    } else {
        layer.compact().boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .ok();
}
