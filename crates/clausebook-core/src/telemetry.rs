//! Global subscriber setup for the `clausebook` binary.
//!
//! Logs go to stderr; stdout carries command output (contract JSON,
//! cluster maps, exported playbooks) and must stay clean.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const CRATES: [&str; 4] = [
    "clausebook",
    "clausebook_core",
    "clausebook_providers",
    "clausebook_extract",
];

/// Filter used when `RUST_LOG` is unset: `level` for this workspace,
/// warnings only for dependencies such as reqwest and hyper.
pub fn default_filter(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|c| format!("{c}={level}")));
    directives.join(",")
}

/// Install the process subscriber. `RUST_LOG` wins over `level`; `json`
/// switches to one JSON object per line. Later calls are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let text = (!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
    let json = json.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()
        .ok();
}
