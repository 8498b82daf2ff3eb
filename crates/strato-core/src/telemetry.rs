//! Tracing initialisation shared by strato binaries.
//!
//! Call [`init_tracing`] once at program start. Safe to call more than
//! once — the global subscriber can only be set once per process, later
//! calls are ignored.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` takes precedence when set. Otherwise dependencies log at
/// `warn` while the strato crates log at `level`, so `--verbose` turns up
/// reconciliation detail without drowning it in runtime internals.
/// `json` switches to newline-delimited JSON lines for log pipelines.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,strato={level},strato_core={level},strato_state={level}"
        ))
    });

    let format = if json {
        fmt::layer()
            .with_target(false)
            .json()
            .flatten_event(true)
            .boxed()
    } else {
        fmt::layer().with_target(false).compact().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init()
        .ok();
}
