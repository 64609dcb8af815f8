pub mod builders;
pub mod runner;

use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Tracing setup shared by the integration tests.
///
/// Records go through the test writer, so they only surface for failing
/// tests (or under `-- --nocapture`). The level comes from `TASKLE_LOG` —
/// the same variable the binary honours — with `RUST_LOG` as a fallback,
/// defaulting to `info`. Reactor-level diagnostics live at `debug`, so
/// `TASKLE_LOG=debug cargo test` shows the full dispatch trace.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var("TASKLE_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .init();
    });
}
