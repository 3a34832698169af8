//! Tracing subscriber setup for the engine's background tasks.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber, filtered to this crate at `level` (from the
/// `[log]` config section). `RUST_LOG` takes precedence when set. Embedding
/// apps that install their own subscriber win: a second install attempt is a
/// no-op, so constructing the engine never panics over logging.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("backup_engine={level}")))
        .unwrap_or_else(|_| EnvFilter::new("backup_engine=info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init("debug");
        // The second install is silently skipped, not a panic
        init("not a directive !!");
    }
}
