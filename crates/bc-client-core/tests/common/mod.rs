//! Shared integration-test harness: a once-only `tracing-subscriber` init so
//! test output carries the same `tracing` spans the crate emits at runtime.

use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}
