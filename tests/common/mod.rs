//! Common test utilities shared across integration and E2E tests

pub mod script;
pub mod session;

// Re-export commonly used items
pub use script::*;
pub use session::*;

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("runbox_sandbox=debug,runbox_common=debug")
        .with_test_writer()
        .try_init();
}

/// A session config with the given run limit and otherwise defaults.
pub fn config_with_timeout(limit: std::time::Duration) -> runbox_sandbox::SandboxConfig {
    let mut config = runbox_sandbox::SandboxConfig::default();
    config.limits.max_duration = Some(limit);
    config
}
