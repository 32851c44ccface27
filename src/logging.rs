//! Replay-gated logging macros for workflow code.
//!
//! A workflow routine re-runs from the beginning on every invocation, so a
//! bare `tracing::info!` inside it would emit once per invocation. These
//! macros gate on the context's replay flag: a line is emitted only during
//! the invocation that first reaches it.

/// Install a default subscriber if none is set (safe to call repeatedly).
pub(crate) fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .try_init();
}

#[macro_export]
macro_rules! durable_info {
    ($ctx:expr, $($arg:tt)+) => {{
        if !$ctx.is_replaying() {
            ::tracing::info!(orchestration_id = %$ctx.orchestration_id(), $($arg)+);
        }
    }};
}

#[macro_export]
macro_rules! durable_warn {
    ($ctx:expr, $($arg:tt)+) => {{
        if !$ctx.is_replaying() {
            ::tracing::warn!(orchestration_id = %$ctx.orchestration_id(), $($arg)+);
        }
    }};
}

#[macro_export]
macro_rules! durable_error {
    ($ctx:expr, $($arg:tt)+) => {{
        if !$ctx.is_replaying() {
            ::tracing::error!(orchestration_id = %$ctx.orchestration_id(), $($arg)+);
        }
    }};
}
