//! Structured logging setup
//!
//! Every stage logs through `tracing` with `request_id` and `stage` fields.
//! Binaries call `init_tracing` once at startup; libraries never install a
//! subscriber themselves.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber
///
/// `RUST_LOG` wins over `default_filter` when set. Calling this twice is a
/// no-op.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing("policy_simulator_core_rs=debug");
        init_tracing("policy_simulator_core_rs=info");
        tracing::info!("still logging");
    }
}
