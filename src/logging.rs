//! Opt-in log output.
//!
//! The library only emits `tracing` events. Hosts that have no subscriber of
//! their own (notebooks, scripts) can call [`init_tracing`] once.

use tracing_subscriber::EnvFilter;

use crate::error::{PipelineError, Result};

/// Install a global fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins over `default_filter` when set. Calling this a second time
/// is a no-op and returns `Ok(false)`.
pub fn init_tracing(default_filter: &str) -> Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter).map_err(|e| {
            PipelineError::invalid_config("log filter", format!("'{default_filter}': {e}"))
        })?,
    };

    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let first = init_tracing("debug").unwrap();
        let second = init_tracing("debug").unwrap();
        assert!(!(first && second));
    }
}
