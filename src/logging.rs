//! tracing subscriber setup. Logs go to stderr so they never interleave with
//! the status lines on stdout.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::BatchError;

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
/// Calling this twice is harmless; the first subscriber stays.
pub fn init(level: &str) -> Result<(), BatchError> {
    let filter = mk_filter(level)?;
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
    Ok(())
}

fn mk_filter(level: &str) -> Result<EnvFilter, BatchError> {
    match std::env::var("RUST_LOG") {
        Ok(env) if !env.is_empty() => EnvFilter::try_new(&env)
            .map_err(|_| BatchError::Config(format!("invalid RUST_LOG filter: {env}"))),
        _ => EnvFilter::try_new(level)
            .map_err(|_| BatchError::Config(format!("invalid log level: {level}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_filters_for_known_levels() {
        for level in ["warn", "debug", "jarsweep=trace,info"] {
            assert!(EnvFilter::try_new(level).is_ok(), "{level}");
        }
    }

    #[test]
    fn init_twice_is_harmless() {
        init("warn").unwrap();
        init("debug").unwrap();
    }
}
