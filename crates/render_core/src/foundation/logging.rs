//! Logging bootstrap over the `log` facade

pub use log::{debug, error, info, trace, warn};

/// Default filter when neither `RUST_LOG` nor a config value is set
pub const DEFAULT_FILTER: &str = "info";

/// Initialize the logging system from `RUST_LOG`, defaulting to `info`
///
/// Calling it again after a logger is installed does nothing.
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

/// Initialize the logging system with `filter` unless `RUST_LOG` overrides it
pub fn init_with_filter(filter: &str) {
    let env = env_logger::Env::default().default_filter_or(filter);
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::trace!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_tolerated() {
        init();
        init_with_filter("debug");
        info!("logger still usable");
    }
}
