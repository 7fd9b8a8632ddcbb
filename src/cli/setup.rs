//! Setup and initialization functions for CLI
//!
//! Logging goes to stderr: stdout carries results and, in worker mode, the
//! job protocol.

use tracing_subscriber::EnvFilter;

/// Environment variable with a tracing filter, e.g. `couplingmap=debug`
pub const LOG_ENV: &str = "COUPLINGMAP_LOG";

/// Filter for `verbosity`; without `-v` the environment decides
pub fn log_filter(verbosity: u8) -> EnvFilter {
    match verbosity {
        0 => EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Install the global subscriber, which also receives `log` records
pub fn init_tracing(verbosity: u8) {
    let result = tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbosity))
        .with_target(verbosity > 1)
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(e) = result {
        eprintln!("Note: logging already configured: {}", e);
    }
}

/// Configure rayon global thread pool once at startup
pub fn configure_thread_pool(threads: usize) {
    let mut builder = rayon::ThreadPoolBuilder::new()
        .thread_name(|index| format!("couplingmap-rayon-{}", index));

    if threads > 0 {
        builder = builder.num_threads(threads);
    }

    if let Err(e) = builder.build_global() {
        log::debug!("Thread pool already configured: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_overrides_environment() {
        assert_eq!(log_filter(1).to_string(), "info");
        assert_eq!(log_filter(2).to_string(), "debug");
        assert_eq!(log_filter(7).to_string(), "trace");
    }
}
