use std::env;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SHELL_POWERLINE_LOG";
pub const DEBUG_ENV: &str = "SHELL_POWERLINE_DEBUG";

/// Whether debug output was requested through the environment.
pub fn debug_enabled() -> bool {
    env::var(DEBUG_ENV).is_ok_and(|value| !value.is_empty() && value != "0")
}

fn default_directive(debug: bool) -> &'static str {
    if debug || debug_enabled() {
        "debug"
    } else {
        "warn"
    }
}

/// Install the stderr subscriber. Stdout carries the prompt, so nothing may
/// be logged there. Calling this twice is harmless.
pub fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(true), "debug");
    }

    #[test]
    fn test_init_twice() {
        init_logging(false);
        init_logging(true);
        tracing::debug!("still alive");
    }
}
