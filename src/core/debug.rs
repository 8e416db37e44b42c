//! Logging setup. `POWERLANG_DEBUG=1` turns on debug output without `-v`.
use tracing::level_filters::LevelFilter;

pub fn env_enabled() -> bool {
    std::env::var("POWERLANG_DEBUG").ok().as_deref() == Some("1")
}

pub fn level_for(verbose: u8, env_debug: bool) -> LevelFilter {
    match verbose {
        0 if env_debug => LevelFilter::DEBUG,
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the stderr subscriber. Safe to call more than once; later calls are no-ops.
pub fn init_logging(verbose: u8) {
    let level = level_for(verbose, env_enabled());
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(0, false), LevelFilter::WARN);
        assert_eq!(level_for(0, true), LevelFilter::DEBUG);
        assert_eq!(level_for(1, false), LevelFilter::DEBUG);
        assert_eq!(level_for(3, false), LevelFilter::TRACE);
    }
}
