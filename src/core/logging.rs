//! Logging initialization

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable.
///
/// # Example
/// ```
/// occtree::core::logging::init();
/// log::info!("Mapping started");
/// ```
pub fn init() {
    // try_init: doctests and embedding applications may install a logger first
    if let Err(e) = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    )
    .format_timestamp_millis()
    .try_init()
    {
        log::debug!("Keeping the existing logger: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_keeps_first_logger() {
        init();
        init();
        log::info!("still logging");
    }
}
