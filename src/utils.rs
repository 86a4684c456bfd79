/*
 * Filename: /src/utils.rs
 * Project: corewars-vm
 */

/// activates logging through env_logger.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Info
    };
    let _ = env_logger::builder().filter_level(level).try_init();
}

pub fn is_dollar_hex(v: &str) -> bool {
    v.starts_with('$')
}
