use log::LevelFilter;
use std::io::Write;

/// Installs the global `env_logger` backend.
///
/// An explicit `level` wins over `RUST_LOG`, `info` is the fallback. Calling
/// this twice keeps the first logger.
pub fn init_logging(level: Option<&str>) {
    let log_level = level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| std::env::var("RUST_LOG").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(LevelFilter::Info);

    let installed = env_logger::Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5}] {}",
                buf.timestamp_seconds(),
                record.level(),
                record.args()
            )
        })
        .try_init()
        .is_ok();
    if installed {
        log::debug!("Logger initialized (level: {})", log_level);
    }
}
