use std::io;

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Installs the global subscriber. Engine targets log at `level`; third-party
/// crates are capped at WARN. Output goes to stderr so stdout stays clean for
/// summaries.
pub(crate) fn setup_tracing(level: LevelFilter) {
    let level_state = level_filter_to_u8(level);
    let filter_layer = tracing_subscriber::filter::filter_fn(move |metadata| {
        let level = match level_state {
            0 => return false,
            1 => Level::ERROR,
            2 => Level::WARN,
            3 => Level::INFO,
            4 => Level::DEBUG,
            _ => Level::TRACE,
        };
        let is_voxdraw = metadata.target().starts_with("voxdraw");
        let effective_level = if is_voxdraw { level } else { Level::WARN };
        metadata.level() <= &effective_level
    });
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter_layer))
        .init();
}

pub(crate) fn level_filter_to_u8(level: LevelFilter) -> u8 {
    match level {
        LevelFilter::OFF => 0,
        LevelFilter::ERROR => 1,
        LevelFilter::WARN => 2,
        LevelFilter::INFO => 3,
        LevelFilter::DEBUG => 4,
        LevelFilter::TRACE => 5,
    }
}

pub(crate) fn parse_level(value: &str) -> Result<LevelFilter, String> {
    match value.to_ascii_lowercase().as_str() {
        "off" => Ok(LevelFilter::OFF),
        "error" => Ok(LevelFilter::ERROR),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        other => Err(format!("unknown log level '{other}'")),
    }
}

/// Reads `--log-level <level>`; defaults to INFO.
pub(crate) fn level_from_args(args: &[String]) -> Result<LevelFilter, String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--log-level" {
            let value = iter
                .next()
                .ok_or_else(|| "--log-level requires a value".to_string())?;
            return parse_level(value);
        }
    }
    Ok(LevelFilter::INFO)
}
