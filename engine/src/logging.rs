use crate::config::LoggingConfig;
use log::LevelFilter;

pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Warn,
    }
}

/// Install the global logger: stderr always, plus `config.output` if set.
/// `verbose` raises the level to at least `info`.
pub fn setup_logging(config: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let mut level = parse_level(&config.level);
    if verbose && level < LevelFilter::Info {
        level = LevelFilter::Info;
    }

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        // reqwest/hyper internals are noise at our levels
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(std::io::stderr());

    if let Some(path) = &config.output {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}
