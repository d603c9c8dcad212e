use crate::core::config::LoggingConfig;
use crate::core::error::InitProcessError;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;

pub fn setup_logger(config: &LoggingConfig) -> Result<(), InitProcessError> {
    let level = LevelFilter::from_str(&config.level)
        .map_err(|e| InitProcessError::LoggerError(format!("{}: {}", config.level, e)))?;

    // 実行ごとに上書きせず追記する
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file)
        .map_err(|e| InitProcessError::LoggerError(format!("{}: {}", config.file, e)))?;

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(file)))
        .try_init()
        .map_err(|e| InitProcessError::LoggerError(e.to_string()))?;

    Ok(())
}
