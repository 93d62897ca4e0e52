// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! Log setup through log4rs, reference
//! https://docs.rs/log4rs
//!
//! The crate itself only uses the `log` facade, embedders that already
//! install a logger can skip this module.

use log::LevelFilter;

#[cfg(feature = "log4rs")]
use crate::util::get_abs_path;
#[cfg(feature = "log4rs")]
use log4rs::{
    append::{console::ConsoleAppender, file::FileAppender},
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

#[cfg(feature = "log4rs")]
const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {l} {t} {m}{n}";

/// Installs the global logger. Logs go to `file_path` when given,
/// to stderr otherwise.
#[cfg(feature = "log4rs")]
pub fn init_log(level: LevelFilter, file_path: Option<&str>) -> Result<(), String> {
    let encoder = || Box::new(PatternEncoder::new(LOG_PATTERN));
    let appender: Appender = match file_path {
        Some(fp) => {
            let logfile = FileAppender::builder()
                .encoder(encoder())
                .build(get_abs_path(fp))
                .map_err(|e| format!("log file {}: {}", fp, e))?;
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(level)))
                .build("gl2d", Box::new(logfile))
        }
        None => {
            let console = ConsoleAppender::builder()
                .encoder(encoder())
                .target(log4rs::append::console::Target::Stderr)
                .build();
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(level)))
                .build("gl2d", Box::new(console))
        }
    };
    let config = Config::builder()
        .appender(appender)
        .build(Root::builder().appender("gl2d").build(level))
        .map_err(|e| e.to_string())?;
    log4rs::init_config(config).map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(not(feature = "log4rs"))]
pub fn init_log(level: LevelFilter, _file_path: Option<&str>) -> Result<(), String> {
    log::set_max_level(level);
    Ok(())
}

/// logger from the `log_level` and `log_file` of a config
pub fn init_log_from_config(cfg: &crate::config::DisplayConfig) -> Result<(), String> {
    let level = cfg.level_filter().map_err(|e| e.to_string())?;
    init_log(level, cfg.log_file.as_deref())
}
