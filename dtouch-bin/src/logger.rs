use crate::{
    error::{AppError, AppResult},
    settings::Settings,
};
use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};
use tracing::{subscriber::set_global_default, Level};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::DynFilterFn,
    fmt::{self},
    layer::SubscriberExt,
    Layer, Registry,
};

fn level_to_u8(level: Level) -> u8 {
    match level {
        Level::ERROR => 0,
        Level::WARN => 1,
        Level::INFO => 2,
        Level::DEBUG => 3,
        Level::TRACE => 4,
    }
}

fn u8_to_level(v: u8) -> Level {
    match v {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Parse a level name such as `info` or `DEBUG`.
pub fn parse_level(s: &str) -> AppResult<Level> {
    Level::from_str(s.trim()).map_err(|_| AppError::from(format!("Invalid log level '{s}'")))
}

/// Console plus daily rolling file logging, sharing one adjustable level.
pub struct Logger {
    level: Arc<AtomicU8>,
    directory: String,
    file_name: String,
    _file_guard: Option<WorkerGuard>,
}

impl Logger {
    pub fn new(level: Option<Level>, directory: &str, file_name: &str) -> Self {
        Logger {
            level: Arc::new(AtomicU8::new(level_to_u8(level.unwrap_or(Level::INFO)))),
            directory: directory.to_string(),
            file_name: file_name.to_string(),
            _file_guard: None,
        }
    }

    #[inline]
    pub fn set_level(&self, new_level: Level) {
        self.level.store(level_to_u8(new_level), Ordering::Relaxed);
    }

    #[inline]
    pub fn get_level(&self) -> Level {
        u8_to_level(self.level.load(Ordering::Relaxed))
    }

    /// Re-read `log.level` from the settings at `config_path` and apply it.
    ///
    /// Returns the previous and the new level.
    pub fn reload_level(&self, config_path: &str) -> AppResult<(Level, Level)> {
        let settings = Settings::new(config_path)?;
        let level = parse_level(&settings.log.level)?;
        let previous = self.get_level();
        self.set_level(level);
        Ok((previous, level))
    }

    /// Install the global subscriber.
    ///
    /// The returned logger must be kept alive for the file writer to flush.
    pub fn initialize(&mut self) -> AppResult<()> {
        let file_appender = rolling::daily(&self.directory, &self.file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        self._file_guard = Some(guard);

        let console_filter = {
            let level = Arc::clone(&self.level);
            DynFilterFn::new(move |metadata, _| {
                *metadata.level() <= u8_to_level(level.load(Ordering::Relaxed))
            })
        };

        let file_filter = {
            let level = Arc::clone(&self.level);
            DynFilterFn::new(move |metadata, _| {
                *metadata.level() <= u8_to_level(level.load(Ordering::Relaxed))
            })
        };

        let console_layer = {
            #[cfg(debug_assertions)]
            let layer = fmt::layer()
                .with_writer(std::io::stdout)
                .with_file(true)
                .with_line_number(true);

            #[cfg(not(debug_assertions))]
            let layer = fmt::layer().with_writer(std::io::stdout);

            layer.with_filter(console_filter)
        };

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_filter(file_filter);

        let subscriber = Registry::default().with(console_layer).with(file_layer);
        set_global_default(subscriber).map_err(|_| AppError::from("Failed to set logger"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_round_trip() {
        let logger = Logger::new(None, "logs", "test.log");
        assert_eq!(logger.get_level(), Level::INFO);
        for level in [
            Level::ERROR,
            Level::WARN,
            Level::INFO,
            Level::DEBUG,
            Level::TRACE,
        ] {
            logger.set_level(level);
            assert_eq!(logger.get_level(), level);
        }
    }

    #[test]
    fn reload_applies_level_from_settings_file() {
        let path = std::env::temp_dir().join(format!("dtouch-logger-{}.toml", std::process::id()));
        std::fs::write(&path, "[log]\nlevel = \"debug\"\n").unwrap();

        let logger = Logger::new(Some(Level::WARN), "logs", "test.log");
        let (previous, level) = logger.reload_level(&path.to_string_lossy()).unwrap();
        assert_eq!(previous, Level::WARN);
        assert_eq!(level, Level::DEBUG);
        assert_eq!(logger.get_level(), Level::DEBUG);

        std::fs::write(&path, "[log]\nlevel = \"loud\"\n").unwrap();
        assert!(logger.reload_level(&path.to_string_lossy()).is_err());
        assert_eq!(logger.get_level(), Level::DEBUG);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn parses_level_names() {
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level(" WARN ").unwrap(), Level::WARN);
        assert!(parse_level("loud").is_err());
    }
}
