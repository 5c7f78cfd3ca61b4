// Copyright 2020 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use std::thread;

use log::{Log, Metadata, Record};
use serde::{Deserialize, Deserializer, Serialize};
use utils::time::LocalTime;

/// Level used until a configuration says otherwise. Warnings and errors only, so command
/// output stays readable.
pub const DEFAULT_LEVEL: log::LevelFilter = log::LevelFilter::Warn;
/// Tag used when [`LOG_TAG`] was never set.
pub const DEFAULT_LOG_TAG: &str = "pci-helper";
/// Tag prefixed to every log line.
pub static LOG_TAG: OnceLock<String> = OnceLock::new();

/// The logger.
pub static LOGGER: Logger = Logger::new();

/// Error type for [`Logger::init`].
pub type LoggerInitError = log::SetLoggerError;

/// Error type for [`Logger::update`].
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum LoggerUpdateError {
    /// Failed to open log file {0:?}: {1}
    OpenLogFile(PathBuf, std::io::Error),
}

#[derive(Debug)]
enum LogTarget {
    Stderr,
    File(File),
}

impl LogTarget {
    fn write_line(&mut self, line: &str) {
        // Nowhere left to report a failed log write.
        let _ = match self {
            LogTarget::Stderr => std::io::stderr().write_all(line.as_bytes()),
            LogTarget::File(file) => file.write_all(line.as_bytes()),
        };
    }
}

#[derive(Debug)]
struct LoggerState {
    target: LogTarget,
    module: Option<String>,
    show_level: bool,
    show_log_origin: bool,
}

impl LoggerState {
    /// Renders `record` as one log line, `None` if the module filter drops it.
    fn format(&self, record: &Record) -> Option<String> {
        if let Some(module) = &self.module {
            if !record.module_path().is_some_and(|path| path.starts_with(module)) {
                return None;
            }
        }

        let mut prefix = format!(
            "{}:{}",
            LOG_TAG.get().map_or(DEFAULT_LOG_TAG, String::as_str),
            thread::current().name().unwrap_or("-")
        );
        if self.show_level {
            prefix.push_str(&format!(":{}", record.level()));
        }
        if self.show_log_origin {
            let line = record.line().map_or_else(|| "?".to_string(), |l| l.to_string());
            prefix.push_str(&format!(":{}:{line}", record.file().unwrap_or("?")));
        }
        Some(format!("{} [{prefix}] {}\n", LocalTime::now(), record.args()))
    }
}

/// Line oriented [`Log`] implementation writing to stderr or to a file.
#[derive(Debug)]
pub struct Logger(Mutex<LoggerState>);

impl Logger {
    const fn new() -> Self {
        Logger(Mutex::new(LoggerState {
            target: LogTarget::Stderr,
            module: None,
            show_level: true,
            show_log_origin: false,
        }))
    }

    /// Installs the logger as the `log` backend, at [`DEFAULT_LEVEL`].
    pub fn init(&'static self) -> Result<(), LoggerInitError> {
        log::set_logger(self)?;
        log::set_max_level(DEFAULT_LEVEL);
        Ok(())
    }

    /// Applies `config`. Fields left unset keep their current value, except the level which
    /// falls back to [`DEFAULT_LEVEL`].
    pub fn update(&self, config: LoggerConfig) -> Result<(), LoggerUpdateError> {
        let target = match config.log_path {
            Some(path) => Some(LogTarget::File(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|err| LoggerUpdateError::OpenLogFile(path, err))?,
            )),
            None => None,
        };

        let mut state = self.0.lock().unwrap();
        if let Some(target) = target {
            state.target = target;
        }
        if let Some(show_level) = config.show_level {
            state.show_level = show_level;
        }
        if let Some(show_log_origin) = config.show_log_origin {
            state.show_log_origin = show_log_origin;
        }
        if config.module.is_some() {
            state.module = config.module;
        }
        log::set_max_level(config.level.map_or(DEFAULT_LEVEL, log::LevelFilter::from));
        Ok(())
    }
}

impl Log for Logger {
    // Level filtering is left to `log::max_level`.
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let mut state = self.0.lock().unwrap();
        if let Some(line) = state.format(record) {
            state.target.write_line(&line);
        }
    }

    fn flush(&self) {}
}

/// Logger settings, as found under `logger` in the configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    /// File the logs are appended to. Logs go to stderr when unset.
    pub log_path: Option<PathBuf>,
    /// Most verbose level written.
    pub level: Option<LevelFilter>,
    /// Whether lines carry the level.
    pub show_level: Option<bool>,
    /// Whether lines carry the source file and line.
    pub show_log_origin: Option<bool>,
    /// Only records from modules starting with this path are written.
    pub module: Option<String>,
}

/// Log level filter, accepted in any letter case and with `warning` as an alias of `warn`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LevelFilter {
    /// [`log::LevelFilter::Off`]
    Off,
    /// [`log::LevelFilter::Trace`]
    Trace,
    /// [`log::LevelFilter::Debug`]
    Debug,
    /// [`log::LevelFilter::Info`]
    Info,
    /// [`log::LevelFilter::Warn`]
    Warn,
    /// [`log::LevelFilter::Error`]
    Error,
}

impl From<LevelFilter> for log::LevelFilter {
    fn from(filter: LevelFilter) -> log::LevelFilter {
        match filter {
            LevelFilter::Off => log::LevelFilter::Off,
            LevelFilter::Trace => log::LevelFilter::Trace,
            LevelFilter::Debug => log::LevelFilter::Debug,
            LevelFilter::Info => log::LevelFilter::Info,
            LevelFilter::Warn => log::LevelFilter::Warn,
            LevelFilter::Error => log::LevelFilter::Error,
        }
    }
}

impl From<log::LevelFilter> for LevelFilter {
    fn from(filter: log::LevelFilter) -> LevelFilter {
        match filter {
            log::LevelFilter::Off => LevelFilter::Off,
            log::LevelFilter::Trace => LevelFilter::Trace,
            log::LevelFilter::Debug => LevelFilter::Debug,
            log::LevelFilter::Info => LevelFilter::Info,
            log::LevelFilter::Warn => LevelFilter::Warn,
            log::LevelFilter::Error => LevelFilter::Error,
        }
    }
}

/// Error type for [`<LevelFilter as FromStr>::from_str`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Unknown log level: {0}")]
pub struct LevelFilterFromStrError(String);

impl FromStr for LevelFilter {
    type Err = LevelFilterFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("warning") {
            return Ok(LevelFilter::Warn);
        }
        // `log` already ignores case.
        log::LevelFilter::from_str(s)
            .map(LevelFilter::from)
            .map_err(|_| LevelFilterFromStrError(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for LevelFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let level = String::deserialize(deserializer)?;
        level.parse().map_err(D::Error::custom)
    }
}
