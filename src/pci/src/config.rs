// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::PollSettings;
use crate::layout::{DEFAULT_PROCFS_ROOT, DEFAULT_SYSFS_ROOT, SysLayout};
use crate::logger::LoggerConfig;

/// Default time a control operation waits for its post-condition, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
/// Default time between two post-condition checks, in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 100;

/// Errors raised while loading the configuration.
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum ConfigError {
    /// Failed to read config file {0:?}: {1}
    Read(PathBuf, io::Error),
    /// Invalid config: {0}
    Json(#[from] serde_json::Error),
    /// Poll interval must be between 1 and 999 ms, got {0}
    Interval(u64),
}

/// Settings of the PCI helpers, usually read from a JSON file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct PciConfig {
    /// Where sysfs is mounted.
    pub sysfs_root: PathBuf,
    /// Where procfs is mounted.
    pub procfs_root: PathBuf,
    /// How long control operations wait for their effect, in seconds.
    pub timeout_secs: u64,
    /// Time between two checks while waiting, in milliseconds.
    pub interval_ms: u64,
    /// Logger settings.
    pub logger: Option<LoggerConfig>,
}

impl Default for PciConfig {
    fn default() -> Self {
        PciConfig {
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            procfs_root: PathBuf::from(DEFAULT_PROCFS_ROOT),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            interval_ms: DEFAULT_INTERVAL_MS,
            logger: None,
        }
    }
}

impl PciConfig {
    /// Parses a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PciConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the JSON file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read(path.to_path_buf(), err))?;
        PciConfig::from_json(&json)
    }

    /// Rejects settings the poll loop cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 || self.interval_ms >= 1000 {
            return Err(ConfigError::Interval(self.interval_ms));
        }
        Ok(())
    }

    pub fn layout(&self) -> SysLayout {
        SysLayout::new(&self.sysfs_root, &self.procfs_root)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            interval: Duration::from_millis(self.interval_ms),
        }
    }
}
