// Copyright 2018 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]

//! Human readable logging for the PCI helpers.

mod logging;

pub use log::Level::*;
pub use log::*;

pub use crate::logger::logging::{
    DEFAULT_LEVEL, DEFAULT_LOG_TAG, LOG_TAG, LOGGER, LevelFilter, LevelFilterFromStrError,
    LoggerConfig, LoggerInitError, LoggerUpdateError,
};
