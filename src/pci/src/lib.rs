// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Querying and control layer over the host's PCI device inventory.
//!
//! Inventory questions are answered by running `lspci`, `lsvpd` and `lscfg` and by reading
//! `/sys/bus/pci` and `/proc/device-tree`. State changes (driver bind/unbind, device
//! remove/rescan, IOMMU domain type) are single writes to sysfs control files, each confirmed
//! by polling the matching post-condition for a bounded amount of time.
//!
//! Nothing is cached: every call observes the host as it is at that moment, and two calls
//! about the same device may see different states. Mutating operations assume the caller has
//! exclusive use of the device while they run.

use std::time::Duration;

pub mod accessor;
pub mod class;
pub mod config;
pub mod control;
pub mod domain;
pub mod layout;
pub mod logger;
pub mod parsers;
pub mod query;
#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::accessor::{AccessError, CommandOutput, HostAccessor, SystemAccessor};
pub use crate::config::{ConfigError, PciConfig};
pub use crate::control::{PciAction, PollSettings};
pub use crate::domain::{IommuDomainType, IommuDomainTypeFromStrError};
pub use crate::layout::SysLayout;
pub use crate::parsers::{HardwareConfig, ParseError, Vpd};

use utils::wait::{Clock, MonotonicClock};

/// Errors returned by the PCI operations.
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum PciError {
    /// {0}
    Access(#[from] AccessError),
    /// {0}
    Parse(#[from] ParseError),
    /// {0}
    DomainType(#[from] IommuDomainTypeFromStrError),
    /// Invalid argument: {0}
    InvalidArgument(String),
    /// Not found: {0}
    NotFound(String),
    /// {address}: {action} not confirmed within {timeout:?}
    ActionTimeout {
        /// What was attempted.
        action: PciAction,
        /// Device the action targeted.
        address: String,
        /// How long the post-condition was polled for.
        timeout: Duration,
    },
}

/// Entry point to every query and control operation.
///
/// `A` is how the host is reached and `C` is the clock the control operations poll on; both
/// are swapped out in tests.
#[derive(Debug)]
pub struct PciManager<A = SystemAccessor, C = MonotonicClock> {
    host: A,
    layout: SysLayout,
    poll: PollSettings,
    clock: C,
}

impl PciManager {
    /// Manager for the real host, configured by `config`.
    pub fn from_config(config: &PciConfig) -> Self {
        PciManager::new(SystemAccessor, config.layout()).with_poll(config.poll_settings())
    }
}

impl<A: HostAccessor> PciManager<A> {
    /// Manager reaching the host through `host`, with the default poll settings.
    pub fn new(host: A, layout: SysLayout) -> Self {
        PciManager {
            host,
            layout,
            poll: PollSettings::default(),
            clock: MonotonicClock,
        }
    }
}

impl<A: HostAccessor, C: Clock> PciManager<A, C> {
    /// Replaces the clock used while polling.
    pub fn with_clock<T: Clock>(self, clock: T) -> PciManager<A, T> {
        PciManager {
            host: self.host,
            layout: self.layout,
            poll: self.poll,
            clock,
        }
    }

    /// Replaces the timeout and interval used while polling.
    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn host(&self) -> &A {
        &self.host
    }

    /// Where sysfs and procfs paths are rooted.
    pub fn layout(&self) -> &SysLayout {
        &self.layout
    }

    pub fn poll_settings(&self) -> PollSettings {
        self.poll
    }
}
