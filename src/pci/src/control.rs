// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! State changing operations.
//!
//! Each operation writes one sysfs control file and then polls the matching post-condition
//! until it holds or the configured timeout runs out. A `true` result from the poll loop
//! always means success. The kernel side effects are not undone by this module on failure;
//! the inverse operation is the only remedy.

use std::fmt;
use std::time::Duration;

use log::{info, warn};
use utils::wait::{
    Clock, DEFAULT_INTERVAL, DEFAULT_TIMEOUT, try_wait_for_with_clock, wait_for_with_clock,
};

use crate::accessor::HostAccessor;
use crate::domain::IommuDomainType;
use crate::{PciError, PciManager};

/// How long and how often a post-condition is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Give up once this much time has passed.
    pub timeout: Duration,
    /// Time between two checks.
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// A state change that was attempted on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PciAction {
    /// Bind to the named driver.
    Bind(String),
    /// Unbind from the named driver.
    Unbind(String),
    /// Remove from the bus.
    Reset,
    /// Rediscover after a bus rescan.
    Rescan,
    /// Switch the IOMMU group to the given domain type.
    ChangeDomain(IommuDomainType),
}

impl fmt::Display for PciAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PciAction::Bind(driver) => write!(f, "bind to {driver}"),
            PciAction::Unbind(driver) => write!(f, "unbind from {driver}"),
            PciAction::Reset => write!(f, "remove"),
            PciAction::Rescan => write!(f, "rescan"),
            PciAction::ChangeDomain(domain) => write!(f, "change of IOMMU domain to {domain}"),
        }
    }
}

impl<A: HostAccessor, C: Clock> PciManager<A, C> {
    fn poll_until<F: FnMut() -> bool>(&self, predicate: F) -> bool {
        wait_for_with_clock(
            &self.clock,
            predicate,
            self.poll.timeout,
            self.poll.interval,
        )
    }

    fn timed_out(&self, action: PciAction, address: &str) -> PciError {
        let err = PciError::ActionTimeout {
            action,
            address: address.to_string(),
            timeout: self.poll.timeout,
        };
        warn!("{err}");
        err
    }

    /// Binds the device at `full_pci_address` to `driver`.
    ///
    /// Succeeds once `/sys/bus/pci/drivers/<driver>/<address>` shows up.
    pub fn bind(&self, driver: &str, full_pci_address: &str) -> Result<(), PciError> {
        info!("Binding {full_pci_address} to {driver}");
        self.host
            .write_file(&self.layout.driver_bind(driver), full_pci_address)?;

        let binding = self.layout.driver_binding(driver, full_pci_address);
        if !self.poll_until(|| self.host.exists(&binding)) {
            return Err(self.timed_out(PciAction::Bind(driver.to_string()), full_pci_address));
        }
        Ok(())
    }

    /// Unbinds the device at `full_pci_address` from `driver`.
    ///
    /// Succeeds once `/sys/bus/pci/drivers/<driver>/<address>` is gone.
    pub fn unbind(&self, driver: &str, full_pci_address: &str) -> Result<(), PciError> {
        info!("Unbinding {full_pci_address} from {driver}");
        self.host
            .write_file(&self.layout.driver_unbind(driver), full_pci_address)?;

        let binding = self.layout.driver_binding(driver, full_pci_address);
        if !self.poll_until(|| !self.host.exists(&binding)) {
            return Err(self.timed_out(PciAction::Unbind(driver.to_string()), full_pci_address));
        }
        Ok(())
    }

    /// Removes the device at `full_pci_address` from the bus.
    ///
    /// Succeeds once lspci no longer reports the device.
    pub fn reset(&self, full_pci_address: &str) -> Result<(), PciError> {
        info!("Removing {full_pci_address}");
        self.host
            .write_file(&self.layout.remove(full_pci_address), "1")?;

        if !self.poll_until(|| !self.is_present(full_pci_address)) {
            return Err(self.timed_out(PciAction::Reset, full_pci_address));
        }
        Ok(())
    }

    /// Rescans the PCI bus.
    ///
    /// Succeeds once lspci reports the device at `full_pci_address`.
    pub fn rescan(&self, full_pci_address: &str) -> Result<(), PciError> {
        info!("Rescanning the PCI bus for {full_pci_address}");
        self.host.write_file(&self.layout.rescan(), "1")?;

        if !self.poll_until(|| self.is_present(full_pci_address)) {
            return Err(self.timed_out(PciAction::Rescan, full_pci_address));
        }
        Ok(())
    }

    /// Changes the IOMMU domain type of the group of `full_pci_address` to `domain`.
    ///
    /// `default_domain` is the type the kernel falls back to when `domain` is
    /// [`IommuDomainType::Auto`], so it must be a type the kernel reports. A failure to read
    /// the type file while polling ends the operation with that error.
    pub fn change_domain(
        &self,
        domain: IommuDomainType,
        default_domain: IommuDomainType,
        full_pci_address: &str,
    ) -> Result<(), PciError> {
        if domain == IommuDomainType::Unknown {
            return Err(PciError::InvalidArgument(format!(
                "cannot change IOMMU domain to {domain}"
            )));
        }
        if matches!(
            default_domain,
            IommuDomainType::Auto | IommuDomainType::Unknown
        ) {
            return Err(PciError::InvalidArgument(format!(
                "{default_domain} is not a default IOMMU domain type"
            )));
        }

        info!("Changing IOMMU domain of {full_pci_address} to {domain}");
        self.host.write_file(
            &self.layout.iommu_group_type(full_pci_address),
            domain.as_str(),
        )?;

        let changed = try_wait_for_with_clock(
            &self.clock,
            || self.change_domain_check(domain, full_pci_address, default_domain),
            self.poll.timeout,
            self.poll.interval,
        )?;
        if !changed {
            return Err(self.timed_out(PciAction::ChangeDomain(domain), full_pci_address));
        }
        Ok(())
    }
}
