// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default mount point of sysfs.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";
/// Default mount point of procfs.
pub const DEFAULT_PROCFS_ROOT: &str = "/proc";

/// Where the kernel pseudo-filesystems are mounted, and every path derived from them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SysLayout {
    sysfs_root: PathBuf,
    procfs_root: PathBuf,
}

impl Default for SysLayout {
    fn default() -> Self {
        SysLayout::new(DEFAULT_SYSFS_ROOT, DEFAULT_PROCFS_ROOT)
    }
}

impl SysLayout {
    /// Creates a layout rooted at the given sysfs and procfs mount points.
    pub fn new<S: Into<PathBuf>, P: Into<PathBuf>>(sysfs_root: S, procfs_root: P) -> Self {
        SysLayout {
            sysfs_root: sysfs_root.into(),
            procfs_root: procfs_root.into(),
        }
    }

    pub fn sysfs_root(&self) -> &Path {
        &self.sysfs_root
    }

    pub fn procfs_root(&self) -> &Path {
        &self.procfs_root
    }

    fn pci_bus(&self) -> PathBuf {
        self.sysfs_root.join("bus/pci")
    }

    /// `/sys/bus/pci/devices/<address>`
    pub fn device(&self, address: &str) -> PathBuf {
        self.pci_bus().join("devices").join(address)
    }

    /// `/sys/bus/pci/devices/<address>/<attribute>`
    pub fn device_attr(&self, address: &str, attribute: &str) -> PathBuf {
        self.device(address).join(attribute)
    }

    /// `/sys/bus/pci/devices/<address>/remove`
    pub fn remove(&self, address: &str) -> PathBuf {
        self.device_attr(address, "remove")
    }

    /// `/sys/bus/pci/devices/<address>/iommu_group/type`
    pub fn iommu_group_type(&self, address: &str) -> PathBuf {
        self.device(address).join("iommu_group/type")
    }

    /// `/sys/bus/pci/drivers/<driver>`
    pub fn driver(&self, driver: &str) -> PathBuf {
        self.pci_bus().join("drivers").join(driver)
    }

    /// `/sys/bus/pci/drivers/<driver>/bind`
    pub fn driver_bind(&self, driver: &str) -> PathBuf {
        self.driver(driver).join("bind")
    }

    /// `/sys/bus/pci/drivers/<driver>/unbind`
    pub fn driver_unbind(&self, driver: &str) -> PathBuf {
        self.driver(driver).join("unbind")
    }

    /// `/sys/bus/pci/drivers/<driver>/<address>`, present while the device is bound.
    pub fn driver_binding(&self, driver: &str, address: &str) -> PathBuf {
        self.driver(driver).join(address)
    }

    /// `/sys/bus/pci/rescan`
    pub fn rescan(&self) -> PathBuf {
        self.pci_bus().join("rescan")
    }

    /// `/sys/block`
    pub fn block(&self) -> PathBuf {
        self.sysfs_root.join("block")
    }

    /// `/sys/class`
    pub fn classes(&self) -> PathBuf {
        self.sysfs_root.join("class")
    }

    /// `/sys/class/<class>`
    pub fn class(&self, class: &str) -> PathBuf {
        self.classes().join(class)
    }

    /// `/proc/device-tree/<devspec>/ibm,loc-code`
    ///
    /// `devspec` is the absolute device tree path found in the device's sysfs `devspec` file.
    pub fn loc_code(&self, devspec: &str) -> PathBuf {
        self.procfs_root
            .join("device-tree")
            .join(devspec.trim_start_matches('/'))
            .join("ibm,loc-code")
    }
}
