// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Read-only questions about the PCI inventory.
//!
//! Partial addresses (`0000`, `0000:00:1f`, `1f`) are matched as plain substrings, so a
//! short prefix may select more than the caller intended.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use utils::wait::Clock;

use crate::accessor::HostAccessor;
use crate::class::class_name_for_id;
use crate::domain::IommuDomainType;
use crate::parsers::{
    self, HardwareConfig, Vpd, first_region_size, iommu_group, kernel_driver, lspci_prop,
    memory_address, memory_mask, parse_cfg, parse_colon_table, parse_hex_id, parse_slot,
    parse_vpd,
};
use crate::{PciError, PciManager};

/// PCI base class of bridges, left out of [`PciManager::get_pci_addresses`].
const BRIDGE_CLASS_PREFIX: &str = "06";

/// Sysfs attributes that make up the id returned by [`PciManager::get_pci_id_from_sysfs`].
const SYSFS_ID_ATTRS: [&str; 4] = ["vendor", "device", "subsystem_vendor", "subsystem_device"];

/// `lspci -nvmm` keys that make up the id returned by [`PciManager::get_pci_id`].
const LSPCI_ID_PROPS: [&str; 4] = ["Vendor", "Device", "SVendor", "SDevice"];

impl<A: HostAccessor, C: Clock> PciManager<A, C> {
    fn lspci(&self, args: &[&str]) -> String {
        self.host.stdout_lenient("lspci", args)
    }

    /// Distinct PCI domains (`0000`, `0001`, ...) of every device lspci reports.
    pub fn get_domains(&self) -> Vec<String> {
        self.lspci(&["-D"])
            .lines()
            .filter_map(|line| line.split(':').next())
            .filter(|domain| !domain.trim().is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Full addresses of every device except bridges and switches.
    ///
    /// Fails if `lspci -D` cannot be run or exits with an error.
    pub fn get_pci_addresses(&self) -> Result<Vec<String>, PciError> {
        let output = self.host.stdout_checked("lspci", &["-D"])?;
        Ok(output
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .filter(|address| {
                !self
                    .get_pci_prop(address, "Class")
                    .is_some_and(|class| class.starts_with(BRIDGE_CLASS_PREFIX))
            })
            .map(str::to_string)
            .collect())
    }

    /// Number of entries under any `/sys/class/<class>/` whose link goes through
    /// `dom_pci_address`.
    pub fn get_num_interfaces_in_pci(&self, dom_pci_address: &str) -> usize {
        let filter = format!("/{dom_pci_address}");
        let classes = match self.host.read_dir(&self.layout.classes()) {
            Ok(classes) => classes,
            Err(err) => {
                debug!("{err}");
                return 0;
            }
        };

        let mut count = 0;
        for class in classes {
            let class_dir = self.layout.class(&class);
            let Ok(entries) = self.host.read_dir(&class_dir) else {
                continue;
            };
            count += entries
                .iter()
                .filter_map(|entry| self.host.read_link(&class_dir.join(entry)).ok())
                .filter(|target| target.to_string_lossy().contains(&filter))
                .count();
        }
        count
    }

    /// Block devices (`/dev/sda`, ...) sitting behind `pci_address`.
    pub fn get_disks_in_pci_address(&self, pci_address: &str) -> Result<Vec<String>, PciError> {
        let block = self.layout.block();
        let mut devices = self.host.read_dir(&block)?;
        devices.sort();

        let mut disks = Vec::new();
        for device in devices {
            match self.host.canonicalize(&block.join(&device)) {
                Ok(path) if path.to_string_lossy().contains(pci_address) => {
                    disks.push(format!("/dev/{device}"))
                }
                Ok(_) => {}
                Err(err) => debug!("{err}"),
            }
        }
        Ok(disks)
    }

    /// Network interfaces sitting behind `pci_address`.
    pub fn get_nics_in_pci_address(&self, pci_address: &str) -> Result<Vec<String>, PciError> {
        self.get_interfaces_in_pci_address(pci_address, "net")
    }

    /// Entries of `/sys/class/<pci_class>` whose link goes through `pci_address`.
    ///
    /// Fails with [`PciError::InvalidArgument`] if the class directory does not exist.
    pub fn get_interfaces_in_pci_address(
        &self,
        pci_address: &str,
        pci_class: &str,
    ) -> Result<Vec<String>, PciError> {
        let class_dir = self.layout.class(pci_class);
        if !self.host.is_dir(&class_dir) {
            return Err(PciError::InvalidArgument(format!(
                "Class directory {class_dir:?} does not exist"
            )));
        }

        let mut entries = self.host.read_dir(&class_dir)?;
        entries.sort();
        Ok(entries
            .into_iter()
            .filter(|entry| {
                let path = class_dir.join(entry);
                self.host.is_dir(&path)
                    && self
                        .host
                        .read_link(&path)
                        .is_ok_and(|target| target.to_string_lossy().contains(pci_address))
            })
            .collect())
    }

    /// Sysfs class directory name (`net`, `nvme`, ...) of the device at `pci_address`.
    pub fn get_pci_class_name(&self, pci_address: &str) -> Result<&'static str, PciError> {
        let class_id = self.get_pci_prop(pci_address, "Class").ok_or_else(|| {
            PciError::InvalidArgument(format!(
                "Unable to get 'Class' property of PCI address {pci_address}"
            ))
        })?;
        class_name_for_id(&class_id)
    }

    /// Functions of a device, e.g. `0000:03:00.0` and `0000:03:00.1` for `0000:03:00`.
    pub fn get_pci_fun_list(&self, pci_address: &str) -> Result<Vec<String>, PciError> {
        Ok(self
            .get_pci_addresses()?
            .into_iter()
            .filter(|address| address.contains(pci_address))
            .collect())
    }

    /// Physical slot of the adapter, from the device tree location code.
    ///
    /// `None` if the device has no `devspec` or the device tree node has no location code,
    /// which is the case on anything but ppc64.
    pub fn get_slot_from_sysfs(&self, full_pci_address: &str) -> Result<Option<String>, PciError> {
        let devspec_path = self.layout.device_attr(full_pci_address, "devspec");
        if !self.host.is_file(&devspec_path) {
            return Ok(None);
        }
        let devspec = self.host.read_file(&devspec_path)?;

        let loc_code_path = self.layout.loc_code(devspec.trim());
        if !self.host.is_file(&loc_code_path) {
            return Ok(None);
        }
        let loc_code = self.host.read_file(&loc_code_path)?;
        Ok(Some(parse_slot(loc_code.trim_end_matches('\0').trim())?))
    }

    /// Distinct physical slots of every device. Devices without a slot are skipped.
    pub fn get_slot_list(&self) -> Result<Vec<String>, PciError> {
        let mut slots = BTreeSet::new();
        for address in self.get_pci_addresses()? {
            if let Some(slot) = self.get_slot_from_sysfs(&address)? {
                slots.insert(slot);
            }
        }
        Ok(slots.into_iter().collect())
    }

    /// `vendor:device:subsystem_vendor:subsystem_device` read from sysfs, each as four hex
    /// digits. `None` if the device directory does not exist.
    pub fn get_pci_id_from_sysfs(&self, full_pci_address: &str) -> Result<Option<String>, PciError> {
        if !self.host.is_dir(&self.layout.device(full_pci_address)) {
            return Ok(None);
        }
        let mut ids = Vec::with_capacity(SYSFS_ID_ATTRS.len());
        for attr in SYSFS_ID_ATTRS {
            let text = self
                .host
                .read_file(&self.layout.device_attr(full_pci_address, attr))?;
            ids.push(format!("{:04x}", parse_hex_id(&text)?));
        }
        Ok(Some(ids.join(":")))
    }

    /// Value of `prop` (`Class`, `Vendor`, ...) in `lspci -Dnvmm` output. First match only.
    pub fn get_pci_prop(&self, pci_address: &str, prop: &str) -> Option<String> {
        lspci_prop(&self.lspci(&["-Dnvmm", "-s", pci_address]), prop)
    }

    /// `Vendor:Device:SVendor:SDevice` as reported by lspci. `None` if any part is missing.
    pub fn get_pci_id(&self, pci_address: &str) -> Option<String> {
        let output = self.lspci(&["-Dnvmm", "-s", pci_address]);
        LSPCI_ID_PROPS
            .iter()
            .map(|prop| lspci_prop(&output, prop))
            .collect::<Option<Vec<_>>>()
            .map(|ids| ids.join(":"))
    }

    /// Every `Key: value` pair of `lspci -Dnvmm`. `None` if lspci printed nothing.
    pub fn get_pci_info(&self, pci_address: &str) -> Option<BTreeMap<String, String>> {
        let output = self.lspci(&["-Dnvmm", "-s", pci_address]);
        if output.trim().is_empty() {
            return None;
        }
        Some(parse_colon_table(&output))
    }

    /// Kernel driver in use, if any.
    pub fn get_driver(&self, pci_address: &str) -> Option<String> {
        kernel_driver(&self.lspci(&["-ks", pci_address]))
    }

    /// `vendor:device` id pair as printed by `lspci -n`.
    pub fn get_vendor_id(&self, full_pci_address: &str) -> Result<String, PciError> {
        parsers::vendor_id(&self.lspci(&["-n", "-s", full_pci_address])).ok_or_else(|| {
            PciError::NotFound(format!("Not able to get {full_pci_address} vendor id"))
        })
    }

    /// IOMMU group number of the device.
    pub fn get_iommu_group(&self, full_pci_address: &str) -> Result<String, PciError> {
        iommu_group(&self.lspci(&["-vvvv", "-s", full_pci_address]))
            .ok_or_else(|| PciError::NotFound(format!("{full_pci_address} group not found")))
    }

    /// Start address of the first memory region. Only the first one is looked at.
    pub fn get_memory_address(&self, pci_address: &str) -> Option<String> {
        memory_address(&self.lspci(&["-bv", "-s", pci_address]))
    }

    /// 32-bit address mask of the first memory region.
    ///
    /// `None` if the device has no memory region; an unreadable region size is an error.
    pub fn get_mask(&self, pci_address: &str) -> Result<Option<String>, PciError> {
        let output = self.lspci(&["-vv", "-s", pci_address]);
        Ok(first_region_size(&output)?.map(memory_mask))
    }

    /// Vital product data from `lsvpd`. Specific to ppc64.
    pub fn get_vpd(&self, dom_pci_address: &str) -> Result<Vpd, PciError> {
        let output = self.host.stdout_checked("lsvpd", &["-l", dom_pci_address])?;
        Ok(parse_vpd(&output, dom_pci_address))
    }

    /// Hardware configuration from `lscfg`. Specific to ppc64.
    pub fn get_cfg(&self, dom_pci_address: &str) -> Result<HardwareConfig, PciError> {
        let output = self.host.stdout_checked("lscfg", &["-vl", dom_pci_address])?;
        Ok(parse_cfg(&output, dom_pci_address)?)
    }

    fn read_domain_type(&self, full_pci_address: &str) -> Result<String, PciError> {
        let line = self
            .host
            .read_one_line(&self.layout.iommu_group_type(full_pci_address))?;
        Ok(line
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .to_string())
    }

    /// Current domain type of the device's IOMMU group.
    pub fn get_iommu_domain_type(
        &self,
        full_pci_address: &str,
    ) -> Result<IommuDomainType, PciError> {
        Ok(self.read_domain_type(full_pci_address)?.parse()?)
    }

    /// Whether lspci reports anything about `full_pci_address`.
    pub fn is_present(&self, full_pci_address: &str) -> bool {
        !self.lspci(&["-vvs", full_pci_address]).trim().is_empty()
    }

    /// Whether the IOMMU group of `full_pci_address` has the type requested by a
    /// [`PciManager::change_domain`] to `domain`.
    ///
    /// Requesting [`IommuDomainType::Auto`] is satisfied by `default_domain`.
    pub fn change_domain_check(
        &self,
        domain: IommuDomainType,
        full_pci_address: &str,
        default_domain: IommuDomainType,
    ) -> Result<bool, PciError> {
        let expected = match domain {
            IommuDomainType::Auto => default_domain,
            other => other,
        };
        Ok(self.read_domain_type(full_pci_address)? == expected.as_str())
    }
}
