// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Parsers for the text produced by `lspci`, `lsvpd`, `lscfg` and the device tree.
//!
//! All functions here are pure: they only look at the text they are given.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

/// Errors raised when text that is present cannot be understood.
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum ParseError {
    /// Invalid regular expression: {0}
    Regex(#[from] regex::Error),
    /// Invalid memory region size: '{0}'
    RegionSize(String),
    /// Failed to get slot from: '{0}'
    Slot(String),
    /// No description of {address} in lscfg output: '{text}'
    CfgDescription {
        /// Address handed to lscfg.
        address: String,
        /// Full lscfg output.
        text: String,
    },
    /// No PCI address in lscfg description: '{0}'
    CfgPciId(String),
    /// No subvendor/device id in lscfg description: '{0}'
    CfgSubvendorDevice(String),
    /// Invalid hexadecimal id: '{0}'
    HexId(String),
}

/// Builds a mapping out of `Key: value` lines.
///
/// Blank lines are skipped, keys and values are trimmed, and only the first occurrence of a
/// key is kept. The value is everything after the first colon, so `Slot: 0000:00:1f.2` keeps
/// its address intact.
pub fn parse_colon_table(text: &str) -> BTreeMap<String, String> {
    let mut table = BTreeMap::new();
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        let (key, value) = line.split_once(':').unwrap_or((line, ""));
        table
            .entry(key.trim().to_string())
            .or_insert_with(|| value.trim().to_string());
    }
    table
}

/// Value of `prop` in `lspci -nvmm` output: last token of the first line keyed `prop`.
pub fn lspci_prop(text: &str, prop: &str) -> Option<String> {
    text.lines()
        .find(|line| line.split(':').next() == Some(prop))
        .and_then(|line| line.split_whitespace().last())
        .map(str::to_string)
}

/// First line of `text` that contains `marker`.
pub fn line_containing<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    text.lines().find(|line| line.contains(marker))
}

/// Driver name from `lspci -k` output.
pub fn kernel_driver(text: &str) -> Option<String> {
    line_containing(text, "Kernel driver in use:")
        .and_then(|line| line.split_whitespace().last())
        .map(str::to_string)
}

/// `0x` prefixed start address of the first memory BAR in `lspci -bv` output.
pub fn memory_address(text: &str) -> Option<String> {
    line_containing(text, "Memory at")
        .and_then(|line| line.split_whitespace().nth(2))
        .map(|addr| format!("0x{addr}"))
}

/// Group number from the `IOMMU group: <n>` line of `lspci -vvvv` output.
pub fn iommu_group(text: &str) -> Option<String> {
    line_containing(text, "IOMMU group")
        .and_then(|line| line.trim().split(' ').nth(2))
        .map(str::to_string)
}

/// `vendor:device` pair out of a `lspci -n` line such as
/// `00:1f.2 0106: 8086:2922 (rev 02)`.
pub fn vendor_id(text: &str) -> Option<String> {
    text.split(' ')
        .nth(2)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Value of a sysfs id attribute such as `vendor` (`0x8086\n`).
pub fn parse_hex_id(text: &str) -> Result<u16, ParseError> {
    let id = text.trim();
    let digits = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id);
    u16::from_str_radix(digits, 16).map_err(|_| ParseError::HexId(id.to_string()))
}

/// Converts a region size as printed by lspci (`64K`, `256M`, `2G`) into bytes.
pub fn parse_region_size(size: &str) -> Result<u64, ParseError> {
    let size = size.trim();
    let err = || ParseError::RegionSize(size.to_string());
    let unit = size.chars().last().ok_or_else(err)?;
    let multiplier: u64 = match unit {
        'K' => 1 << 10,
        'M' => 1 << 20,
        'G' => 1 << 30,
        _ => return Err(err()),
    };
    let count: u64 = size[..size.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| err())?;
    count.checked_mul(multiplier).ok_or_else(err)
}

/// Size in bytes of the first memory region listed in `lspci -vv` output, if any.
pub fn first_region_size(text: &str) -> Result<Option<u64>, ParseError> {
    let Some(line) = text
        .lines()
        .find(|line| line.contains("Region") && line.contains("Memory at"))
    else {
        return Ok(None);
    };
    let last = line.rsplit('=').next().unwrap_or_default();
    let size = last.split(']').next().unwrap_or_default();
    parse_region_size(size).map(Some)
}

/// Address mask of a 32-bit region of `memory_size` bytes, as a `0x` prefixed hex string.
pub fn memory_mask(memory_size: u64) -> String {
    format!("{:#x}", memory_size.saturating_sub(1) ^ 0xffff_ffff)
}

/// Physical slot out of a device tree `ibm,loc-code` value.
///
/// IBM location codes (`U78D2.001.WZS00ZA-P1-C8-T1`) are cut after the adapter slot
/// (`...-P1-C8`); OpenPower ones (`SLOT3`, `PCIE 1`) are taken as is.
pub fn parse_slot(loc_code: &str) -> Result<String, ParseError> {
    let ibm = Regex::new(r"^((\w+)[.])+(\w+)-[PC(\d+)-]*C(\d+)")?;
    if let Some(found) = ibm.find(loc_code) {
        return Ok(found.as_str().to_string());
    }
    let openpower = Regex::new(r"^(\w+)[\s]*(\w+)(\d*)")?;
    if let Some(found) = openpower.find(loc_code) {
        return Ok(found.as_str().to_string());
    }
    Err(ParseError::Slot(loc_code.to_string()))
}

/// Vital product data of an adapter, as reported by `lsvpd`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Vpd {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pci_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_code: Option<String>,
    /// Other devices listed by the adapter record.
    pub devices: Vec<String>,
}

/// Parses `lsvpd -l <address>` output.
///
/// Records are keyed by a tag at the start of the line followed by a separator; the value
/// starts at the fifth character. `*AX` lines naming the adapter itself are dropped.
pub fn parse_vpd(text: &str, address: &str) -> Vpd {
    let mut vpd = Vpd::default();
    for line in text.lines() {
        if line.len() < 5 {
            continue;
        }
        let value = line.get(4..).unwrap_or_default().to_string();
        if line.contains("*YL") {
            vpd.slot = Some(value);
        } else if line.contains("*DS") {
            vpd.pci_id = Some(value);
        } else if line.contains("*FC") {
            vpd.feature_code = Some(value);
        } else if line.contains("*AX") {
            let names_adapter = line.contains(address)
                || vpd
                    .pci_id
                    .as_deref()
                    .and_then(|id| id.split_whitespace().next())
                    .is_some_and(|id| line.contains(id));
            if !names_adapter {
                vpd.devices.push(value);
            }
        } else if line.contains("*CD") {
            vpd.pci_id = Some(value);
        }
    }
    vpd
}

/// Hardware configuration of an adapter, as reported by `lscfg -v`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct HardwareConfig {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Mfg", skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(rename = "Model", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "YC", skip_serializing_if = "Option::is_none")]
    pub device_specific: Option<String>,
    #[serde(rename = "YL", skip_serializing_if = "Option::is_none")]
    pub location_code: Option<String>,
    pub pci_id: String,
    pub subvendor_device: String,
}

/// Parses `lscfg -vl <address>` output.
pub fn parse_cfg(text: &str, address: &str) -> Result<HardwareConfig, ParseError> {
    let description_re = Regex::new(&format!(
        r"^  ({})( [-\w+,\.]+)+([ \n])+([-\w+, \(\)])+",
        regex::escape(address)
    ))?;
    let description = description_re
        .find(text)
        .ok_or_else(|| ParseError::CfgDescription {
            address: address.to_string(),
            text: text.to_string(),
        })?
        .as_str()
        .to_string();

    let mut cfg = HardwareConfig::default();
    for line in text.lines() {
        let dotted = || line.rsplit('.').next().map(str::to_string);
        if line.contains("Manufacturer Name") {
            cfg.manufacturer = dotted();
        }
        if line.contains("Machine Type-Model") {
            cfg.model = dotted();
        }
        if line.contains("Device Specific") {
            cfg.device_specific = dotted();
        }
        if line.contains("Location Code") {
            cfg.location_code = line
                .rsplit("..")
                .next()
                .map(|code| code.trim_matches('.').to_string());
        }
    }

    let pci_id_re = Regex::new(r"[0-9a-f]{4}:[0-9a-f]{2}:[0-9a-f]{2}\.[0-9a-f]")?;
    cfg.pci_id = pci_id_re
        .find(&description)
        .ok_or_else(|| ParseError::CfgPciId(description.clone()))?
        .as_str()
        .to_string();
    let subvendor_re = Regex::new(r"[0-9a-f]{8}")?;
    cfg.subvendor_device = subvendor_re
        .find(&description)
        .ok_or_else(|| ParseError::CfgSubvendorDevice(description.clone()))?
        .as_str()
        .to_string();
    cfg.description = description;

    Ok(cfg)
}
