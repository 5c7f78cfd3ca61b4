// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::PciError;

/// PCI class id (base class and subclass, as printed by `lspci -n`) to the `/sys/class`
/// directory where the kernel exposes the resulting interfaces.
pub const PCI_CLASS_NAMES: [(&str, &str); 7] = [
    ("0104", "scsi_host"),
    ("0c04", "fc_host"),
    ("0200", "net"),
    ("0108", "nvme"),
    ("0280", "net"),
    ("0207", "net"),
    ("0c03", "usb"),
];

static CLASS_TABLE: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| PCI_CLASS_NAMES.into_iter().collect());

/// Class directory name for `class_id`.
///
/// Ids missing from [`PCI_CLASS_NAMES`] are rejected instead of guessed.
pub fn class_name_for_id(class_id: &str) -> Result<&'static str, PciError> {
    CLASS_TABLE.get(class_id).copied().ok_or_else(|| {
        PciError::InvalidArgument(format!("Class ID {class_id} is not in the PCI class table"))
    })
}
