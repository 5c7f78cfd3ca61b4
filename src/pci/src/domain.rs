// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Type of the IOMMU domain a device's group is attached to, as found in
/// `/sys/bus/pci/devices/<address>/iommu_group/type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IommuDomainType {
    /// Let the kernel pick its default type. Only meaningful when writing.
    Auto,
    /// Passthrough, DMA addresses are physical addresses.
    Identity,
    /// Translated DMA with strict invalidation.
    Dma,
    /// Translated DMA with a flush queue.
    DmaFq,
    /// All DMA blocked.
    Blocked,
    /// Owned by a user space driver such as VFIO.
    Unmanaged,
    /// The group has no default domain. Only ever read back.
    Unknown,
}

impl IommuDomainType {
    /// Spelling used by the kernel.
    pub fn as_str(&self) -> &'static str {
        match self {
            IommuDomainType::Auto => "auto",
            IommuDomainType::Identity => "identity",
            IommuDomainType::Dma => "DMA",
            IommuDomainType::DmaFq => "DMA-FQ",
            IommuDomainType::Blocked => "blocked",
            IommuDomainType::Unmanaged => "unmanaged",
            IommuDomainType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IommuDomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for [`<IommuDomainType as FromStr>::from_str`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Unknown IOMMU domain type: {0}")]
pub struct IommuDomainTypeFromStrError(pub String);

impl FromStr for IommuDomainType {
    type Err = IommuDomainTypeFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(IommuDomainType::Auto),
            "identity" => Ok(IommuDomainType::Identity),
            "DMA" => Ok(IommuDomainType::Dma),
            "DMA-FQ" => Ok(IommuDomainType::DmaFq),
            "blocked" => Ok(IommuDomainType::Blocked),
            "unmanaged" => Ok(IommuDomainType::Unmanaged),
            "unknown" => Ok(IommuDomainType::Unknown),
            other => Err(IommuDomainTypeFromStrError(other.to_string())),
        }
    }
}

impl Serialize for IommuDomainType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IommuDomainType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let key = String::deserialize(deserializer)?;
        key.parse().map_err(D::Error::custom)
    }
}
