// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pci::logger::{
    DEFAULT_LOG_TAG, LOG_TAG, LOGGER, LevelFilter, LoggerConfig, LoggerInitError,
    LoggerUpdateError, info,
};
use pci::{ConfigError, IommuDomainType, PciConfig, PciError, PciManager};
use serde_json::json;

#[derive(Debug, thiserror::Error, displaydoc::Display)]
enum PciHelperError {
    /// Failed to load the configuration: {0}
    Config(#[from] ConfigError),
    /// Failed to initialize the logger: {0}
    LoggerInit(#[from] LoggerInitError),
    /// Failed to configure the logger: {0}
    LoggerUpdate(#[from] LoggerUpdateError),
    /// {0}
    Pci(#[from] PciError),
    /// Failed to serialize the result: {0}
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Parser)]
#[command(version = format!("v{}", env!("CARGO_PKG_VERSION")))]
struct Cli {
    /// Path of a JSON configuration file.
    #[arg(long, value_name = "PATH")]
    config_file: Option<PathBuf>,
    /// Mount point of sysfs.
    #[arg(long, value_name = "PATH")]
    sysfs_root: Option<PathBuf>,
    /// Mount point of procfs.
    #[arg(long, value_name = "PATH")]
    procfs_root: Option<PathBuf>,
    /// How long state changes are waited for, in seconds.
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,
    /// Time between two checks while waiting, in milliseconds.
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,
    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LevelFilter>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the PCI domains.
    Domains,
    /// List the devices, bridges excluded.
    Addresses,
    /// Count the class entries linked to an address.
    NumInterfaces { address: String },
    /// List the block devices behind an address.
    Disks { address: String },
    /// List the network interfaces behind an address.
    Nics { address: String },
    /// List the entries of a sysfs class behind an address.
    Interfaces {
        address: String,
        /// Sysfs class, such as net or fc_host.
        #[arg(long)]
        class: String,
    },
    /// Print the sysfs class name of a device.
    ClassName { address: String },
    /// List the functions of a device.
    Functions { address: String },
    /// Print the physical slot of a device (ppc64).
    Slot { address: String },
    /// List the physical slots of every device (ppc64).
    Slots,
    /// Print the PCI id read from sysfs.
    SysfsId { address: String },
    /// Print one property reported by `lspci -nvmm`.
    Prop { address: String, prop: String },
    /// Print the PCI id reported by lspci.
    Id { address: String },
    /// Print every property reported by `lspci -nvmm`.
    Info { address: String },
    /// Print the kernel driver in use.
    Driver { address: String },
    /// Print the vendor and device id.
    VendorId { address: String },
    /// Print the IOMMU group.
    IommuGroup { address: String },
    /// Print the start of the first memory region.
    MemoryAddress { address: String },
    /// Print the address mask of the first memory region.
    Mask { address: String },
    /// Print the vital product data (ppc64).
    Vpd { address: String },
    /// Print the hardware configuration (ppc64).
    Cfg { address: String },
    /// Print the IOMMU domain type.
    DomainType { address: String },
    /// Bind a device to a driver.
    Bind { driver: String, address: String },
    /// Unbind a device from a driver.
    Unbind { driver: String, address: String },
    /// Remove a device from the bus.
    Reset { address: String },
    /// Rescan the bus until a device shows up.
    Rescan { address: String },
    /// Change the IOMMU domain type of a device's group.
    ChangeDomain {
        address: String,
        /// Requested type (auto, identity, DMA, DMA-FQ, blocked, unmanaged).
        #[arg(long)]
        to: IommuDomainType,
        /// Type the kernel picks for `auto`.
        #[arg(long)]
        default: IommuDomainType,
    },
}

/// Builds the configuration out of the optional file and the command line overrides.
fn load_config(cli: &Cli) -> Result<PciConfig, PciHelperError> {
    let mut config = match &cli.config_file {
        Some(path) => PciConfig::from_file(path)?,
        None => PciConfig::default(),
    };
    if let Some(root) = &cli.sysfs_root {
        config.sysfs_root = root.clone();
    }
    if let Some(root) = &cli.procfs_root {
        config.procfs_root = root.clone();
    }
    if let Some(timeout) = cli.timeout_secs {
        config.timeout_secs = timeout;
    }
    if let Some(interval) = cli.interval_ms {
        config.interval_ms = interval;
    }
    if let Some(level) = cli.log_level {
        config
            .logger
            .get_or_insert_with(LoggerConfig::default)
            .level = Some(level);
    }
    config.validate()?;
    Ok(config)
}

fn init_logger(config: Option<LoggerConfig>) -> Result<(), PciHelperError> {
    // Set only once, before the logger is installed.
    let _ = LOG_TAG.set(DEFAULT_LOG_TAG.to_string());
    LOGGER.init()?;
    LOGGER.update(config.unwrap_or_default())?;
    Ok(())
}

/// Runs `command` and returns the JSON document to print, if any.
fn run(manager: &PciManager, command: Command) -> Result<Option<String>, PciHelperError> {
    let value = match command {
        Command::Domains => json!(manager.get_domains()),
        Command::Addresses => json!(manager.get_pci_addresses()?),
        Command::NumInterfaces { address } => json!(manager.get_num_interfaces_in_pci(&address)),
        Command::Disks { address } => json!(manager.get_disks_in_pci_address(&address)?),
        Command::Nics { address } => json!(manager.get_nics_in_pci_address(&address)?),
        Command::Interfaces { address, class } => {
            json!(manager.get_interfaces_in_pci_address(&address, &class)?)
        }
        Command::ClassName { address } => json!(manager.get_pci_class_name(&address)?),
        Command::Functions { address } => json!(manager.get_pci_fun_list(&address)?),
        Command::Slot { address } => json!(manager.get_slot_from_sysfs(&address)?),
        Command::Slots => json!(manager.get_slot_list()?),
        Command::SysfsId { address } => json!(manager.get_pci_id_from_sysfs(&address)?),
        Command::Prop { address, prop } => json!(manager.get_pci_prop(&address, &prop)),
        Command::Id { address } => json!(manager.get_pci_id(&address)),
        Command::Info { address } => json!(manager.get_pci_info(&address)),
        Command::Driver { address } => json!(manager.get_driver(&address)),
        Command::VendorId { address } => json!(manager.get_vendor_id(&address)?),
        Command::IommuGroup { address } => json!(manager.get_iommu_group(&address)?),
        Command::MemoryAddress { address } => json!(manager.get_memory_address(&address)),
        Command::Mask { address } => json!(manager.get_mask(&address)?),
        Command::Vpd { address } => serde_json::to_value(manager.get_vpd(&address)?)?,
        Command::Cfg { address } => serde_json::to_value(manager.get_cfg(&address)?)?,
        Command::DomainType { address } => json!(manager.get_iommu_domain_type(&address)?),
        Command::Bind { driver, address } => {
            manager.bind(&driver, &address)?;
            return Ok(None);
        }
        Command::Unbind { driver, address } => {
            manager.unbind(&driver, &address)?;
            return Ok(None);
        }
        Command::Reset { address } => {
            manager.reset(&address)?;
            return Ok(None);
        }
        Command::Rescan { address } => {
            manager.rescan(&address)?;
            return Ok(None);
        }
        Command::ChangeDomain {
            address,
            to,
            default,
        } => {
            manager.change_domain(to, default, &address)?;
            return Ok(None);
        }
    };
    Ok(Some(serde_json::to_string_pretty(&value)?))
}

fn main_exec() -> Result<(), PciHelperError> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logger(config.logger.clone())?;
    info!("Running {:?}", cli.command);

    let manager = PciManager::from_config(&config);
    if let Some(output) = run(&manager, cli.command)? {
        println!("{output}");
    }
    Ok(())
}

fn main() -> ExitCode {
    match main_exec() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
