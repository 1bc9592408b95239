//! PCI bus discovery for the ocotillo kernel.
//!
//! Decides at boot how configuration space will be reached (firmware-guided
//! memory-mapped access or the legacy 0xCF8/0xCFC port pair), walks every
//! addressable function, and hands each present device to the registered
//! driver detection hooks.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate alloc as alloc_crate;

pub mod address;
pub mod config_space;
pub mod enumeration;
pub mod firmware;
pub mod initializer;
pub mod lock;
pub mod mmio;
pub mod phys;
pub mod port_io;

#[cfg(test)]
mod testing;

pub use address::{Address, DeviceId};
pub use config_space::{AccessMethod, ConfigAccess};
pub use enumeration::enumerate_all;
pub use firmware::{BootConfig, FirmwareTables};
pub use initializer::{DetectHook, Initializer};
pub use mmio::MemoryMappedAccess;
pub use port_io::PortIOAccess;
