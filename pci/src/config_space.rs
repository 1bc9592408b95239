use alloc_crate::vec::Vec;
use core::ops::RangeInclusive;

use super::mmio::MemoryMappedAccess;
use super::port_io::PortIOAccess;
use super::Address;

/// Standard PCI configuration header register offsets.
pub mod registers {
    /// Vendor ID (16-bit) and Device ID (16-bit) share the first dword.
    pub const VENDOR_ID: u16 = 0x00;
    pub const DEVICE_ID: u16 = 0x02;
    pub const COMMAND: u16 = 0x04;
    pub const STATUS: u16 = 0x06;
    /// Revision, prog-if, subclass and class share the third dword.
    pub const REVISION: u16 = 0x08;
    /// Header type (8-bit). Bit 7 marks a multi-function device.
    pub const HEADER_TYPE: u16 = 0x0E;
}

/// The capability set of an active bus access method.
///
/// Sub-dword reads are extracted from the containing dword and sub-dword
/// writes are read-modify-write sequences by default; backends with native
/// narrow access override them.
///
/// # Safety
///
/// Configuration space reads and writes reach hardware registers directly
/// and can have arbitrary device side effects.
pub trait ConfigAccess {
    unsafe fn read32(&self, address: Address, offset: u16) -> u32;
    unsafe fn write32(&self, address: Address, offset: u16, value: u32);

    unsafe fn read16(&self, address: Address, offset: u16) -> u16 {
        assert_eq!(offset & 0x01, 0, "offset {:#06x} not aligned", offset);

        let dword = self.read32(address, offset & !0x03);
        let shift = ((offset & 0x02) as u32) * 8;
        (dword >> shift) as u16
    }

    unsafe fn read8(&self, address: Address, offset: u16) -> u8 {
        let dword = self.read32(address, offset & !0x03);
        let shift = ((offset & 0x03) as u32) * 8;
        (dword >> shift) as u8
    }

    unsafe fn write16(&self, address: Address, offset: u16, value: u16) {
        assert_eq!(offset & 0x01, 0, "offset {:#06x} not aligned", offset);

        let shift = ((offset & 0x02) as u32) * 8;
        let mask = 0xFFFFu32 << shift;

        let dword = self.read32(address, offset & !0x03);
        let dword = (dword & !mask) | ((value as u32) << shift);
        self.write32(address, offset & !0x03, dword);
    }

    unsafe fn write8(&self, address: Address, offset: u16, value: u8) {
        let shift = ((offset & 0x03) as u32) * 8;
        let mask = 0xFFu32 << shift;

        let dword = self.read32(address, offset & !0x03);
        let dword = (dword & !mask) | ((value as u32) << shift);
        self.write32(address, offset & !0x03, dword);
    }

    /// The (segment, bus range) pairs this method can legally address.
    ///
    /// Legacy port access has no segment selection mechanism, so the default
    /// is segment 0 with the full bus range.
    fn bus_ranges(&self) -> Vec<(u16, RangeInclusive<u8>)> {
        vec![(0, 0..=255)]
    }
}

/// The access method selected by the detection cascade.
///
/// Exactly one variant is active for the lifetime of the initializer that
/// owns it; the tag is decided once and never reassigned.
pub enum AccessMethod {
    PortIO(PortIOAccess),
    MemoryMapped(MemoryMappedAccess),
}

impl ConfigAccess for AccessMethod {
    unsafe fn read32(&self, address: Address, offset: u16) -> u32 {
        match self {
            AccessMethod::PortIO(access) => access.read32(address, offset),
            AccessMethod::MemoryMapped(access) => access.read32(address, offset),
        }
    }

    unsafe fn write32(&self, address: Address, offset: u16, value: u32) {
        match self {
            AccessMethod::PortIO(access) => access.write32(address, offset, value),
            AccessMethod::MemoryMapped(access) => access.write32(address, offset, value),
        }
    }

    unsafe fn read16(&self, address: Address, offset: u16) -> u16 {
        match self {
            AccessMethod::PortIO(access) => access.read16(address, offset),
            AccessMethod::MemoryMapped(access) => access.read16(address, offset),
        }
    }

    unsafe fn read8(&self, address: Address, offset: u16) -> u8 {
        match self {
            AccessMethod::PortIO(access) => access.read8(address, offset),
            AccessMethod::MemoryMapped(access) => access.read8(address, offset),
        }
    }

    unsafe fn write16(&self, address: Address, offset: u16, value: u16) {
        match self {
            AccessMethod::PortIO(access) => access.write16(address, offset, value),
            AccessMethod::MemoryMapped(access) => access.write16(address, offset, value),
        }
    }

    unsafe fn write8(&self, address: Address, offset: u16, value: u8) {
        match self {
            AccessMethod::PortIO(access) => access.write8(address, offset, value),
            AccessMethod::MemoryMapped(access) => access.write8(address, offset, value),
        }
    }

    fn bus_ranges(&self) -> Vec<(u16, RangeInclusive<u8>)> {
        match self {
            AccessMethod::PortIO(access) => access.bus_ranges(),
            AccessMethod::MemoryMapped(access) => access.bus_ranges(),
        }
    }
}
