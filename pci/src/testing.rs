//! Test doubles backing the host-run test suite: an in-memory configuration
//! space, fake firmware collaborators, and a fake ECAM window that the
//! memory-mapped backend can address through an identity direct map.

use alloc_crate::vec::Vec;
use core::cell::{Cell, RefCell};
use core::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard};

use hashbrown::HashMap;
use x86_64::PhysAddr;

use super::config_space::ConfigAccess;
use super::firmware::{BootConfig, FirmwareTables, MCFG_SIGNATURE};
use super::{phys, Address, DeviceId};

/// Installs the identity direct map used by all tests, so "physical"
/// addresses are ordinary heap addresses.
pub fn identity_map() {
    phys::initialize(0);
}

static SINGLETON_TEST_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that touch the process-wide initializer.
pub fn singleton_test_lock() -> MutexGuard<'static, ()> {
    SINGLETON_TEST_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An in-memory configuration space; unpopulated registers read all-ones,
/// which is what a host bridge returns for absent functions.
pub struct MockConfigSpace {
    registers: RefCell<HashMap<(Address, u16), u32>>,
    ranges: Vec<(u16, RangeInclusive<u8>)>,
}

impl MockConfigSpace {
    pub fn new() -> MockConfigSpace {
        MockConfigSpace::with_ranges(vec![(0, 0..=255)])
    }

    pub fn with_ranges(ranges: Vec<(u16, RangeInclusive<u8>)>) -> MockConfigSpace {
        MockConfigSpace {
            registers: RefCell::new(HashMap::new()),
            ranges,
        }
    }

    pub fn set_register(&self, address: Address, offset: u16, value: u32) {
        assert_eq!(offset & 0x03, 0);
        self.registers.borrow_mut().insert((address, offset), value);
    }

    pub fn add_device(&self, address: Address, id: DeviceId) {
        let dword = (id.vendor_id as u32) | ((id.device_id as u32) << 16);
        self.set_register(address, 0x00, dword);
    }
}

impl ConfigAccess for MockConfigSpace {
    unsafe fn read32(&self, address: Address, offset: u16) -> u32 {
        assert_eq!(offset & 0x03, 0, "offset {:#06x} not aligned", offset);

        self.registers
            .borrow()
            .get(&(address, offset))
            .copied()
            .unwrap_or(0xFFFF_FFFF)
    }

    unsafe fn write32(&self, address: Address, offset: u16, value: u32) {
        assert_eq!(offset & 0x03, 0, "offset {:#06x} not aligned", offset);

        self.registers.borrow_mut().insert((address, offset), value);
    }

    fn bus_ranges(&self) -> Vec<(u16, RangeInclusive<u8>)> {
        self.ranges.clone()
    }
}

/// A firmware table service with scripted answers. Lookups are counted so
/// tests can assert that a cascade path never consulted the table list.
pub struct MockFirmware {
    operable: bool,
    mcfg: Option<PhysAddr>,
    find_table_calls: Cell<usize>,
}

impl MockFirmware {
    pub fn new(operable: bool, mcfg: Option<PhysAddr>) -> MockFirmware {
        MockFirmware {
            operable,
            mcfg,
            find_table_calls: Cell::new(0),
        }
    }

    pub fn find_table_calls(&self) -> usize {
        self.find_table_calls.get()
    }
}

impl FirmwareTables for MockFirmware {
    fn is_operable(&self) -> bool {
        self.operable
    }

    fn find_table(&self, signature: &[u8; 4]) -> Option<PhysAddr> {
        self.find_table_calls.set(self.find_table_calls.get() + 1);

        if *signature == MCFG_SIGNATURE {
            self.mcfg
        } else {
            None
        }
    }
}

/// Panics on any use; for asserting that a cascade path is firmware-free.
pub struct UnreachableFirmware;

impl FirmwareTables for UnreachableFirmware {
    fn is_operable(&self) -> bool {
        panic!("firmware must not be consulted on this path");
    }

    fn find_table(&self, _signature: &[u8; 4]) -> Option<PhysAddr> {
        panic!("firmware must not be consulted on this path");
    }
}

pub struct MockBootConfig {
    tokens: Vec<&'static str>,
}

impl MockBootConfig {
    pub fn new(tokens: Vec<&'static str>) -> MockBootConfig {
        MockBootConfig { tokens }
    }

    pub fn empty() -> MockBootConfig {
        MockBootConfig::new(Vec::new())
    }
}

impl BootConfig for MockBootConfig {
    fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| *t == token)
    }
}

pub struct UnreachableBootConfig;

impl BootConfig for UnreachableBootConfig {
    fn contains(&self, _token: &str) -> bool {
        panic!("boot configuration must not be consulted on this path");
    }
}

/// A heap-backed configuration window covering `bus_count` busses starting
/// at relative bus 0, filled with the all-ones pattern of absent functions.
pub struct FakeEcam {
    buffer: Vec<u32>,
}

impl FakeEcam {
    pub fn new(bus_count: usize) -> FakeEcam {
        FakeEcam {
            buffer: vec![0xFFFF_FFFF; bus_count << 18],
        }
    }

    /// The window's "physical" base address under the identity map.
    pub fn base(&self) -> u64 {
        self.buffer.as_ptr() as u64
    }

    pub fn set_dword(&mut self, bus: u8, slot: u8, function: u8, offset: u16, value: u32) {
        assert!(slot < 32 && function < 8);
        assert_eq!(offset & 0x03, 0);
        assert!(offset < 0x1000);

        let byte_offset = ((bus as usize) << 20)
            | ((slot as usize) << 15)
            | ((function as usize) << 12)
            | offset as usize;

        self.buffer[byte_offset / 4] = value;
    }
}

/// Builds an MCFG table image from `(base, segment, bus_start, bus_end)`
/// entries. Only the length field of the header is populated; nothing else
/// in the header is read.
pub fn build_mcfg(entries: &[(u64, u16, u8, u8)]) -> Vec<u32> {
    let length = 44 + entries.len() * 16;
    let mut table = vec![0u32; length / 4];
    table[1] = length as u32;

    for (i, (base, segment, bus_start, bus_end)) in entries.iter().enumerate() {
        let offset = (44 + i * 16) / 4;
        table[offset] = *base as u32;
        table[offset + 1] = (*base >> 32) as u32;
        table[offset + 2] =
            (*segment as u32) | ((*bus_start as u32) << 16) | ((*bus_end as u32) << 24);
    }

    table
}
