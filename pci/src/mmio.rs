use alloc_crate::vec::Vec;
use core::mem;
use core::ops::RangeInclusive;

use hashbrown::HashMap;
use log::{debug, info, warn};
use x86_64::PhysAddr;

use super::config_space::ConfigAccess;
use super::phys::PhysicalPointer;
use super::Address;

/// Fixed ACPI table header plus the 8 reserved bytes that precede the MCFG
/// configuration entries.
const MCFG_ENTRIES_OFFSET: u64 = 44;

/// One host-bridge entry of the MCFG body.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
struct McfgEntry {
    base_address: u64,
    segment_group: u16,
    bus_start: u8,
    bus_end: u8,
    _reserved: u32,
}

/// The configuration window of one host bridge: a contiguous bus range
/// mapped at a physical base address.
struct HostBridgeWindow {
    bus_start: u8,
    bus_end: u8,
    base: u64,
}

impl HostBridgeWindow {
    fn config_dword_address(&self, address: Address, offset: u16) -> PhysicalPointer<u32> {
        debug_assert!(
            address.bus() >= self.bus_start && address.bus() <= self.bus_end,
            "bus {:#04x} outside window {:#04x}-{:#04x}",
            address.bus(),
            self.bus_start,
            self.bus_end
        );

        let relative_bus = (address.bus() - self.bus_start) as u64;
        let offset_in_window = (relative_bus << 20)
            | ((address.slot() as u64) << 15)
            | ((address.function() as u64) << 12)
            | ((offset & 0xFFF) as u64);

        PhysicalPointer::new(PhysAddr::new(self.base + offset_in_window))
    }
}

struct Segment {
    windows: Vec<HostBridgeWindow>,
}

impl Segment {
    fn find_window(&self, bus: u8) -> Option<&HostBridgeWindow> {
        self.windows
            .iter()
            .find(|window| bus >= window.bus_start && bus <= window.bus_end)
    }
}

/// Enhanced configuration access mechanism: per-segment host-bridge windows
/// described by the firmware's MCFG table.
pub struct MemoryMappedAccess {
    segments: HashMap<u16, Segment>,
}

impl MemoryMappedAccess {
    /// Parses the MCFG body at `mcfg` and builds the segment map.
    ///
    /// A null address or a table whose body is truncated, empty, or without
    /// a single usable entry yields `None`; the caller treats that the same
    /// as a missing table.
    pub fn try_new(mcfg: PhysAddr) -> Option<MemoryMappedAccess> {
        debug_assert_eq!(mem::size_of::<McfgEntry>(), 16);

        if mcfg.as_u64() == 0 {
            return None;
        }

        let length =
            unsafe { PhysicalPointer::<u32>::new(mcfg + 4u64).as_ptr().read_unaligned() } as u64;
        if length < MCFG_ENTRIES_OFFSET {
            warn!("MCFG table too short ({} bytes), ignoring", length);
            return None;
        }

        let entries_length = length - MCFG_ENTRIES_OFFSET;
        if entries_length == 0 || entries_length % 16 != 0 {
            warn!(
                "MCFG configuration data length {} not a multiple of 16, ignoring",
                entries_length
            );
            return None;
        }

        let mut segments: HashMap<u16, Segment> = HashMap::new();
        let entries = PhysicalPointer::<McfgEntry>::new(mcfg + MCFG_ENTRIES_OFFSET).as_ptr();

        for i in 0..(entries_length / 16) as usize {
            let entry = unsafe { entries.add(i).read_unaligned() };

            if entry.base_address == 0 || entry.bus_end < entry.bus_start {
                warn!("MCFG entry {} is malformed, skipping", i);
                continue;
            }

            debug!(
                "host bridge window: segment {} busses {:#04x}-{:#04x} at {:#018x}",
                entry.segment_group, entry.bus_start, entry.bus_end, entry.base_address
            );

            let segment = segments
                .entry(entry.segment_group)
                .or_insert_with(|| Segment {
                    windows: Vec::new(),
                });

            segment.windows.push(HostBridgeWindow {
                bus_start: entry.bus_start,
                bus_end: entry.bus_end,
                base: entry.base_address,
            });
        }

        if segments.is_empty() {
            warn!("MCFG table contains no usable host bridge windows");
            return None;
        }

        for segment in segments.values_mut() {
            segment.windows.sort_unstable_by_key(|window| window.bus_start);
        }

        info!("loaded MCFG table");
        Some(MemoryMappedAccess { segments })
    }

    fn find_window(&self, address: Address) -> &HostBridgeWindow {
        let segment = match self.segments.get(&address.segment()) {
            Some(segment) => segment,
            None => panic!("invalid segment {}", address.segment()),
        };

        segment
            .find_window(address.bus())
            .expect("could not find host bridge window for bus")
    }

    fn config_space_address(&self, address: Address, offset: u16) -> PhysicalPointer<u32> {
        assert!(
            offset < 0x1000,
            "offset {:#06x} too large (limit 0x1000)",
            offset
        );

        self.find_window(address).config_dword_address(address, offset)
    }
}

impl ConfigAccess for MemoryMappedAccess {
    unsafe fn read32(&self, address: Address, offset: u16) -> u32 {
        assert_eq!(offset & 0x03, 0, "offset {:#06x} not aligned", offset);

        self.config_space_address(address, offset).as_ptr().read_volatile()
    }

    unsafe fn write32(&self, address: Address, offset: u16, value: u32) {
        assert_eq!(offset & 0x03, 0, "offset {:#06x} not aligned", offset);

        self.config_space_address(address, offset)
            .as_mut_ptr()
            .write_volatile(value);
    }

    // The mapped window is byte addressable; narrow accesses are native
    // volatile loads and stores.

    unsafe fn read16(&self, address: Address, offset: u16) -> u16 {
        assert_eq!(offset & 0x01, 0, "offset {:#06x} not aligned", offset);

        let dword = self.config_space_address(address, offset & !0x03);
        let ptr = dword.as_ptr() as *const u16;
        ptr.add(((offset & 0x02) >> 1) as usize).read_volatile()
    }

    unsafe fn read8(&self, address: Address, offset: u16) -> u8 {
        let dword = self.config_space_address(address, offset & !0x03);
        let ptr = dword.as_ptr() as *const u8;
        ptr.add((offset & 0x03) as usize).read_volatile()
    }

    unsafe fn write16(&self, address: Address, offset: u16, value: u16) {
        assert_eq!(offset & 0x01, 0, "offset {:#06x} not aligned", offset);

        let dword = self.config_space_address(address, offset & !0x03);
        let ptr = dword.as_mut_ptr() as *mut u16;
        ptr.add(((offset & 0x02) >> 1) as usize).write_volatile(value);
    }

    unsafe fn write8(&self, address: Address, offset: u16, value: u8) {
        let dword = self.config_space_address(address, offset & !0x03);
        let ptr = dword.as_mut_ptr() as *mut u8;
        ptr.add((offset & 0x03) as usize).write_volatile(value);
    }

    fn bus_ranges(&self) -> Vec<(u16, RangeInclusive<u8>)> {
        let mut ranges: Vec<(u16, RangeInclusive<u8>)> = self
            .segments
            .iter()
            .flat_map(|(segment, seg)| {
                seg.windows
                    .iter()
                    .map(move |window| (*segment, window.bus_start..=window.bus_end))
            })
            .collect();

        ranges.sort_unstable_by_key(|(segment, range)| (*segment, *range.start()));
        ranges
    }
}
