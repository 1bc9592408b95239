use log::{info, warn};
use x86_64::instructions::port::Port;

use super::config_space::ConfigAccess;
use super::lock::NoIRQSpinlock;
use super::Address;

const CONFIG_ADDRESS_PORT: u16 = 0x0CF8;
const CONFIG_DATA_PORT: u16 = 0x0CFC;

/// Value written to the address port by the manual probe; a PCI host bridge
/// latches it and reads it back unchanged.
const PROBE_SENTINEL: u32 = 0x8000_0000;

/// Legacy configuration access mechanism using the 0xCF8/0xCFC port pair.
///
/// The lock serializes each address port write against the data port access
/// that depends on it.
pub struct PortIOAccess(NoIRQSpinlock<()>);

fn config_address(address: Address, offset: u16) -> u32 {
    debug_assert_eq!(
        address.segment(),
        0,
        "cannot access devices outside of segment 0 with legacy configuration mechanism"
    );
    assert!(offset < 0x100, "offset {:#06x} too large (limit 0x100)", offset);

    PROBE_SENTINEL
        | ((address.bus() as u32) << 16)
        | ((address.slot() as u32) << 11)
        | ((address.function() as u32) << 8)
        | ((offset & 0xFC) as u32)
}

impl PortIOAccess {
    pub fn new() -> PortIOAccess {
        info!("initialized legacy port I/O configuration access");
        PortIOAccess(NoIRQSpinlock::new(()))
    }

    /// Tests whether a PCI host bridge answers on the legacy port pair.
    ///
    /// Writes the probe sentinel to the address port and reads it back; a
    /// floating bus or missing port returns something else.
    pub fn probe() -> bool {
        info!("testing PCI via manual port probing");

        let mut port = Port::<u32>::new(CONFIG_ADDRESS_PORT);
        let readback = unsafe {
            port.write(PROBE_SENTINEL);
            port.read()
        };

        if readback == PROBE_SENTINEL {
            info!("port I/O configuration access supported");
            true
        } else {
            warn!("port I/O configuration access not supported");
            false
        }
    }
}

impl ConfigAccess for PortIOAccess {
    unsafe fn read32(&self, address: Address, offset: u16) -> u32 {
        assert_eq!(offset & 0x03, 0, "offset {:#06x} not aligned", offset);

        let config_address = config_address(address, offset);
        let _lock = self.0.lock();

        Port::<u32>::new(CONFIG_ADDRESS_PORT).write(config_address);
        Port::<u32>::new(CONFIG_DATA_PORT).read()
    }

    unsafe fn write32(&self, address: Address, offset: u16, value: u32) {
        assert_eq!(offset & 0x03, 0, "offset {:#06x} not aligned", offset);

        let config_address = config_address(address, offset);
        let _lock = self.0.lock();

        Port::<u32>::new(CONFIG_ADDRESS_PORT).write(config_address);
        Port::<u32>::new(CONFIG_DATA_PORT).write(value);
    }

    // The data port supports narrow access at its sub-dword offsets; no
    // read-modify-write is needed.

    unsafe fn read16(&self, address: Address, offset: u16) -> u16 {
        assert_eq!(offset & 0x01, 0, "offset {:#06x} not aligned", offset);

        let config_address = config_address(address, offset);
        let _lock = self.0.lock();

        Port::<u32>::new(CONFIG_ADDRESS_PORT).write(config_address);
        Port::<u16>::new(CONFIG_DATA_PORT + (offset & 0x02)).read()
    }

    unsafe fn read8(&self, address: Address, offset: u16) -> u8 {
        let config_address = config_address(address, offset);
        let _lock = self.0.lock();

        Port::<u32>::new(CONFIG_ADDRESS_PORT).write(config_address);
        Port::<u8>::new(CONFIG_DATA_PORT + (offset & 0x03)).read()
    }

    unsafe fn write16(&self, address: Address, offset: u16, value: u16) {
        assert_eq!(offset & 0x01, 0, "offset {:#06x} not aligned", offset);

        let config_address = config_address(address, offset);
        let _lock = self.0.lock();

        Port::<u32>::new(CONFIG_ADDRESS_PORT).write(config_address);
        Port::<u16>::new(CONFIG_DATA_PORT + (offset & 0x02)).write(value);
    }

    unsafe fn write8(&self, address: Address, offset: u16, value: u8) {
        let config_address = config_address(address, offset);
        let _lock = self.0.lock();

        Port::<u32>::new(CONFIG_ADDRESS_PORT).write(config_address);
        Port::<u8>::new(CONFIG_DATA_PORT + (offset & 0x03)).write(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_address_layout() {
        let addr = Address::new(0, 0xAB, 0x1F, 0x7);
        assert_eq!(config_address(addr, 0x3C), 0x80AB_FF3C);

        let addr = Address::new(0, 0, 0, 0);
        assert_eq!(config_address(addr, 0x00), 0x8000_0000);
    }

    #[test]
    fn test_config_address_masks_sub_dword_offset() {
        let addr = Address::new(0, 1, 2, 3);
        assert_eq!(config_address(addr, 0x11) & 0x03, 0);
        assert_eq!(
            config_address(addr, 0x11),
            config_address(addr, 0x10)
        );
    }

    #[test]
    #[should_panic(expected = "too large")]
    fn test_config_address_offset_limit() {
        config_address(Address::new(0, 0, 0, 0), 0x100);
    }
}
