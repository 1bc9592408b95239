use super::config_space::{registers, ConfigAccess};
use super::{Address, DeviceId};

/// Reads the vendor/device identification pair at `address`.
pub fn read_id<A: ConfigAccess + ?Sized>(access: &A, address: Address) -> DeviceId {
    let data = unsafe { access.read32(address, registers::VENDOR_ID) };
    DeviceId::new((data & 0xFFFF) as u16, ((data >> 16) & 0xFFFF) as u16)
}

/// Reads the (class, subclass, prog if) triple at `address`.
pub fn read_class<A: ConfigAccess + ?Sized>(access: &A, address: Address) -> (u8, u8, u8) {
    let data = unsafe { access.read32(address, registers::REVISION) };
    let class = ((data >> 24) & 0xFF) as u8;
    let subclass = ((data >> 16) & 0xFF) as u8;
    let prog_if = ((data >> 8) & 0xFF) as u8;

    (class, subclass, prog_if)
}

pub fn is_multi_function<A: ConfigAccess + ?Sized>(access: &A, address: Address) -> bool {
    let header_type = unsafe { access.read8(address, registers::HEADER_TYPE) };
    (header_type & 0x80) != 0
}

/// Walks every function address the access method can reach, in ascending
/// (segment, bus, slot, function) order, and calls `visit` once for each
/// address where a function is present.
///
/// Absent functions read back the sentinel vendor id and are skipped
/// silently. Each call is a complete, stateless pass over the bus; nothing
/// is cached between calls.
pub fn enumerate_all<A, F>(access: &A, mut visit: F)
where
    A: ConfigAccess + ?Sized,
    F: FnMut(Address, DeviceId),
{
    let mut ranges = access.bus_ranges();
    ranges.sort_unstable_by_key(|(segment, range)| (*segment, *range.start()));

    for (segment, busses) in ranges {
        for bus in busses {
            for slot in 0..32u8 {
                for function in 0..8u8 {
                    let address = Address::new(segment, bus, slot, function);
                    let id = read_id(access, address);

                    if id.is_present() {
                        visit(address, id);
                    }
                }
            }
        }
    }
}
