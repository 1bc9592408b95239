use core::marker::PhantomData;

use spin::Once;
use x86_64::PhysAddr;

static DIRECT_MAP_OFFSET: Once<u64> = Once::new();

/// Installs the kernel's physical-to-virtual direct map offset.
///
/// Must be called before any memory-mapped configuration access is
/// constructed. Calling it again with the same offset is a no-op.
pub fn initialize(offset: u64) {
    let prev = DIRECT_MAP_OFFSET.call_once(|| offset);
    assert_eq!(*prev, offset, "direct map offset already initialized");
}

fn direct_map_offset() -> u64 {
    *DIRECT_MAP_OFFSET
        .get()
        .expect("physical memory map not initialized")
}

/// A typed pointer to physical memory, reachable through the direct map.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PhysicalPointer<T> {
    addr: PhysAddr,
    _marker: PhantomData<*mut T>,
}

impl<T> PhysicalPointer<T> {
    pub fn new(addr: PhysAddr) -> PhysicalPointer<T> {
        PhysicalPointer {
            addr,
            _marker: PhantomData,
        }
    }

    pub fn address(self) -> PhysAddr {
        self.addr
    }

    pub fn as_ptr(self) -> *const T {
        (self.addr.as_u64() + direct_map_offset()) as usize as *const T
    }

    pub fn as_mut_ptr(self) -> *mut T {
        (self.addr.as_u64() + direct_map_offset()) as usize as *mut T
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_identity_mapped_read() {
        testing::identity_map();

        let value: u32 = 0xC0FF_EE00;
        let ptr: PhysicalPointer<u32> = PhysicalPointer::new(PhysAddr::new(&value as *const u32 as u64));
        assert_eq!(unsafe { ptr.as_ptr().read_volatile() }, 0xC0FF_EE00);
    }
}
