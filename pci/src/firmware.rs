use x86_64::PhysAddr;

/// Table signature of the memory-mapped configuration space description.
pub const MCFG_SIGNATURE: [u8; 4] = *b"MCFG";

/// Boot command line token that opts out of firmware-guided bus access.
pub const FIRMWARE_OPT_OUT_TOKEN: &str = "noacpi";

/// The firmware table service consumed during access method selection.
///
/// Implemented by the kernel's ACPI subsystem; only table location is
/// needed here, never table interpretation beyond the MCFG body.
pub trait FirmwareTables {
    fn is_operable(&self) -> bool;

    /// Returns the physical address of the named table, if present.
    fn find_table(&self, signature: &[u8; 4]) -> Option<PhysAddr>;
}

/// The parsed kernel command line.
pub trait BootConfig {
    fn contains(&self, token: &str) -> bool;
}
