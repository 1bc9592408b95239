use alloc_crate::sync::Arc;
use alloc_crate::vec::Vec;

use log::info;

use super::config_space::AccessMethod;
use super::enumeration;
use super::firmware::{BootConfig, FirmwareTables, FIRMWARE_OPT_OUT_TOKEN, MCFG_SIGNATURE};
use super::lock::{NoIRQSpinlock, OnceCell};
use super::mmio::MemoryMappedAccess;
use super::port_io::PortIOAccess;
use super::Address;

static PCI_INITIALIZER: NoIRQSpinlock<Option<Arc<Initializer>>> = NoIRQSpinlock::new(None);

/// A driver detection callback, invoked once per discovered device.
///
/// Every hook sees every device and decides on its own, usually by
/// re-reading the identification pair, whether to claim it.
pub type DetectHook = fn(Address);

/// Owner of all bus access state between boot-time selection and teardown.
pub struct Initializer {
    access: OnceCell<AccessMethod>,
    hooks: NoIRQSpinlock<Vec<DetectHook>>,
}

fn firmware_usable(firmware: &dyn FirmwareTables, boot_config: &dyn BootConfig) -> bool {
    !boot_config.contains(FIRMWARE_OPT_OUT_TOKEN) && firmware.is_operable()
}

/// Runs the access method detection cascade.
///
/// The order is a deliberate fallback chain. Usable firmware with an MCFG
/// table wins outright; every other path ends at the legacy port probe.
/// Failure of that final probe leaves no way to reach any device, so it
/// halts the boot.
fn select_access_method(
    disable_mmio_access: bool,
    firmware: &dyn FirmwareTables,
    boot_config: &dyn BootConfig,
    probe: impl FnOnce() -> bool,
) -> AccessMethod {
    if !disable_mmio_access && firmware_usable(firmware, boot_config) {
        if let Some(mcfg) = firmware.find_table(&MCFG_SIGNATURE) {
            if let Some(access) = MemoryMappedAccess::try_new(mcfg) {
                info!(
                    "using memory-mapped configuration space access (MCFG at {:#010x})",
                    mcfg.as_u64()
                );
                return AccessMethod::MemoryMapped(access);
            }
        }
    }

    if probe() {
        AccessMethod::PortIO(PortIOAccess::new())
    } else {
        panic!("no PCI bus access method detected");
    }
}

impl Initializer {
    fn new() -> Initializer {
        Initializer {
            access: OnceCell::new(),
            hooks: NoIRQSpinlock::new(Vec::new()),
        }
    }

    /// Returns the process-wide instance, constructing it on first use.
    pub fn the() -> Arc<Initializer> {
        PCI_INITIALIZER
            .lock()
            .get_or_insert_with(|| Arc::new(Initializer::new()))
            .clone()
    }

    /// Releases the process-wide instance. Calling this without a live
    /// instance is a no-op; a later `the()` builds a fresh instance with no
    /// access method selected.
    pub fn dismiss() {
        let mut handle = PCI_INITIALIZER.lock();
        if handle.take().is_some() {
            info!("PCI subsystem initializer dismissed");
        }
    }

    /// Selects and activates a bus access method, then runs device
    /// detection. Called once at boot; a second activation is a bug.
    pub fn test_and_initialize(
        &self,
        disable_mmio_access: bool,
        firmware: &dyn FirmwareTables,
        boot_config: &dyn BootConfig,
    ) {
        let access = select_access_method(
            disable_mmio_access,
            firmware,
            boot_config,
            PortIOAccess::probe,
        );

        if self.access.set(access).is_err() {
            panic!("PCI access method already initialized");
        }

        self.detect_devices();
    }

    /// Appends a detection hook; fan-out preserves registration order.
    pub fn register_detection_hook(&self, hook: DetectHook) {
        self.hooks.lock().push(hook);
    }

    /// Runs a fresh enumeration pass and hands every discovered device to
    /// every registered hook.
    pub fn detect_devices(&self) {
        let access = self.access.get().expect("no PCI access method activated");

        // Snapshot the hook list so hooks are free to re-enter the
        // subsystem while detection is running.
        let hooks = self.hooks.lock().clone();

        enumeration::enumerate_all(access, |address, id| {
            info!("device @ {} {}", address, id);

            for hook in hooks.iter() {
                hook(address);
            }
        });
    }

    pub fn is_activated(&self) -> bool {
        self.access.get().is_some()
    }

    /// The active access method, for configuration space access after
    /// initialization.
    pub fn access(&self) -> &AccessMethod {
        self.access.get().expect("no PCI access method activated")
    }
}
