use core::cell::UnsafeCell;
use core::mem::{ManuallyDrop, MaybeUninit};
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU8, Ordering};
use spin::{Mutex, MutexGuard};

#[cfg(not(test))]
mod interrupts {
    use x86_64::instructions::interrupts;

    pub fn enabled() -> bool {
        interrupts::are_enabled()
    }

    pub unsafe fn set_if(enabled: bool) {
        if enabled {
            interrupts::enable();
        } else {
            interrupts::disable();
        }
    }
}


#[derive(Debug)]
#[repr(transparent)]
pub struct NoIRQSpinlock<T: ?Sized> {
    lock: Mutex<T>,
}

impl<T> NoIRQSpinlock<T> {
    pub const fn new(data: T) -> NoIRQSpinlock<T> {
        NoIRQSpinlock {
            lock: Mutex::new(data),
        }
    }

    pub fn into_inner(self) -> T {
        self.lock.into_inner()
    }
}

impl<T: ?Sized> NoIRQSpinlock<T> {
    pub fn lock(&self) -> NoIRQSpinlockGuard<'_, T> {
        let interrupt_flag = interrupts::enabled();
        unsafe {
            interrupts::set_if(false);
        }

        let guard = self.lock.lock();
        NoIRQSpinlockGuard::new(guard, interrupt_flag)
    }

    pub fn try_lock(&self) -> Option<NoIRQSpinlockGuard<'_, T>> {
        let interrupt_flag = interrupts::enabled();
        unsafe {
            interrupts::set_if(false);
        }

        if let Some(guard) = self.lock.try_lock() {
            Some(NoIRQSpinlockGuard::new(guard, interrupt_flag))
        } else {
            unsafe {
                interrupts::set_if(interrupt_flag);
            }

            None
        }
    }
}

#[derive(Debug)]
pub struct NoIRQSpinlockGuard<'a, T: ?Sized> {
    guard: ManuallyDrop<MutexGuard<'a, T>>,
    interrupt_flag: bool,
}

impl<'a, T: ?Sized> NoIRQSpinlockGuard<'a, T> {
    fn new(guard: MutexGuard<'a, T>, iflag: bool) -> NoIRQSpinlockGuard<'a, T> {
        NoIRQSpinlockGuard {
            guard: ManuallyDrop::new(guard),
            interrupt_flag: iflag,
        }
    }
}

impl<'a, T: ?Sized> Drop for NoIRQSpinlockGuard<'a, T> {
    fn drop(&mut self) {
        unsafe {
            ManuallyDrop::drop(&mut self.guard);
            interrupts::set_if(self.interrupt_flag);
        }
    }
}

impl<'a, T: ?Sized> Deref for NoIRQSpinlockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        (*self.guard).deref()
    }
}

impl<'a, T: ?Sized> DerefMut for NoIRQSpinlockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        (*self.guard).deref_mut()
    }
}

const CELL_EMPTY: u8 = 0;
const CELL_INITIALIZING: u8 = 1;
const CELL_READY: u8 = 2;

/// A cell that can be written exactly once.
pub struct OnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> OnceCell<T> {
    pub const fn new() -> OnceCell<T> {
        OnceCell {
            state: AtomicU8::new(CELL_EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    pub fn set(&self, value: T) -> Result<(), T> {
        if self
            .state
            .compare_exchange(
                CELL_EMPTY,
                CELL_INITIALIZING,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return Err(value);
        }

        unsafe {
            (*self.value.get()).write(value);
        }

        self.state.store(CELL_READY, Ordering::Release);
        Ok(())
    }

    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == CELL_READY {
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }
}

unsafe impl<T: Send> Send for OnceCell<T> {}
unsafe impl<T: Send + Sync> Sync for OnceCell<T> {}

impl<T> Drop for OnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == CELL_READY {
            unsafe {
                self.value.get_mut().assume_init_drop();
            }
        }
    }
}
