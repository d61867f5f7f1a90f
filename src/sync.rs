//! Spin locks taken with interrupts pushed off on the holding CPU.
//!
//! A lock the timer path also takes must never be held with interrupts on,
//! or the tick handler spins forever on the CPU that holds it.

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

use crate::platform::Cpu;

/// A `spin::Mutex` guard that also holds one `push_off` level.
///
/// Dropping it releases the lock first and then pops interrupts, whichever
/// CPU the holder is on by then.
pub struct IrqGuard<'a, T, C: Cpu> {
    guard: ManuallyDrop<MutexGuard<'a, T>>,
    cpu: &'a C,
}

impl<'a, T, C: Cpu> IrqGuard<'a, T, C> {
    pub fn lock(lock: &'a Mutex<T>, cpu: &'a C) -> Self {
        cpu.push_off();
        IrqGuard {
            guard: ManuallyDrop::new(lock.lock()),
            cpu,
        }
    }
}

impl<T, C: Cpu> Deref for IrqGuard<'_, T, C> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, C: Cpu> DerefMut for IrqGuard<'_, T, C> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T, C: Cpu> Drop for IrqGuard<'_, T, C> {
    fn drop(&mut self) {
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        self.cpu.pop_off();
    }
}
