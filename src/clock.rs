//! Monotonic tick counter driven by the external timer.

use spin::Mutex;

use crate::platform::Cpu;
use crate::scheduler::task::Channel;
use crate::sync::IrqGuard;

pub struct Clock {
    ticks: Mutex<u64>,
}

impl Clock {
    pub const fn new() -> Self {
        Clock { ticks: Mutex::new(0) }
    }

    pub fn now<C: Cpu>(&self, cpu: &C) -> u64 {
        *self.lock(cpu)
    }

    /// The lock guarding the counter; `sleep` takes it as its external lock.
    pub fn ticks(&self) -> &Mutex<u64> {
        &self.ticks
    }

    /// The timer path takes this lock too, so it is only ever held with
    /// interrupts off.
    pub fn lock<'a, C: Cpu>(&'a self, cpu: &'a C) -> IrqGuard<'a, u64, C> {
        IrqGuard::lock(&self.ticks, cpu)
    }

    /// Channel sleepers on the clock wait on.
    pub fn channel(&self) -> Channel {
        Channel::of(&self.ticks)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::new()
    }
}
