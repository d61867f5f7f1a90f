//! Blocking on channels.

use spin::Mutex;

use super::table::ProcTable;
use super::task::Channel;
use super::Scheduler;
use crate::platform::Platform;
use crate::sync::IrqGuard;

impl<P: Platform> Scheduler<P> {
    /// Atomically release `guard` and sleep on `chan`; reacquire `lock`
    /// before returning. Like the table lock, `lock` is only held with
    /// interrupts off. Wakeups are broadcasts, so callers recheck their
    /// condition in a loop.
    ///
    /// The table lock is taken before `guard` is dropped, so a `wakeup` for
    /// `chan` issued after the condition was checked cannot be missed.
    pub fn sleep<'a, T>(
        &'a self,
        chan: Channel,
        guard: IrqGuard<'a, T, P>,
        lock: &'a Mutex<T>,
    ) -> IrqGuard<'a, T, P> {
        let mut table = self.lock();
        drop(guard);
        self.sleep_locked(&mut table, chan);
        drop(table);
        IrqGuard::lock(lock, &self.platform)
    }

    /// Sleep with only the table lock held.
    pub(crate) fn sleep_locked(&self, table: &mut ProcTable<P>, chan: Channel) {
        let Some(slot) = self.current_slot(table) else {
            panic!("sleep: no process");
        };
        table.suspend(slot, chan);
        self.sched(table);
        table.procs[slot].chan = None;
    }

    /// Wake every process sleeping on `chan`. Returns how many woke.
    pub fn wakeup(&self, chan: Channel) -> usize {
        self.lock().wakeup(chan)
    }
}
