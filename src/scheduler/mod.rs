pub mod context;
pub mod lifecycle;
pub mod queue;
pub mod sleep;
pub mod table;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

use alloc::string::String;
use alloc::vec::Vec;

use log::{trace, warn};
use spin::Mutex;

use crate::clock::Clock;
use crate::config::SchedConfig;
use crate::error::KernelResult;
use crate::platform::Platform;
use crate::sync::IrqGuard;
use context::{Context, TrapFrame};
pub use table::{Census, ProcTable};
pub use task::{Channel, Priority, Process, ProcessId, ProcessState, Slot};

/// What `wait_stats` reports about a reaped child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitStatus {
    pub pid: ProcessId,
    /// Ticks from allocation to exit.
    pub turnaround: u64,
    /// Times the child was dispatched.
    pub runtime: u64,
}

/// One row of the process dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcInfo {
    pub pid: ProcessId,
    pub name: String,
    pub state: ProcessState,
    pub priority: Priority,
    pub mlfq_runs: u32,
    pub dispatches: u64,
    pub parent: Option<ProcessId>,
    pub killed: bool,
}

/// The process core: table, policy and the collaborators it drives.
///
/// Built once at boot and shared by reference with every CPU for the life
/// of the kernel.
pub struct Scheduler<P: Platform> {
    table: Mutex<ProcTable<P>>,
    platform: P,
    config: SchedConfig,
    clock: Clock,
}

/// The table lock, held with interrupts pushed off on this CPU.
pub(crate) type TableGuard<'a, P> = IrqGuard<'a, ProcTable<P>, P>;

impl<P: Platform> Scheduler<P> {
    pub fn new(platform: P, config: SchedConfig) -> KernelResult<Self> {
        config.validate()?;
        Ok(Scheduler {
            table: Mutex::new(ProcTable::new(config.nproc, config.ncpu)),
            platform,
            config,
            clock: Clock::new(),
        })
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub(crate) fn lock(&self) -> TableGuard<'_, P> {
        IrqGuard::lock(&self.table, &self.platform)
    }

    /// One pass of the per-CPU scheduler loop: age if due, then dispatch
    /// the best queued process and re-file it once it hands control back.
    /// Returns the pid that ran, or `None` when every queue was empty.
    ///
    /// # Panics
    /// If the platform reports a CPU id outside the configured `ncpu`.
    pub fn schedule_once(&self) -> Option<ProcessId> {
        let cpu = self.platform.id();
        if cpu >= self.config.ncpu {
            panic!("scheduler: cpu {} beyond ncpu {}", cpu, self.config.ncpu);
        }
        self.platform.enable_interrupts();
        let mut table = self.lock();

        if let Some(moved) = table.tick_scan(self.config.aging_threshold) {
            trace!("cpu{}: aging promoted {} processes", cpu, moved);
        }

        let (slot, tier) = table.select()?;
        let pid = table.dispatch(cpu, slot);
        trace!("cpu{}: dispatch {:?} from {:?}", cpu, pid, tier);

        {
            let p = &table.procs[slot];
            if let (Some(space), Some(kstack)) = (p.space.as_ref(), p.kstack.as_ref()) {
                self.platform.switch_user(space, kstack);
            }
        }
        let from: *mut Context = &mut table.cpus[cpu].scheduler;
        let to: *const Context = &table.procs[slot].context;
        // The process releases the table lock; whoever switches back to us
        // holds it again.
        unsafe { self.platform.enter(cpu, pid, from, to) };
        self.platform.switch_kernel();

        table.cpus[cpu].current = None;
        table.requeue(slot, tier, self.config.demotion_threshold);
        Some(pid)
    }

    /// The scheduler loop. Each CPU calls this once after setup.
    pub fn run(&self) -> ! {
        loop {
            if self.schedule_once().is_none() {
                core::hint::spin_loop();
            }
        }
    }

    /// Switch from the current process back to this CPU's scheduler. The
    /// caller holds the table lock and has already moved the process out of
    /// Running.
    pub(crate) fn sched(&self, table: &mut ProcTable<P>) {
        if self.platform.nesting() != 1 {
            panic!("sched locks");
        }
        if self.platform.interrupts_enabled() {
            panic!("sched interruptible");
        }
        let cpu = self.platform.id();
        let Some(slot) = table.current(cpu) else {
            panic!("sched: no process");
        };
        if table.procs[slot].state == ProcessState::Running {
            panic!("sched running");
        }

        let pid = table.procs[slot].pid;
        let from: *mut Context = &mut table.procs[slot].context;
        let to: *const Context = &table.cpus[cpu].scheduler;
        unsafe { self.platform.leave(cpu, pid, from, to) };
    }

    /// Kernel half of the fork-return trampoline. A fresh process starts
    /// here still holding the table lock the scheduler took to dispatch it.
    ///
    /// # Safety
    /// Call exactly once, first thing on a freshly dispatched context.
    pub unsafe fn fork_return(&self) {
        self.table.force_unlock();
        self.platform.pop_off();
    }

    /// Timer tick: advance the clock and wake its sleepers.
    pub fn clock_tick(&self) {
        let mut ticks = self.clock.lock(&self.platform);
        *ticks += 1;
        self.wakeup(self.clock.channel());
    }

    pub fn uptime(&self) -> u64 {
        self.clock.now(&self.platform)
    }

    pub(crate) fn current_slot(&self, table: &ProcTable<P>) -> Option<Slot> {
        table.current(self.platform.id())
    }

    pub fn current_pid(&self) -> Option<ProcessId> {
        let table = self.lock();
        self.current_slot(&table).map(|slot| table.procs[slot].pid)
    }

    /// Whether the current process has a pending kill.
    pub fn killed(&self) -> bool {
        let table = self.lock();
        self.current_slot(&table)
            .map_or(false, |slot| table.procs[slot].killed)
    }

    fn info(table: &ProcTable<P>, slot: Slot) -> ProcInfo {
        let p = &table.procs[slot];
        ProcInfo {
            pid: p.pid,
            name: p.name.clone(),
            state: p.state,
            priority: p.priority,
            mlfq_runs: p.mlfq_runs,
            dispatches: p.dispatches,
            parent: p.parent.map(|parent| table.procs[parent].pid),
            killed: p.killed,
        }
    }

    /// Diagnostic dump for the operator console. Never blocks: if the table
    /// is busy it reports nothing.
    pub fn procdump(&self) -> Vec<ProcInfo> {
        let Some(table) = self.table.try_lock() else {
            warn!("procdump: process table busy");
            return Vec::new();
        };
        let rows: Vec<ProcInfo> = (0..table.capacity())
            .filter(|&slot| table.procs[slot].state != ProcessState::Vacant)
            .map(|slot| Self::info(&table, slot))
            .collect();
        drop(table);

        for row in &rows {
            log::info!("{} {} {}", row.pid, row.state.label(), row.name);
        }
        rows
    }

    pub fn process(&self, pid: ProcessId) -> Option<ProcInfo> {
        let table = self.lock();
        table.find(pid).map(|slot| Self::info(&table, slot))
    }

    /// Queue contents, head first.
    pub fn queued(&self, tier: Priority) -> Vec<ProcessId> {
        let table = self.lock();
        table
            .queues
            .get(tier)
            .iter(&table.procs)
            .map(|slot| table.procs[slot].pid)
            .collect()
    }

    pub fn census(&self) -> Census {
        self.lock().census()
    }

    pub fn trap_frame(&self, pid: ProcessId) -> Option<TrapFrame> {
        let table = self.lock();
        table.find(pid).map(|slot| table.procs[slot].trap_frame)
    }
}
