//! The process table: PCB arena, run queues, pid and scan counters, and the
//! per-CPU scheduler state. Every method here expects the table lock held.

use alloc::vec;
use alloc::vec::Vec;

use super::context::Context;
use super::queue::RunQueues;
use super::task::{Channel, Priority, Process, ProcessId, ProcessState, Slot};
use crate::platform::{CpuId, Platform};

/// Per-CPU scheduler state.
#[derive(Debug, Default)]
pub(crate) struct CpuState {
    /// Where the scheduler loop parks while a process runs.
    pub(crate) scheduler: Context,
    pub(crate) current: Option<Slot>,
}

/// Snapshot of the table taken under the lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Census {
    pub vacant: usize,
    pub embryo: usize,
    pub runnable: usize,
    pub running: usize,
    pub sleeping: usize,
    pub zombie: usize,
    /// Queue lengths, indexed by tier.
    pub queued: [usize; 3],
    /// Broken queue walks, tier mismatches, queued PCBs that are not
    /// Runnable and Runnable PCBs that are not queued.
    pub faults: usize,
}

impl Census {
    pub fn total(&self) -> usize {
        self.vacant + self.embryo + self.runnable + self.running + self.sleeping + self.zombie
    }
}

pub struct ProcTable<P: Platform> {
    pub(crate) procs: Vec<Process<P>>,
    pub(crate) queues: RunQueues,
    next_pid: u32,
    /// Scheduler iterations since the last aging pass.
    pub(crate) scans: u32,
    /// Slot of the init process, the reparenting target.
    pub(crate) init: Option<Slot>,
    pub(crate) cpus: Vec<CpuState>,
}

impl<P: Platform> ProcTable<P> {
    pub fn new(nproc: usize, ncpu: usize) -> Self {
        let mut procs = Vec::with_capacity(nproc);
        procs.resize_with(nproc, Process::vacant);
        let mut cpus = Vec::with_capacity(ncpu);
        cpus.resize_with(ncpu, CpuState::default);
        ProcTable {
            procs,
            queues: RunQueues::default(),
            next_pid: 1,
            scans: 0,
            init: None,
            cpus,
        }
    }

    pub fn capacity(&self) -> usize {
        self.procs.len()
    }

    /// Slot of the live process with `pid`.
    pub fn find(&self, pid: ProcessId) -> Option<Slot> {
        if pid == ProcessId::VACANT {
            return None;
        }
        self.procs
            .iter()
            .position(|p| p.state != ProcessState::Vacant && p.pid == pid)
    }

    pub fn current(&self, cpu: CpuId) -> Option<Slot> {
        self.cpus.get(cpu).and_then(|c| c.current)
    }

    /// Claim a Vacant slot as an Embryo with a fresh pid.
    pub(crate) fn reserve(&mut self, now: u64) -> Option<Slot> {
        let slot = self
            .procs
            .iter()
            .position(|p| p.state == ProcessState::Vacant)?;
        let pid = self.fresh_pid();

        let p = &mut self.procs[slot];
        p.pid = pid;
        p.state = ProcessState::Embryo;
        p.priority = Priority::High;
        p.mlfq_runs = 0;
        p.dispatches = 0;
        p.created = now;
        p.ended = 0;
        p.killed = false;
        Some(slot)
    }

    /// Next pid that is neither the vacant marker nor held by a live
    /// process. The counter wraps.
    fn fresh_pid(&mut self) -> ProcessId {
        loop {
            let pid = ProcessId(self.next_pid);
            self.next_pid = self.next_pid.wrapping_add(1);
            if pid != ProcessId::VACANT && self.find(pid).is_none() {
                return pid;
            }
        }
    }

    /// Mark `slot` Runnable at the high tier and append it to the high queue.
    pub(crate) fn make_runnable(&mut self, slot: Slot) {
        self.queues.unlink(&mut self.procs, slot);
        let p = &mut self.procs[slot];
        p.state = ProcessState::Runnable;
        p.priority = Priority::High;
        self.queues.enqueue(&mut self.procs, slot);
    }

    /// Park `slot` on `chan` and take it out of scheduling.
    pub(crate) fn suspend(&mut self, slot: Slot, chan: Channel) {
        self.queues.unlink(&mut self.procs, slot);
        let p = &mut self.procs[slot];
        p.chan = Some(chan);
        p.state = ProcessState::Sleeping;
    }

    /// Make every process sleeping on `chan` runnable. Returns how many woke.
    pub(crate) fn wakeup(&mut self, chan: Channel) -> usize {
        let mut woken = 0;
        for slot in 0..self.procs.len() {
            let p = &self.procs[slot];
            if p.state == ProcessState::Sleeping && p.chan == Some(chan) {
                self.make_runnable(slot);
                woken += 1;
            }
        }
        woken
    }

    /// Count one scheduler iteration. Once the count reaches `threshold`,
    /// promote everything queued below high and return how many moved.
    pub(crate) fn tick_scan(&mut self, threshold: u32) -> Option<usize> {
        self.scans += 1;
        if self.scans < threshold {
            return None;
        }
        self.scans = 0;
        Some(self.queues.promote_all(&mut self.procs))
    }

    /// Next process to dispatch and the tier it came from.
    pub(crate) fn select(&mut self) -> Option<(Slot, Priority)> {
        self.queues.pop_next(&mut self.procs)
    }

    pub(crate) fn dispatch(&mut self, cpu: CpuId, slot: Slot) -> ProcessId {
        let p = &mut self.procs[slot];
        p.state = ProcessState::Running;
        p.dispatches += 1;
        self.cpus[cpu].current = Some(slot);
        p.pid
    }

    /// File `slot` again after the run that started at tier `from` handed
    /// control back. A process that yielded is pulled back out of the high
    /// queue first. One that moves down a tier joins the tail of its new
    /// queue; one that stays in medium or low keeps the head of its queue.
    pub(crate) fn requeue(&mut self, slot: Slot, from: Priority, demotion_threshold: u32) {
        let runnable = self.procs[slot].state == ProcessState::Runnable;
        if runnable {
            self.queues.unlink(&mut self.procs, slot);
        }

        let p = &mut self.procs[slot];
        p.priority = match from {
            Priority::High => Priority::Medium,
            Priority::Medium => {
                p.mlfq_runs += 1;
                if p.mlfq_runs >= demotion_threshold {
                    p.mlfq_runs = 0;
                    Priority::Low
                } else {
                    Priority::Medium
                }
            }
            Priority::Low => {
                p.mlfq_runs = p.mlfq_runs.saturating_add(1);
                Priority::Low
            }
        };

        if !runnable {
            return;
        }
        if p.priority == from {
            self.queues.enqueue_front(&mut self.procs, slot);
        } else {
            self.queues.enqueue(&mut self.procs, slot);
        }
    }

    /// Live children of `parent`.
    pub(crate) fn children(&self, parent: Slot) -> impl Iterator<Item = Slot> + '_ {
        self.procs
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.state != ProcessState::Vacant && p.parent == Some(parent))
            .map(|(slot, _)| slot)
    }

    pub fn census(&self) -> Census {
        let mut census = Census::default();
        for p in &self.procs {
            match p.state {
                ProcessState::Vacant => census.vacant += 1,
                ProcessState::Embryo => census.embryo += 1,
                ProcessState::Runnable => census.runnable += 1,
                ProcessState::Running => census.running += 1,
                ProcessState::Sleeping => census.sleeping += 1,
                ProcessState::Zombie => census.zombie += 1,
            }
        }

        let mut seen = vec![false; self.procs.len()];
        for tier in Priority::ALL {
            let queue = self.queues.get(tier);
            let mut last = None;
            for slot in queue.iter(&self.procs) {
                census.queued[tier as usize] += 1;
                let p = &self.procs[slot];
                if seen[slot] || p.priority != tier || p.state != ProcessState::Runnable {
                    census.faults += 1;
                }
                seen[slot] = true;
                last = Some(slot);
            }
            // A walk cut short by its step budget did not reach the tail.
            if let Some(last) = last {
                if self.procs[last].links.next.is_some() {
                    census.faults += 1;
                }
            }
        }
        census.faults += self
            .procs
            .iter()
            .zip(&seen)
            .filter(|(p, queued)| p.state == ProcessState::Runnable && !**queued)
            .count();
        census
    }
}
