//! Process birth, death and reclamation.

use alloc::vec::Vec;
use core::array;
use core::mem;

use log::{debug, info, warn};

use super::context::{Context, KernelStack, TrapFrame};
use super::table::ProcTable;
use super::task::{Channel, Process, ProcessId, ProcessState, Slot};
use super::{Scheduler, WaitStatus};
use crate::config::{NOFILE, PGSIZE};
use crate::error::{KernelError, KernelResult};
use crate::platform::Platform;

impl<P: Platform> Scheduler<P> {
    /// Claim a slot and give it a kernel stack whose context starts in the
    /// fork-return trampoline. The PCB stays Embryo, out of every queue,
    /// until the caller finishes it.
    pub(crate) fn allocate(&self) -> KernelResult<Slot> {
        self.allocate_slot(false)
    }

    /// `allocate`, optionally claiming the init role in the same critical
    /// section as the slot.
    fn allocate_slot(&self, as_init: bool) -> KernelResult<Slot> {
        let now = self.clock.now(&self.platform);
        let reserved = {
            let mut table = self.lock();
            if as_init && table.init.is_some() {
                return Err(KernelError::InvalidArgument);
            }
            let reserved = table.reserve(now);
            if as_init && reserved.is_some() {
                table.init = reserved;
            }
            reserved
        };
        let Some(slot) = reserved else {
            warn!("allocate: process table full");
            return Err(KernelError::ResourceExhausted);
        };

        let Some(page) = self.platform.acquire_page() else {
            warn!("allocate: no page for a kernel stack");
            let mut table = self.lock();
            self.reclaim(&mut table, slot);
            return Err(KernelError::ResourceExhausted);
        };

        let kstack = KernelStack::new(page, self.config.kstack_size);
        let mut table = self.lock();
        let p = &mut table.procs[slot];
        p.kstack = Some(kstack);
        p.context = Context::new(self.platform.fork_return(), kstack.entry_top());
        p.trap_frame = TrapFrame::default();
        Ok(slot)
    }

    /// Release everything `slot` still owns and return it to Vacant.
    pub(crate) fn reclaim(&self, table: &mut ProcTable<P>, slot: Slot) -> WaitStatus {
        let p = mem::replace(&mut table.procs[slot], Process::vacant());
        if table.init == Some(slot) {
            table.init = None;
        }
        if let Some(kstack) = p.kstack {
            self.platform.release_page(kstack.base());
        }
        if let Some(space) = p.space {
            self.platform.destroy(space);
        }
        for file in p.files.into_iter().flatten() {
            self.platform.close(file);
        }
        if let Some(cwd) = p.cwd {
            self.platform.release_dir(cwd);
        }
        WaitStatus {
            pid: p.pid,
            turnaround: p.ended.saturating_sub(p.created),
            runtime: p.dispatches,
        }
    }

    /// Set up the first user process. It becomes the reparenting target for
    /// every orphan.
    pub fn user_init(&self) -> KernelResult<ProcessId> {
        let slot = self.allocate_slot(true)?;

        let Some(space) = self.platform.create() else {
            let mut table = self.lock();
            self.reclaim(&mut table, slot);
            return Err(KernelError::ResourceExhausted);
        };
        let cwd = self.platform.root();

        let mut table = self.lock();
        let p = &mut table.procs[slot];
        p.space = Some(space);
        p.size = PGSIZE;
        p.trap_frame = TrapFrame::user_entry(0, PGSIZE as u64);
        p.set_name("initcode");
        p.cwd = Some(cwd);
        let pid = p.pid;

        table.make_runnable(slot);
        info!("init process {:?} ready", pid);
        Ok(pid)
    }

    /// Duplicate the current process. The child resumes with a zero return
    /// value; the parent gets the child's pid.
    pub fn fork(&self) -> KernelResult<ProcessId> {
        let parent = {
            let table = self.lock();
            self.current_slot(&table).ok_or(KernelError::InvalidArgument)?
        };
        let child = self.allocate()?;

        let mut table = self.lock();
        let size = table.procs[parent].size;
        let space = table.procs[parent]
            .space
            .as_ref()
            .and_then(|space| self.platform.duplicate(space, size));
        let Some(space) = space else {
            warn!("fork: cannot copy the address space of {:?}", table.procs[parent].pid);
            self.reclaim(&mut table, child);
            return Err(KernelError::ResourceExhausted);
        };

        let files: [Option<P::File>; NOFILE] = array::from_fn(|fd| {
            table.procs[parent].files[fd]
                .as_ref()
                .map(|file| self.platform.dup(file))
        });
        let cwd = table.procs[parent]
            .cwd
            .as_ref()
            .map(|dir| self.platform.dup_dir(dir));
        let mut frame = table.procs[parent].trap_frame;
        frame.set_return(0);
        let name = table.procs[parent].name.clone();
        let parent_pid = table.procs[parent].pid;

        let c = &mut table.procs[child];
        c.space = Some(space);
        c.size = size;
        c.files = files;
        c.cwd = cwd;
        c.trap_frame = frame;
        c.parent = Some(parent);
        c.name = name;
        let pid = c.pid;

        table.make_runnable(child);
        debug!("fork: {:?} -> {:?}", parent_pid, pid);
        Ok(pid)
    }

    /// Terminate the current process. It stays a Zombie until its parent,
    /// or init, reaps it.
    pub fn exit(&self) -> ! {
        let (slot, files, cwd) = {
            let mut table = self.lock();
            let Some(slot) = self.current_slot(&table) else {
                panic!("exit: no process");
            };
            if table.init == Some(slot) {
                panic!("init exiting");
            }
            let p = &mut table.procs[slot];
            let files = mem::replace(&mut p.files, array::from_fn(|_| None));
            (slot, files, p.cwd.take())
        };
        for file in files.into_iter().flatten() {
            self.platform.close(file);
        }
        if let Some(cwd) = cwd {
            self.platform.release_dir(cwd);
        }

        let now = self.clock.now(&self.platform);
        let mut table = self.lock();
        table.procs[slot].ended = now;

        // The parent may be sleeping in wait.
        if let Some(parent) = table.procs[slot].parent {
            let parent_pid = table.procs[parent].pid;
            table.wakeup(Channel::Process(parent_pid));
        }

        let init = table.init;
        let orphans: Vec<Slot> = table.children(slot).collect();
        let mut zombie_orphan = false;
        for orphan in orphans {
            table.procs[orphan].parent = init;
            zombie_orphan |= table.procs[orphan].state == ProcessState::Zombie;
        }
        if let Some(init) = init.filter(|_| zombie_orphan) {
            let init_pid = table.procs[init].pid;
            table.wakeup(Channel::Process(init_pid));
        }

        table.procs[slot].state = ProcessState::Zombie;
        info!("exit: {:?} after {} dispatches", table.procs[slot].pid, table.procs[slot].dispatches);
        self.sched(&mut table);
        panic!("zombie exit");
    }

    /// Reap one exited child and return its pid.
    pub fn wait(&self) -> KernelResult<ProcessId> {
        self.wait_stats().map(|status| status.pid)
    }

    /// Reap one exited child, blocking until one exits. Fails at once with
    /// `NoChildren` if there is nothing to wait for, or `Interrupted` if the
    /// caller has been killed.
    pub fn wait_stats(&self) -> KernelResult<WaitStatus> {
        let mut table = self.lock();
        let Some(me) = self.current_slot(&table) else {
            return Err(KernelError::InvalidArgument);
        };
        loop {
            let mut have_kids = false;
            let children: Vec<Slot> = table.children(me).collect();
            for child in children {
                have_kids = true;
                if table.procs[child].state == ProcessState::Zombie {
                    let status = self.reclaim(&mut table, child);
                    debug!("wait: reaped {:?}", status.pid);
                    return Ok(status);
                }
            }
            if !have_kids {
                return Err(KernelError::NoChildren);
            }
            if table.procs[me].killed {
                return Err(KernelError::Interrupted);
            }

            let chan = Channel::Process(table.procs[me].pid);
            self.sleep_locked(&mut table, chan);
        }
    }

    /// Ask `pid` to die. A sleeping target is made runnable at the high tier
    /// so it sees the request on its way back to user space.
    pub fn kill(&self, pid: ProcessId) -> KernelResult<()> {
        let mut table = self.lock();
        let slot = table.find(pid).ok_or(KernelError::InvalidArgument)?;
        table.procs[slot].killed = true;
        if table.procs[slot].state == ProcessState::Sleeping {
            table.make_runnable(slot);
        }
        debug!("kill: {:?}", pid);
        Ok(())
    }

    /// Give up the CPU. The current process goes back on the high queue and
    /// the scheduler re-files it by the tier its run earned.
    pub fn yield_now(&self) {
        let mut table = self.lock();
        if let Some(slot) = self.current_slot(&table) {
            table.make_runnable(slot);
        }
        self.sched(&mut table);
    }

    /// Grow or shrink the current process's memory by `delta` bytes and
    /// return the previous size.
    pub fn grow(&self, delta: isize) -> KernelResult<usize> {
        let mut table = self.lock();
        let slot = self
            .current_slot(&table)
            .ok_or(KernelError::InvalidArgument)?;
        let p = &mut table.procs[slot];
        let old = p.size;
        let space = p.space.as_mut().ok_or(KernelError::InvalidArgument)?;
        let new = self
            .platform
            .grow(space, old, delta)
            .ok_or(KernelError::ResourceExhausted)?;
        p.size = new;
        Ok(old)
    }
}
