//! Interfaces to the collaborators the process core drives but does not
//! implement: the CPU, memory management, the file layer and the
//! context-transfer primitive.

use x86_64::VirtAddr;

use crate::scheduler::context::{Context, KernelStack};
use crate::scheduler::task::ProcessId;

pub type CpuId = usize;

/// The execution unit the caller is running on.
pub trait Cpu {
    fn id(&self) -> CpuId;

    fn enable_interrupts(&self);

    /// Disable interrupts, remembering whether they were on at the outermost
    /// level. Nests.
    fn push_off(&self);

    /// Undo one `push_off`; interrupts come back on at the outermost level
    /// if they were on before.
    fn pop_off(&self);

    fn interrupts_enabled(&self) -> bool;

    /// Current `push_off` depth on this CPU.
    fn nesting(&self) -> usize;
}

/// Physical pages and address spaces.
pub trait Memory {
    type AddressSpace: Send;

    /// One page for a kernel stack.
    fn acquire_page(&self) -> Option<VirtAddr>;

    fn release_page(&self, page: VirtAddr);

    /// Address space holding the init image.
    fn create(&self) -> Option<Self::AddressSpace>;

    /// Copy of the first `size` bytes of `space`.
    fn duplicate(&self, space: &Self::AddressSpace, size: usize) -> Option<Self::AddressSpace>;

    /// Grow (or shrink, for negative `delta`) the image from `size` bytes.
    /// Returns the new size.
    fn grow(&self, space: &mut Self::AddressSpace, size: usize, delta: isize) -> Option<usize>;

    fn destroy(&self, space: Self::AddressSpace);

    /// Make `space` and `kstack` the live translation and trap stack.
    fn switch_user(&self, space: &Self::AddressSpace, kstack: &KernelStack);

    /// Back to the kernel-only translation.
    fn switch_kernel(&self);
}

/// Open files and directory references.
pub trait FileSystem {
    type File: Send;
    type Dir: Send;

    fn dup(&self, file: &Self::File) -> Self::File;

    fn close(&self, file: Self::File);

    fn root(&self) -> Self::Dir;

    fn dup_dir(&self, dir: &Self::Dir) -> Self::Dir;

    fn release_dir(&self, dir: Self::Dir);
}

/// Context transfer between a CPU's scheduler loop and a process.
///
/// The table lock travels with control. `enter` is called with the lock held
/// and the process releases it; `leave` is called with the lock held and the
/// scheduler releases it.
pub trait Switch {
    /// Address every fresh context starts at: the fork-return trampoline,
    /// which calls `Scheduler::fork_return` and then returns to user space.
    fn fork_return(&self) -> u64;

    /// Save the scheduler context of `cpu` into `from` and run process `pid`
    /// from `to`. Returns when the process switches back.
    ///
    /// # Safety
    /// Both pointers must reference live contexts inside the process table.
    unsafe fn enter(&self, cpu: CpuId, pid: ProcessId, from: *mut Context, to: *const Context);

    /// Save the context of process `pid` into `from` and resume the scheduler
    /// of `cpu` from `to`. Returns when the process is dispatched again,
    /// possibly on another CPU.
    ///
    /// # Safety
    /// Both pointers must reference live contexts inside the process table.
    unsafe fn leave(&self, cpu: CpuId, pid: ProcessId, from: *mut Context, to: *const Context);
}

/// Everything the process core needs from the machine.
pub trait Platform: Cpu + Memory + FileSystem + Switch + Sync {}

impl<T> Platform for T where T: Cpu + Memory + FileSystem + Switch + Sync {}
