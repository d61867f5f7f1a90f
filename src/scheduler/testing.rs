//! A do-nothing platform for unit tests that only touch table state.

use core::sync::atomic::{AtomicUsize, Ordering};

use x86_64::VirtAddr;

use super::context::{Context, KernelStack};
use super::task::ProcessId;
use crate::platform::{Cpu, CpuId, FileSystem, Memory, Switch};

#[derive(Debug, Default)]
pub(crate) struct NullPlatform {
    nesting: AtomicUsize,
}

impl Cpu for NullPlatform {
    fn id(&self) -> CpuId {
        0
    }

    fn enable_interrupts(&self) {}

    fn push_off(&self) {
        self.nesting.fetch_add(1, Ordering::SeqCst);
    }

    fn pop_off(&self) {
        self.nesting.fetch_sub(1, Ordering::SeqCst);
    }

    fn interrupts_enabled(&self) -> bool {
        self.nesting.load(Ordering::SeqCst) == 0
    }

    fn nesting(&self) -> usize {
        self.nesting.load(Ordering::SeqCst)
    }
}

impl Memory for NullPlatform {
    type AddressSpace = ();

    fn acquire_page(&self) -> Option<VirtAddr> {
        Some(VirtAddr::new(0x10_0000))
    }

    fn release_page(&self, _page: VirtAddr) {}

    fn create(&self) -> Option<()> {
        Some(())
    }

    fn duplicate(&self, _space: &(), _size: usize) -> Option<()> {
        Some(())
    }

    fn grow(&self, _space: &mut (), size: usize, delta: isize) -> Option<usize> {
        size.checked_add_signed(delta)
    }

    fn destroy(&self, _space: ()) {}

    fn switch_user(&self, _space: &(), _kstack: &KernelStack) {}

    fn switch_kernel(&self) {}
}

impl FileSystem for NullPlatform {
    type File = ();
    type Dir = ();

    fn dup(&self, _file: &()) {}

    fn close(&self, _file: ()) {}

    fn root(&self) {}

    fn dup_dir(&self, _dir: &()) {}

    fn release_dir(&self, _dir: ()) {}
}

impl Switch for NullPlatform {
    fn fork_return(&self) -> u64 {
        0
    }

    unsafe fn enter(&self, _cpu: CpuId, _pid: ProcessId, _from: *mut Context, _to: *const Context) {}

    unsafe fn leave(&self, _cpu: CpuId, _pid: ProcessId, _from: *mut Context, _to: *const Context) {}
}
