//! Fixed kernel parameters and the tunable scheduler configuration.

use core::mem::size_of;

use crate::error::{KernelError, KernelResult};
use crate::scheduler::context::{Context, TrapFrame};

/// Process table capacity.
pub const NPROC: usize = 64;
/// Maximum number of execution units.
pub const NCPU: usize = 8;
/// Open files per process.
pub const NOFILE: usize = 16;
/// Page size; also the initial size of the init process image.
pub const PGSIZE: usize = 4096;
/// Size of each process's kernel stack (one page).
pub const KSTACK_SIZE: usize = 4096;
/// Process names are truncated to this many bytes.
pub const NAME_LEN: usize = 16;

/// Scheduler scans between two aging passes.
pub const DEFAULT_AGING_THRESHOLD: u32 = 100;
/// Medium-tier dispatches before a process drops to the low tier.
pub const DEFAULT_DEMOTION_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    pub nproc: usize,
    pub ncpu: usize,
    pub aging_threshold: u32,
    pub demotion_threshold: u32,
    pub kstack_size: usize,
}

impl Default for SchedConfig {
    fn default() -> Self {
        SchedConfig {
            nproc: NPROC,
            ncpu: NCPU,
            aging_threshold: DEFAULT_AGING_THRESHOLD,
            demotion_threshold: DEFAULT_DEMOTION_THRESHOLD,
            kstack_size: KSTACK_SIZE,
        }
    }
}

impl SchedConfig {
    pub fn with_nproc(mut self, nproc: usize) -> Self {
        self.nproc = nproc;
        self
    }

    pub fn with_ncpu(mut self, ncpu: usize) -> Self {
        self.ncpu = ncpu;
        self
    }

    pub fn with_aging_threshold(mut self, scans: u32) -> Self {
        self.aging_threshold = scans;
        self
    }

    pub fn with_demotion_threshold(mut self, dispatches: u32) -> Self {
        self.demotion_threshold = dispatches;
        self
    }

    pub fn with_kstack_size(mut self, bytes: usize) -> Self {
        self.kstack_size = bytes;
        self
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> KernelResult<()> {
        if self.nproc == 0 || self.ncpu == 0 || self.ncpu > NCPU {
            return Err(KernelError::InvalidConfig);
        }
        if self.aging_threshold == 0 || self.demotion_threshold == 0 {
            return Err(KernelError::InvalidConfig);
        }
        // The stack has to hold a trap frame, the fork-return slot and a context.
        let frame = size_of::<TrapFrame>() + size_of::<u64>() + size_of::<Context>();
        if self.kstack_size < frame {
            return Err(KernelError::InvalidConfig);
        }
        Ok(())
    }
}
