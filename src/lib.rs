#![cfg_attr(not(test), no_std)]

//! Process table, three-tier feedback scheduler and process lifecycle for
//! the AtomicOS kernel.

extern crate alloc;

pub mod clock;
pub mod config;
pub mod error;
pub mod logger;
pub mod platform;
pub mod scheduler;
pub mod sync;
pub mod syscalls;

pub use config::SchedConfig;
pub use error::{KernelError, KernelResult};
pub use platform::{Cpu, CpuId, FileSystem, Memory, Platform, Switch};
pub use scheduler::context::{Context, KernelStack, TrapFrame};
pub use scheduler::{
    Census, Channel, Priority, ProcInfo, ProcessId, ProcessState, Scheduler, WaitStatus,
};

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler::testing::NullPlatform;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Scheduler<NullPlatform>: Send, Sync);
    assert_impl_all!(ProcessId: Send, Sync, Copy);
}
