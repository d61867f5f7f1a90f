use alloc::string::String;
use core::fmt;

use super::context::{Context, KernelStack, TrapFrame};
use super::queue::Links;
use crate::config::{NAME_LEN, NOFILE};
use crate::platform::Platform;

/// Index of a PCB in the process table. Stable for the life of the kernel.
pub type Slot = usize;

/// Unique process identifier. `ProcessId::VACANT` marks an unused slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId {
    pub const VACANT: ProcessId = ProcessId(0);
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID({})", self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state machine.
///
/// ```text
/// Vacant -> Embryo -> Runnable -> Running -> Runnable | Sleeping | Zombie
///                        ^                               |          |
///                        +------------ wakeup / kill ----+          |
/// Vacant <------------------------ reaped by wait ------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Vacant,
    Embryo,
    Runnable,
    Running,
    Sleeping,
    Zombie,
}

impl ProcessState {
    /// Fixed-width label used by the process dump.
    pub fn label(self) -> &'static str {
        match self {
            ProcessState::Vacant => "unused",
            ProcessState::Embryo => "embryo",
            ProcessState::Runnable => "runble",
            ProcessState::Running => "run   ",
            ProcessState::Sleeping => "sleep ",
            ProcessState::Zombie => "zombie",
        }
    }
}

/// Feedback queue tier. Lower value means higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High = 0,
    Medium = 1,
    Low = 2,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];
}

/// Opaque token matching a sleeper with a later wakeup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// A process's own identity; `wait` sleeps here, `exit` wakes it.
    Process(ProcessId),
    /// Any kernel object, keyed by address (the clock's tick counter, a
    /// buffer, a pipe).
    Object(usize),
}

impl Channel {
    pub fn of<T>(object: &T) -> Channel {
        Channel::Object(object as *const T as usize)
    }
}

/// Process control block.
pub struct Process<P: Platform> {
    pub(crate) pid: ProcessId,
    pub(crate) name: String,
    pub(crate) state: ProcessState,
    pub(crate) priority: Priority,
    /// Completed runs at the medium tier since the last reset.
    pub(crate) mlfq_runs: u32,
    /// Clock ticks at allocation and at exit.
    pub(crate) created: u64,
    pub(crate) ended: u64,
    /// Times this process has been dispatched.
    pub(crate) dispatches: u64,
    pub(crate) parent: Option<Slot>,
    pub(crate) chan: Option<Channel>,
    pub(crate) killed: bool,
    pub(crate) links: Links,
    pub(crate) kstack: Option<KernelStack>,
    pub(crate) context: Context,
    pub(crate) trap_frame: TrapFrame,
    pub(crate) space: Option<P::AddressSpace>,
    /// Size of the user image in bytes.
    pub(crate) size: usize,
    pub(crate) files: [Option<P::File>; NOFILE],
    pub(crate) cwd: Option<P::Dir>,
}

impl<P: Platform> Process<P> {
    pub fn vacant() -> Self {
        Process {
            pid: ProcessId::VACANT,
            name: String::new(),
            state: ProcessState::Vacant,
            priority: Priority::High,
            mlfq_runs: 0,
            created: 0,
            ended: 0,
            dispatches: 0,
            parent: None,
            chan: None,
            killed: false,
            links: Links::default(),
            kstack: None,
            context: Context::empty(),
            trap_frame: TrapFrame::default(),
            space: None,
            size: 0,
            files: core::array::from_fn(|_| None),
            cwd: None,
        }
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name.clear();
        let mut end = name.len().min(NAME_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name.push_str(&name[..end]);
    }
}
