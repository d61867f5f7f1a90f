use core::mem::size_of;

use x86_64::registers::rflags::RFlags;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::{PrivilegeLevel, VirtAddr};

/// GDT slot of the user data segment.
pub const USER_DATA_INDEX: u16 = 3;
/// GDT slot of the user code segment.
pub const USER_CODE_INDEX: u16 = 4;

/// Callee-saved register state parked by the context-transfer primitive.
/// All callee-saved registers on x86_64 System V ABI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Context {
    pub rsp: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
}

impl Context {
    /// Create an empty context (the per-CPU scheduler context before its
    /// first switch).
    pub fn empty() -> Self {
        Context::default()
    }

    /// Create a context that starts executing at `entry` on a stack whose
    /// usable top is `stack_top`.
    pub fn new(entry: u64, stack_top: VirtAddr) -> Self {
        // 16-byte aligned, minus 8 for the return address slot.
        let aligned_sp = (stack_top.as_u64() - 8) & !0xF;
        Context {
            rsp: aligned_sp,
            rip: entry,
            ..Context::default()
        }
    }
}

/// User register state saved on entry to the kernel and restored on the way
/// back out. `rax` carries the syscall return value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    pub rax: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    /// Frame that drops into ring 3 at `entry` with interrupts enabled.
    pub fn user_entry(entry: u64, stack_top: u64) -> Self {
        let code = SegmentSelector::new(USER_CODE_INDEX, PrivilegeLevel::Ring3);
        let data = SegmentSelector::new(USER_DATA_INDEX, PrivilegeLevel::Ring3);
        TrapFrame {
            cs: u64::from(code.0),
            ss: u64::from(data.0),
            rflags: RFlags::INTERRUPT_FLAG.bits(),
            rsp: stack_top,
            rip: entry,
            ..TrapFrame::default()
        }
    }

    /// Make the interrupted syscall return `value`.
    pub fn set_return(&mut self, value: u64) {
        self.rax = value;
    }
}

/// A process's kernel stack: one page handed out by the page allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStack {
    base: VirtAddr,
    size: usize,
}

impl KernelStack {
    pub fn new(base: VirtAddr, size: usize) -> Self {
        KernelStack { base, size }
    }

    pub fn base(&self) -> VirtAddr {
        self.base
    }

    pub fn top(&self) -> VirtAddr {
        self.base + self.size as u64
    }

    /// Where a fresh process starts running: below the trap frame and the
    /// slot holding the trap-return address.
    pub fn entry_top(&self) -> VirtAddr {
        self.top() - (size_of::<TrapFrame>() + size_of::<u64>()) as u64
    }
}
