use log::warn;

use crate::platform::Platform;
use crate::scheduler::{ProcessId, Scheduler};

/// Syscall numbers (passed in RAX from userland).
pub const SYS_FORK: u64 = 1;
pub const SYS_EXIT: u64 = 2;
pub const SYS_WAIT: u64 = 3;
pub const SYS_KILL: u64 = 6;
pub const SYS_GETPID: u64 = 11;
pub const SYS_SBRK: u64 = 12;
pub const SYS_SLEEP: u64 = 13;
pub const SYS_UPTIME: u64 = 14;
pub const SYS_YIELD: u64 = 22;

/// Central syscall dispatcher for the scalar-argument calls, invoked from
/// the trap handler with rax=number, rdi=arg0.
/// Returns the value for rax; failures come back as -1.
///
/// `waitstat` writes through user pointers, so the trap handler calls
/// [`sys_waitstat`] itself once it has validated them.
pub fn dispatch<P: Platform>(sched: &Scheduler<P>, number: u64, arg0: u64) -> u64 {
    let ret = match number {
        SYS_FORK => sys_fork(sched),
        SYS_EXIT => sys_exit(sched),
        SYS_WAIT => sys_wait(sched),
        SYS_KILL => sys_kill(sched, arg0 as i64),
        SYS_GETPID => sys_getpid(sched),
        SYS_SBRK => sys_sbrk(sched, arg0 as i64),
        SYS_SLEEP => sys_sleep(sched, arg0),
        SYS_UPTIME => sys_uptime(sched),
        SYS_YIELD => sys_yield(sched),
        _ => {
            warn!("syscall: unknown number {}", number);
            -1
        }
    };
    ret as u64
}

/// Kill check on the way back to user space.
pub fn syscall_return<P: Platform>(sched: &Scheduler<P>) {
    if sched.killed() {
        sched.exit();
    }
}

pub fn sys_fork<P: Platform>(sched: &Scheduler<P>) -> i64 {
    sched
        .fork()
        .map_or_else(|e| e.as_retval(), |pid| i64::from(pid.0))
}

pub fn sys_exit<P: Platform>(sched: &Scheduler<P>) -> ! {
    sched.exit()
}

pub fn sys_wait<P: Platform>(sched: &Scheduler<P>) -> i64 {
    sched
        .wait()
        .map_or_else(|e| e.as_retval(), |pid| i64::from(pid.0))
}

/// Reap a child and report its turnaround (ticks from creation to exit)
/// and how many times it was dispatched.
pub fn sys_waitstat<P: Platform>(
    sched: &Scheduler<P>,
    turnaround: &mut u64,
    running: &mut u64,
) -> i64 {
    match sched.wait_stats() {
        Ok(status) => {
            *turnaround = status.turnaround;
            *running = status.runtime;
            0
        }
        Err(e) => e.as_retval(),
    }
}

pub fn sys_kill<P: Platform>(sched: &Scheduler<P>, pid: i64) -> i64 {
    let Ok(pid) = u32::try_from(pid) else {
        return -1;
    };
    sched
        .kill(ProcessId(pid))
        .map_or_else(|e| e.as_retval(), |()| 0)
}

pub fn sys_getpid<P: Platform>(sched: &Scheduler<P>) -> i64 {
    sched.current_pid().map_or(-1, |pid| i64::from(pid.0))
}

/// Grow the caller's memory by `n` bytes; returns the old break.
pub fn sys_sbrk<P: Platform>(sched: &Scheduler<P>, n: i64) -> i64 {
    let Ok(delta) = isize::try_from(n) else {
        return -1;
    };
    match sched.grow(delta) {
        Ok(old) => old as i64,
        Err(e) => e.as_retval(),
    }
}

/// Sleep for `n` clock ticks. Returns -1 if the caller is killed first.
pub fn sys_sleep<P: Platform>(sched: &Scheduler<P>, n: u64) -> i64 {
    let clock = sched.clock();
    let mut ticks = clock.lock(sched.platform());
    let start = *ticks;
    while *ticks - start < n {
        if sched.killed() {
            return -1;
        }
        ticks = sched.sleep(clock.channel(), ticks, clock.ticks());
    }
    0
}

pub fn sys_uptime<P: Platform>(sched: &Scheduler<P>) -> i64 {
    sched.uptime() as i64
}

pub fn sys_yield<P: Platform>(sched: &Scheduler<P>) -> i64 {
    sched.yield_now();
    0
}
