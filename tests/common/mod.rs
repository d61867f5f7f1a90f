//! Host simulation of the machine under the process core.
//!
//! Every process runs on its own host thread. `Switch::enter`/`leave` pass a
//! baton between a CPU's scheduler (the test thread) and process threads, so
//! exactly one actor runs per simulated CPU and the table lock really is
//! handed across switches.

#![allow(dead_code)]

use std::any::Any;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::Duration;

use atomic_sched::config::{NCPU, PGSIZE};
use atomic_sched::{
    Context, Cpu, CpuId, FileSystem, KernelStack, Memory, ProcessId, SchedConfig, Scheduler,
    Switch,
};
use x86_64::VirtAddr;

pub type Kernel = Scheduler<Sim>;
pub type Body = Box<dyn FnOnce(&Kernel) + Send>;
pub type Log<T> = Arc<Mutex<Vec<T>>>;

thread_local! {
    static CPU: Cell<CpuId> = Cell::new(0);
}

/// Pretend the calling thread is running on `cpu`.
pub fn on_cpu(cpu: CpuId) {
    CPU.with(|c| c.set(cpu));
}

pub fn this_cpu() -> CpuId {
    CPU.with(|c| c.get())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actor {
    Scheduler(CpuId),
    Process(ProcessId),
}

#[derive(Debug)]
pub struct SimSpace;

#[derive(Debug)]
pub struct SimFile;

#[derive(Debug)]
pub struct SimDir;

pub struct Sim {
    kernel: Weak<Kernel>,

    nesting: [AtomicUsize; NCPU],
    intr: [AtomicBool; NCPU],
    intena: [AtomicBool; NCPU],

    baton: Mutex<Option<(Actor, CpuId)>>,
    turn: Condvar,
    started: Mutex<HashSet<ProcessId>>,
    bodies: Mutex<HashMap<ProcessId, Body>>,
    registered: Condvar,
    crashed: Mutex<Option<Box<dyn Any + Send>>>,

    pages_free: Mutex<usize>,
    next_page: AtomicU64,
    pages_in_use: AtomicUsize,
    spaces: AtomicUsize,
    fail_duplicate: AtomicBool,
    files: AtomicUsize,
    dirs: AtomicUsize,
}

impl Sim {
    fn new(kernel: Weak<Kernel>, pages: usize) -> Self {
        Sim {
            kernel,
            nesting: std::array::from_fn(|_| AtomicUsize::new(0)),
            intr: std::array::from_fn(|_| AtomicBool::new(false)),
            intena: std::array::from_fn(|_| AtomicBool::new(false)),
            baton: Mutex::new(None),
            turn: Condvar::new(),
            started: Mutex::new(HashSet::new()),
            bodies: Mutex::new(HashMap::new()),
            registered: Condvar::new(),
            crashed: Mutex::new(None),
            pages_free: Mutex::new(pages),
            next_page: AtomicU64::new(0x4000_0000),
            pages_in_use: AtomicUsize::new(0),
            spaces: AtomicUsize::new(0),
            fail_duplicate: AtomicBool::new(false),
            files: AtomicUsize::new(0),
            dirs: AtomicUsize::new(0),
        }
    }

    /// Code process `pid` runs once dispatched. Returning from it exits.
    pub fn body(&self, pid: ProcessId, body: impl FnOnce(&Kernel) + Send + 'static) {
        self.bodies.lock().unwrap().insert(pid, Box::new(body));
        self.registered.notify_all();
    }

    pub fn pages_in_use(&self) -> usize {
        self.pages_in_use.load(Ordering::SeqCst)
    }

    pub fn spaces(&self) -> usize {
        self.spaces.load(Ordering::SeqCst)
    }

    pub fn dirs(&self) -> usize {
        self.dirs.load(Ordering::SeqCst)
    }

    pub fn files(&self) -> usize {
        self.files.load(Ordering::SeqCst)
    }

    pub fn fail_next_duplicate(&self) {
        self.fail_duplicate.store(true, Ordering::SeqCst);
    }

    pub fn nesting_on(&self, cpu: CpuId) -> usize {
        self.nesting[cpu].load(Ordering::SeqCst)
    }

    fn hand_to(&self, actor: Actor, cpu: CpuId) {
        *self.baton.lock().unwrap() = Some((actor, cpu));
        self.turn.notify_all();
    }

    fn wait_for(&self, actor: Actor) -> CpuId {
        let mut baton = self.baton.lock().unwrap();
        loop {
            if let Some((holder, cpu)) = *baton {
                if holder == actor {
                    return cpu;
                }
            }
            baton = self.turn.wait(baton).unwrap();
        }
    }

    fn take_body(&self, pid: ProcessId) -> Body {
        let mut bodies = self.bodies.lock().unwrap();
        loop {
            if let Some(body) = bodies.remove(&pid) {
                return body;
            }
            let (guard, timeout) = self
                .registered
                .wait_timeout(bodies, Duration::from_secs(5))
                .unwrap();
            bodies = guard;
            if timeout.timed_out() && !bodies.contains_key(&pid) {
                panic!("no body registered for {:?}", pid);
            }
        }
    }

    fn start(&self, pid: ProcessId) {
        if !self.started.lock().unwrap().insert(pid) {
            return;
        }
        let kernel = self.kernel.clone();
        thread::Builder::new()
            .name(format!("pid{}", pid.0))
            .spawn(move || run_process(kernel, pid))
            .unwrap();
    }
}

fn run_process(kernel: Weak<Kernel>, pid: ProcessId) {
    let Some(kernel) = kernel.upgrade() else {
        return;
    };
    let sim = kernel.platform();
    on_cpu(sim.wait_for(Actor::Process(pid)));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        unsafe { kernel.fork_return() };
        let body = sim.take_body(pid);
        body(&kernel);
        kernel.exit();
    }));
    if let Err(payload) = outcome {
        *sim.crashed.lock().unwrap() = Some(payload);
        let cpu = this_cpu();
        sim.hand_to(Actor::Scheduler(cpu), cpu);
    }
}

impl Cpu for Sim {
    fn id(&self) -> CpuId {
        this_cpu()
    }

    fn enable_interrupts(&self) {
        self.intr[this_cpu()].store(true, Ordering::SeqCst);
    }

    fn push_off(&self) {
        let cpu = this_cpu();
        let was = self.intr[cpu].swap(false, Ordering::SeqCst);
        if self.nesting[cpu].fetch_add(1, Ordering::SeqCst) == 0 {
            self.intena[cpu].store(was, Ordering::SeqCst);
        }
    }

    fn pop_off(&self) {
        let cpu = this_cpu();
        let depth = self.nesting[cpu].load(Ordering::SeqCst);
        if depth == 0 {
            return;
        }
        self.nesting[cpu].store(depth - 1, Ordering::SeqCst);
        if depth == 1 && self.intena[cpu].load(Ordering::SeqCst) {
            self.intr[cpu].store(true, Ordering::SeqCst);
        }
    }

    fn interrupts_enabled(&self) -> bool {
        self.intr[this_cpu()].load(Ordering::SeqCst)
    }

    fn nesting(&self) -> usize {
        self.nesting[this_cpu()].load(Ordering::SeqCst)
    }
}

impl Memory for Sim {
    type AddressSpace = SimSpace;

    fn acquire_page(&self) -> Option<VirtAddr> {
        let mut free = self.pages_free.lock().unwrap();
        if *free == 0 {
            return None;
        }
        *free -= 1;
        self.pages_in_use.fetch_add(1, Ordering::SeqCst);
        let addr = self.next_page.fetch_add(PGSIZE as u64, Ordering::SeqCst);
        Some(VirtAddr::new(addr))
    }

    fn release_page(&self, _page: VirtAddr) {
        *self.pages_free.lock().unwrap() += 1;
        self.pages_in_use.fetch_sub(1, Ordering::SeqCst);
    }

    fn create(&self) -> Option<SimSpace> {
        self.spaces.fetch_add(1, Ordering::SeqCst);
        Some(SimSpace)
    }

    fn duplicate(&self, _space: &SimSpace, _size: usize) -> Option<SimSpace> {
        if self.fail_duplicate.swap(false, Ordering::SeqCst) {
            return None;
        }
        self.spaces.fetch_add(1, Ordering::SeqCst);
        Some(SimSpace)
    }

    fn grow(&self, _space: &mut SimSpace, size: usize, delta: isize) -> Option<usize> {
        size.checked_add_signed(delta)
    }

    fn destroy(&self, _space: SimSpace) {
        self.spaces.fetch_sub(1, Ordering::SeqCst);
    }

    fn switch_user(&self, _space: &SimSpace, _kstack: &KernelStack) {}

    fn switch_kernel(&self) {}
}

impl FileSystem for Sim {
    type File = SimFile;
    type Dir = SimDir;

    fn dup(&self, _file: &SimFile) -> SimFile {
        self.files.fetch_add(1, Ordering::SeqCst);
        SimFile
    }

    fn close(&self, _file: SimFile) {
        self.files.fetch_sub(1, Ordering::SeqCst);
    }

    fn root(&self) -> SimDir {
        self.dirs.fetch_add(1, Ordering::SeqCst);
        SimDir
    }

    fn dup_dir(&self, _dir: &SimDir) -> SimDir {
        self.dirs.fetch_add(1, Ordering::SeqCst);
        SimDir
    }

    fn release_dir(&self, _dir: SimDir) {
        self.dirs.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Switch for Sim {
    fn fork_return(&self) -> u64 {
        0xffff_8000_0000_1000
    }

    unsafe fn enter(&self, cpu: CpuId, pid: ProcessId, _from: *mut Context, _to: *const Context) {
        self.start(pid);
        self.hand_to(Actor::Process(pid), cpu);
        self.wait_for(Actor::Scheduler(cpu));
        if let Some(payload) = self.crashed.lock().unwrap().take() {
            panic::resume_unwind(payload);
        }
    }

    unsafe fn leave(&self, cpu: CpuId, pid: ProcessId, _from: *mut Context, _to: *const Context) {
        self.hand_to(Actor::Scheduler(cpu), cpu);
        on_cpu(self.wait_for(Actor::Process(pid)));
    }
}

pub fn boot(config: SchedConfig) -> Arc<Kernel> {
    boot_with_pages(config, usize::MAX)
}

pub fn boot_with_pages(config: SchedConfig, pages: usize) -> Arc<Kernel> {
    on_cpu(0);
    Arc::new_cyclic(|kernel| Scheduler::new(Sim::new(kernel.clone(), pages), config).unwrap())
}

/// Boot and create init running `body`. Init must never return.
pub fn boot_init(
    config: SchedConfig,
    body: impl FnOnce(&Kernel) + Send + 'static,
) -> (Arc<Kernel>, ProcessId) {
    let kernel = boot(config);
    let init = kernel.user_init().unwrap();
    kernel.platform().body(init, body);
    (kernel, init)
}

/// Yield forever.
pub fn idle(kernel: &Kernel) -> ! {
    loop {
        kernel.yield_now();
    }
}

/// Run `n` scheduler passes on the calling CPU and return who ran.
pub fn run(kernel: &Kernel, n: usize) -> Vec<ProcessId> {
    (0..n).filter_map(|_| kernel.schedule_once()).collect()
}

/// Run scheduler passes until `done` holds. Panics after `limit` passes.
pub fn run_until(kernel: &Kernel, limit: usize, mut done: impl FnMut() -> bool) {
    for _ in 0..limit {
        if done() {
            return;
        }
        kernel.schedule_once();
    }
    assert!(done(), "condition not reached after {} scheduler passes", limit);
}

pub fn log<T>() -> Log<T> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries<T: Clone>(log: &Log<T>) -> Vec<T> {
    log.lock().unwrap().clone()
}

/// Check the table invariants: every slot accounted for, queues well formed.
pub fn assert_consistent(kernel: &Kernel) {
    let census = kernel.census();
    assert_eq!(census.total(), kernel.config().nproc, "{:?}", census);
    assert_eq!(census.faults, 0, "{:?}", census);
}
