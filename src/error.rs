use core::fmt;

/// Recoverable failures reported by the process core.
///
/// Broken internal contracts (init exiting, entering the scheduler in the
/// wrong state) are not represented here; those halt the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No free process slot, no free kernel stack page, or the address
    /// space could not be duplicated.
    ResourceExhausted,
    /// Unknown pid, or an operation that makes no sense for its target.
    InvalidArgument,
    /// `wait` found nothing to reap and nothing to wait for.
    NoChildren,
    /// The caller has a pending kill request.
    Interrupted,
    /// A scheduler configuration value is out of range.
    InvalidConfig,
}

impl KernelError {
    /// Value handed back to user space when a syscall fails.
    pub const fn as_retval(self) -> i64 {
        -1
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KernelError::ResourceExhausted => write!(f, "Resource exhausted"),
            KernelError::InvalidArgument => write!(f, "Invalid argument"),
            KernelError::NoChildren => write!(f, "No child processes"),
            KernelError::Interrupted => write!(f, "Interrupted by kill"),
            KernelError::InvalidConfig => write!(f, "Invalid scheduler configuration"),
        }
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
