use core::fmt;

/// Errors reported while setting locks up or by operations a lock does not
/// support.
///
/// Steady state operations never fail: `acquire` spins until it succeeds and
/// a contended `try_acquire` simply returns `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The lock algorithm has no implementation for this operation.
    Unsupported {
        /// Name of the lock algorithm.
        lock: &'static str,
        /// Name of the operation.
        operation: &'static str,
    },
    /// Every per-thread slot of a lock has already been handed out.
    Capacity {
        /// Name of the lock algorithm.
        lock: &'static str,
        /// Number of participants the lock was created for.
        capacity: usize,
    },
    /// The operating system refused to pin the calling thread.
    Pinning {
        /// Core the thread was meant to run on.
        core: usize,
    },
    /// A configuration value is out of range.
    InvalidConfig(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { lock, operation } => {
                write!(f, "{lock} lock does not support {operation}")
            }
            Self::Capacity { lock, capacity } => {
                write!(f, "{lock} lock supports at most {capacity} participants")
            }
            Self::Pinning { core } => write!(f, "failed to pin thread to core {core}"),
            Self::InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(all(not(loom), test))]
mod test {
    use super::Error;

    #[test]
    fn display() {
        let err = Error::Unsupported { lock: "clh", operation: "try_acquire" };
        assert_eq!(err.to_string(), "clh lock does not support try_acquire");
        let err = Error::Capacity { lock: "mcs", capacity: 4 };
        assert_eq!(err.to_string(), "mcs lock supports at most 4 participants");
        assert_eq!(Error::Pinning { core: 3 }.to_string(), "failed to pin thread to core 3");
    }
}
