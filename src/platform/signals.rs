//! Process liveness checks and termination signals.

use std::io;

use libc::c_int;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

impl Signal {
    fn raw(self) -> c_int {
        match self {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }
}

/// What a null signal reports about a PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    NotFound,
    /// Exists but belongs to another user
    NoPermission,
}

impl ProcessStatus {
    /// Anything but a confirmed absence counts as alive.
    pub fn is_alive(self) -> bool {
        self != ProcessStatus::NotFound
    }
}

/// Checks and signals single processes.
pub trait Signaller: Send + Sync {
    fn status(&self, pid: u32) -> io::Result<ProcessStatus>;

    fn signal(&self, pid: u32, signal: Signal) -> io::Result<()>;
}

/// `kill(2)` against one PID; `0` and values beyond `pid_t` are rejected since
/// they would address a process group.
fn deliver(pid: u32, sig: c_int) -> io::Result<()> {
    let target = match libc::pid_t::try_from(pid) {
        Ok(p) if p > 0 => p,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("PID {} cannot address a single process", pid),
            ))
        }
    };

    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    if unsafe { libc::kill(target, sig) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Signaller backed by `kill(2)`.
pub struct KillSignaller;

impl Signaller for KillSignaller {
    fn status(&self, pid: u32) -> io::Result<ProcessStatus> {
        match deliver(pid, 0) {
            Ok(()) => Ok(ProcessStatus::Running),
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => Ok(ProcessStatus::NotFound),
            Err(e) if e.raw_os_error() == Some(libc::EPERM) => Ok(ProcessStatus::NoPermission),
            Err(e) => Err(e),
        }
    }

    fn signal(&self, pid: u32, signal: Signal) -> io::Result<()> {
        deliver(pid, signal.raw())
    }
}
