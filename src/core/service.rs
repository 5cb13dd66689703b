//! # Service record and lifecycle status.
//!
//! A [`Service`] is one entry of the [`Registry`](super::registry::Registry).
//! Its [`Status`] is a tagged union: the running variants carry a [`Pid`],
//! the idle and terminal variants carry none.
//!
//! ## State machine
//! ```text
//!            ┌──────── respawn ─────────────────────────┐
//!            ▼                                          │
//!   Init ──► Setup(pid) ──ok──► Init ──► Active(pid) ──► Finished / Failed
//!    ▲          │                          │ `c`
//!    │          └─fail─► SetupFailed       └────► Stopped(Some(pid)) ──► Stopped(None)
//!    │                       │
//!    └──────── `C` ──────────┴──────────────────────────────────────────────┘
//! ```
//!
//! ## Wire encoding
//! The `p` command reports `<pid>@<code>`. Running variants report their pid;
//! the others report a sentinel that can never be an OS pid of a service:
//!
//! | status          | pid field | code |
//! |-----------------|-----------|------|
//! | `Init`          | `-1`      | 0    |
//! | `Setup(p)`      | `p`       | 1    |
//! | `Active(p)`     | `p`       | 2    |
//! | `Finished`      | `1`       | 3    |
//! | `Failed(_)`     | `-3`      | 4    |
//! | `Stopped(p?)`   | `p` / `-1`| 5    |
//! | `SetupFailed(_)`| `-4`      | 6    |

use std::fmt;
use std::os::fd::OwnedFd;
use std::time::{Duration, SystemTime};

use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

/// Pid sentinel: the service is not running and not in a terminal state.
pub const PID_DOWN: i32 = -1;
/// Pid sentinel: the run program exited cleanly.
pub const PID_FINISHED: i32 = 1;
/// Pid sentinel: the run program exited with an error.
pub const PID_FAILED: i32 = -3;
/// Pid sentinel: the setup program exited with an error.
pub const PID_SETUP_FAILED: i32 = -4;

/// Stable index of a service in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(pub(crate) usize);

impl ServiceId {
    /// Returns the raw registry index.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which program of a service directory is launched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// The one-shot `setup` program.
    Setup,
    /// The `run` program.
    Run,
}

impl Phase {
    /// Name of the declaration file holding the program.
    pub fn program(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Run => "run",
        }
    }

    /// Running status for a freshly forked process of this phase.
    pub fn running(self, pid: Pid) -> Status {
        match self {
            Phase::Setup => Status::Setup(pid),
            Phase::Run => Status::Active(pid),
        }
    }
}

/// Lifecycle status of a service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Loaded or cleared; ready to start.
    Init,
    /// Setup program running.
    Setup(Pid),
    /// Run program running.
    Active(Pid),
    /// Run program exited with status 0 and will not be respawned.
    Finished,
    /// Run program exited non-zero (or by signal) and will not be respawned.
    Failed(ExitKind),
    /// Cancelled: still running with `Some(pid)`, down with `None`. Never respawned.
    Stopped(Option<Pid>),
    /// Setup program failed; the run phase is blocked until cleared.
    SetupFailed(ExitKind),
}

impl Status {
    /// Pid of the running process, if any.
    #[inline]
    pub fn pid(&self) -> Option<Pid> {
        match *self {
            Status::Setup(pid) | Status::Active(pid) | Status::Stopped(Some(pid)) => Some(pid),
            _ => None,
        }
    }

    /// True while a process of this service is alive.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.pid().is_some()
    }

    /// True once the service has left [`Status::Init`] in any way.
    #[inline]
    pub fn is_up(&self) -> bool {
        !matches!(self, Status::Init)
    }

    /// The same running status, tracking a different pid.
    pub fn with_pid(self, pid: Pid) -> Status {
        match self {
            Status::Setup(_) => Status::Setup(pid),
            Status::Stopped(_) => Status::Stopped(Some(pid)),
            _ => Status::Active(pid),
        }
    }

    /// Value of the pid field on the wire: live pid or sentinel.
    pub fn wire_pid(&self) -> i32 {
        match *self {
            Status::Setup(pid) | Status::Active(pid) | Status::Stopped(Some(pid)) => pid.as_raw(),
            Status::Init | Status::Stopped(None) => PID_DOWN,
            Status::Finished => PID_FINISHED,
            Status::Failed(_) => PID_FAILED,
            Status::SetupFailed(_) => PID_SETUP_FAILED,
        }
    }

    /// Numeric state code on the wire.
    pub fn code(&self) -> u8 {
        match self {
            Status::Init => 0,
            Status::Setup(_) => 1,
            Status::Active(_) => 2,
            Status::Finished => 3,
            Status::Failed(_) => 4,
            Status::Stopped(_) => 5,
            Status::SetupFailed(_) => 6,
        }
    }

    /// Short lowercase name used in listings and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Status::Init => "init",
            Status::Setup(_) => "setup",
            Status::Active(_) => "active",
            Status::Finished => "finished",
            Status::Failed(_) => "failed",
            Status::Stopped(_) => "stopped",
            Status::SetupFailed(_) => "setup-failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a service process terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    /// Exited with the given status.
    Exited(i32),
    /// Killed by the given signal number.
    Signaled(i32),
    /// Disappeared without a wait status (not our child); treated as clean.
    Vanished,
}

impl ExitKind {
    /// Maps a `waitpid` result to `(pid, exit)`; `None` for non-terminal statuses.
    pub fn from_wait(status: WaitStatus) -> Option<(Pid, ExitKind)> {
        match status {
            WaitStatus::Exited(pid, code) => Some((pid, ExitKind::Exited(code))),
            WaitStatus::Signaled(pid, sig, _) => Some((pid, ExitKind::Signaled(sig as i32))),
            _ => None,
        }
    }

    /// True for a clean termination.
    #[inline]
    pub fn success(&self) -> bool {
        matches!(self, ExitKind::Exited(0) | ExitKind::Vanished)
    }

    /// Exit status, or the negated signal number for signal deaths.
    pub fn code(&self) -> i32 {
        match *self {
            ExitKind::Exited(code) => code,
            ExitKind::Signaled(sig) => -sig,
            ExitKind::Vanished => 0,
        }
    }
}

/// One loaded service.
#[derive(Debug)]
pub struct Service {
    pub(crate) name: String,
    pub(crate) status: Status,
    pub(crate) respawn: bool,
    /// Visit marker of the current dependency walk.
    pub(crate) circular: bool,
    /// Setup phase already succeeded in this activation cycle.
    pub(crate) setup_done: bool,
    pub(crate) father: Option<ServiceId>,
    pub(crate) log: Option<ServiceId>,
    /// Dependencies resolved by the last walk, in `depends` order.
    pub(crate) requires: Vec<ServiceId>,
    pub(crate) stdin: Option<OwnedFd>,
    pub(crate) stdout: Option<OwnedFd>,
    pub(crate) changed_at: SystemTime,
}

impl Service {
    pub(crate) fn new(name: String, respawn: bool) -> Self {
        Self {
            name,
            status: Status::Init,
            respawn,
            circular: false,
            setup_done: false,
            father: None,
            log: None,
            requires: Vec::new(),
            stdin: None,
            stdout: None,
            changed_at: SystemTime::now(),
        }
    }

    /// Unique hierarchical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Whether a terminated run phase is relaunched automatically.
    pub fn respawn(&self) -> bool {
        self.respawn
    }

    /// Service whose walk started this one.
    pub fn father(&self) -> Option<ServiceId> {
        self.father
    }

    /// Attached log service.
    pub fn log_service(&self) -> Option<ServiceId> {
        self.log
    }

    /// Dependencies resolved by the last walk.
    pub fn requires(&self) -> &[ServiceId] {
        &self.requires
    }

    /// Time of the last state transition.
    pub fn changed_at(&self) -> SystemTime {
        self.changed_at
    }

    /// Time since the last state transition, zero if the clock is behind it.
    pub fn uptime(&self, now: SystemTime) -> Duration {
        now.duration_since(self.changed_at).unwrap_or_default()
    }

    pub(crate) fn transition(&mut self, status: Status, now: SystemTime) {
        self.status = status;
        self.changed_at = now;
    }
}
