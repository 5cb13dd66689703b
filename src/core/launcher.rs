//! # Launcher: fork/exec of one service program.
//!
//! Everything the child needs is prepared in the parent as an [`ExecPlan`]
//! (C strings and null-terminated pointer arrays), so the forked child makes
//! only async-signal-safe system calls and never allocates.
//!
//! ```text
//! parent                                   child
//! ──────                                   ─────
//! ExecPlan::new(target, argv, envp, fds)
//! fork()  (EAGAIN/ENOMEM: sleep 2s,4s,6s)
//!   ├──────────────────────────────────► as pid 1: TIOCNOTTY, setsid, tcsetpgrp
//!   │                                    rapid respawn: sleep(pause)
//!   │                                    no program: _exit(0)
//!   │                                    chdir(service dir)      else _exit(225)
//!   │                                    dup2 stdin→0, stdout→1,2 else _exit(225)
//!   │                                    close(3..)
//!   │                                    execve(target)          else _exit(226)
//! status = Setup(pid) | Active(pid)
//! sync? ─► waitpid(pid) ─► handle_exit
//! ```

use std::ffi::{CString, OsStr, OsString};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::{Duration, SystemTime};

use libc::c_char;
use nix::errno::Errno;
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, Pid, fork};

use crate::error::{EXIT_CHILD_SETUP, EXIT_EXEC_FAILED, LaunchError};
use crate::events::EventKind;
use crate::policies::BackoffPolicy;

use super::declaration::{ServiceDir, Target};
use super::service::{ExitKind, Phase, ServiceId};
use super::supervisor::{Supervisor, set_var};

/// Descriptors above this bound are assumed closed in the child.
const MAX_FD: RawFd = 1024;

/// Pre-built arguments of one `execve`.
pub(crate) struct ExecPlan {
    target: Target,
    dir: CString,
    path: CString,
    _argv: Vec<CString>,
    argv: Vec<*const c_char>,
    _envp: Vec<CString>,
    envp: Vec<*const c_char>,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    pause: Option<Duration>,
    detach: bool,
}

impl ExecPlan {
    /// Builds the plan; `args` excludes argv[0], which is the target's file name.
    pub(crate) fn new(
        dir: &Path,
        target: Target,
        args: Vec<OsString>,
        env: &[(OsString, OsString)],
    ) -> io::Result<Self> {
        let (path, argv) = match &target {
            Target::Exec(path) => {
                let arg0 = path.file_name().unwrap_or(path.as_os_str());
                let mut argv = Vec::with_capacity(args.len() + 1);
                argv.push(cstring(arg0)?);
                for arg in &args {
                    argv.push(cstring(arg)?);
                }
                (cstring(path.as_os_str())?, argv)
            }
            Target::Exit(_) => (CString::default(), Vec::new()),
        };

        let mut envp = Vec::with_capacity(env.len());
        for (key, value) in env {
            let mut entry = Vec::with_capacity(key.len() + value.len() + 1);
            entry.extend_from_slice(key.as_bytes());
            entry.push(b'=');
            entry.extend_from_slice(value.as_bytes());
            envp.push(CString::new(entry)?);
        }

        Ok(Self {
            target,
            dir: cstring(dir.as_os_str())?,
            path,
            argv: pointers(&argv),
            _argv: argv,
            envp: pointers(&envp),
            _envp: envp,
            stdin: None,
            stdout: None,
            pause: None,
            detach: false,
        })
    }

    fn with_fds(mut self, stdin: Option<RawFd>, stdout: Option<RawFd>) -> Self {
        self.stdin = stdin;
        self.stdout = stdout;
        self
    }

    fn with_pause(mut self, pause: Option<Duration>) -> Self {
        self.pause = pause;
        self
    }

    fn detached(mut self, detach: bool) -> Self {
        self.detach = detach;
        self
    }
}

fn cstring(s: &OsStr) -> io::Result<CString> {
    Ok(CString::new(s.as_bytes())?)
}

fn pointers(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

impl Supervisor {
    /// Forks the program of `phase` for `id`.
    ///
    /// On failure the status is left untouched and `LaunchFailed` is published.
    pub(crate) fn launch(
        &mut self,
        id: ServiceId,
        pause: bool,
        phase: Phase,
    ) -> Result<(), LaunchError> {
        let res = self.try_launch(id, pause, phase);
        if let Err(e) = &res {
            self.bus
                .publish(self.event(EventKind::LaunchFailed, id).with_reason(e.to_string()));
        }
        res
    }

    fn try_launch(&mut self, id: ServiceId, pause: bool, phase: Phase) -> Result<(), LaunchError> {
        let dir = self.dir(id);
        let pause = self.cfg.respawn.pause_for(pause);
        let plan = self.exec_plan(id, &dir, phase)?.with_pause(pause);

        let now = SystemTime::now();
        let pid = match fork_with_retry(&self.cfg.fork)? {
            ForkResult::Child => exec_child(&plan),
            ForkResult::Parent { child } => child,
        };
        drop(plan);

        self.registry[id].transition(phase.running(pid), now);
        let kind = match phase {
            Phase::Setup => EventKind::SetupStarted,
            Phase::Run => EventKind::ServiceStarted,
        };
        let mut ev = self.event(kind, id).with_pid(pid.as_raw());
        if let Some(pause) = pause {
            ev = ev.with_delay(pause);
        }
        self.bus.publish(ev);

        if self.is_sync(id, &dir) {
            self.wait_sync(id, pid);
        }
        Ok(())
    }

    fn exec_plan(&self, id: ServiceId, dir: &ServiceDir, phase: Phase) -> Result<ExecPlan, LaunchError> {
        let io_err = |file: &str| {
            let path = dir.path().join(file);
            move |source| LaunchError::Io { path, source }
        };

        let sv = &self.registry[id];
        let mut env = self.base_env.clone();
        let args = match phase {
            Phase::Run => {
                for (key, value) in dir.environ().map_err(io_err("environ"))? {
                    set_var(&mut env, key, value);
                }
                dir.params().map_err(io_err("params"))?
            }
            Phase::Setup => Vec::new(),
        };
        set_var(
            &mut env,
            OsString::from(&self.cfg.service_env_var),
            OsString::from(&sv.name),
        );

        let plan = ExecPlan::new(dir.path(), dir.target(phase), args, &env)
            .map_err(io_err(phase.program()))?;
        Ok(plan
            .with_fds(
                sv.stdin.as_ref().map(AsRawFd::as_raw_fd),
                sv.stdout.as_ref().map(AsRawFd::as_raw_fd),
            )
            .detached(self.init))
    }

    /// Services waited for synchronously: `sync` marker, the boot service and
    /// anything the boot service started.
    fn is_sync(&self, id: ServiceId, dir: &ServiceDir) -> bool {
        let boot = self.cfg.boot_service.as_str();
        let sv = &self.registry[id];
        dir.has("sync")
            || sv.name == boot
            || sv.father.is_some_and(|f| self.registry[f].name == boot)
    }

    /// Blocks until `pid` terminates and feeds the result to the reaper.
    ///
    /// Respawn is switched off first: a waited service that respawned would
    /// otherwise recurse into another wait.
    fn wait_sync(&mut self, id: ServiceId, pid: Pid) {
        self.registry[id].respawn = false;
        loop {
            match waitpid(pid, None) {
                Ok(status) => {
                    if let Some((pid, exit)) = ExitKind::from_wait(status) {
                        self.handle_exit(pid, exit);
                        return;
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    tracing::warn!(pid = pid.as_raw(), error = %e, "synchronous wait failed");
                    return;
                }
            }
        }
    }
}

/// Forks, retrying transient resource exhaustion per `policy`.
fn fork_with_retry(policy: &BackoffPolicy) -> Result<ForkResult, LaunchError> {
    let mut retry = 0;
    loop {
        // SAFETY: the child branch only runs `exec_child`.
        match unsafe { fork() } {
            Ok(res) => return Ok(res),
            Err(source @ (Errno::EAGAIN | Errno::ENOMEM)) => {
                retry += 1;
                match policy.next(retry) {
                    Some(delay) => {
                        tracing::warn!(retry, delay_ms = delay.as_millis() as u64, error = %source, "fork failed, retrying");
                        std::thread::sleep(delay);
                    }
                    None => {
                        return Err(LaunchError::Fork {
                            attempts: retry,
                            source,
                        });
                    }
                }
            }
            Err(source) => {
                return Err(LaunchError::Fork {
                    attempts: retry + 1,
                    source,
                });
            }
        }
    }
}

/// Restores the signal state a freshly exec'd program expects.
///
/// The Rust runtime ignores `SIGPIPE` and ignored dispositions survive
/// `execve`; the mask inherited from the supervisor thread would too.
///
/// # Safety
/// Only call in the forked child; every call is async-signal-safe.
unsafe fn reset_signals() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        let mut empty: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut empty);
        libc::sigprocmask(libc::SIG_SETMASK, &empty, std::ptr::null_mut());
    }
}

/// Child side of the fork. Never returns.
fn exec_child(plan: &ExecPlan) -> ! {
    // SAFETY: every call below is async-signal-safe and the plan's pointers
    // stay valid because the plan outlives this function.
    unsafe {
        if plan.detach {
            libc::ioctl(0, libc::TIOCNOTTY);
            libc::setsid();
            libc::tcsetpgrp(0, libc::getpgrp());
        }
        reset_signals();
        if let Some(pause) = plan.pause {
            std::thread::sleep(pause);
        }
        if let Target::Exit(code) = plan.target {
            libc::_exit(code);
        }
        if libc::chdir(plan.dir.as_ptr()) != 0 {
            libc::_exit(EXIT_CHILD_SETUP);
        }
        if let Some(fd) = plan.stdin {
            if libc::dup2(fd, 0) < 0 {
                libc::_exit(EXIT_CHILD_SETUP);
            }
        }
        if let Some(fd) = plan.stdout {
            if libc::dup2(fd, 1) < 0 || libc::dup2(fd, 2) < 0 {
                libc::_exit(EXIT_CHILD_SETUP);
            }
        }
        for fd in 0..3 {
            libc::fcntl(fd, libc::F_SETFD, 0);
        }
        for fd in 3..MAX_FD {
            libc::close(fd);
        }
        libc::execve(plan.path.as_ptr(), plan.argv.as_ptr(), plan.envp.as_ptr());
        libc::_exit(EXIT_EXEC_FAILED)
    }
}
