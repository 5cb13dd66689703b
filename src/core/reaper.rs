//! # Reaper: termination handling and the lifecycle state machine.
//!
//! Termination is observed three ways: the non-blocking `waitpid` loop
//! ([`Supervisor::reap`]), the synchronous wait of a `sync` launch, and
//! liveness polling of processes that are not our children (adopted pids).
//! All of them end in [`Supervisor::handle_exit`]:
//!
//! ```text
//! handle_exit(pid, exit)
//!   ├─ unknown pid                                   ─► ignore
//!   ├─ run phase and pidfile names another live pid  ─► adopt it, PidAdopted
//!   ├─ Setup(_)   exit 0 ─► setup_done, launch(Run)
//!   │             else   ─► SetupFailed
//!   ├─ Active(_)  exit 0 ─► Finished   else ─► Failed
//!   │               └─ respawn ─► Init, walk(pause = uptime < window)
//!   └─ Stopped(_)        ─► Stopped(None)
//! ```

use std::time::{Duration, SystemTime};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

use crate::events::{Event, EventKind};

use super::declaration::read_pid;
use super::service::{ExitKind, Phase, ServiceId, Status};
use super::supervisor::Supervisor;

impl Supervisor {
    /// One maintenance pass: reap, poll liveness, compensate clock jumps.
    pub fn tick(&mut self) {
        self.reap();
        self.poll_liveness();
        self.check_clock(SystemTime::now());
    }

    /// True once no child is left and no adopted process is tracked.
    pub fn exhausted(&self) -> bool {
        self.no_children && !self.registry.any_running()
    }

    /// Collects every terminated child without blocking.
    pub fn reap(&mut self) {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    self.no_children = false;
                    return;
                }
                Ok(status) => {
                    self.no_children = false;
                    if let Some((pid, exit)) = ExitKind::from_wait(status) {
                        self.handle_exit(pid, exit);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => {
                    self.no_children = true;
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "waitpid failed");
                    return;
                }
            }
        }
    }

    /// Checks that every tracked pid still exists.
    ///
    /// Own children are reaped before this runs, so a vanished pid here is an
    /// adopted process that exited.
    pub(crate) fn poll_liveness(&mut self) {
        for (id, pid) in self.registry.running() {
            if self.registry[id].status.pid() != Some(pid) {
                continue;
            }
            if kill(pid, None) == Err(Errno::ESRCH) {
                self.handle_exit(pid, ExitKind::Vanished);
            }
        }
    }

    /// Shifts transition timestamps when the wall clock jumps.
    ///
    /// Any backward step is compensated; forward steps only beyond `clock_skew`.
    pub(crate) fn check_clock(&mut self, now: SystemTime) {
        let last = std::mem::replace(&mut self.last_tick, now);
        let (delta, forward) = match now.duration_since(last) {
            Ok(d) if d > self.cfg.clock_skew => (d, true),
            Ok(_) => return,
            Err(e) => (e.duration(), false),
        };
        if delta.is_zero() {
            return;
        }

        for sv in self.registry.iter_mut() {
            let shifted = if forward {
                sv.changed_at.checked_add(delta)
            } else {
                sv.changed_at.checked_sub(delta)
            };
            if let Some(t) = shifted {
                sv.changed_at = t;
            }
        }
        let secs = delta.as_secs() as i64;
        let signed = if forward { secs } else { -secs };
        self.bus
            .publish(Event::new(EventKind::ClockAdjusted).with_reason(signed.to_string()));
    }

    /// Applies the termination of `pid` to the service tracking it.
    pub fn handle_exit(&mut self, pid: Pid, exit: ExitKind) {
        let Some(id) = self.registry.find_by_pid(pid) else {
            return;
        };
        let prev = self.registry[id].status;

        if matches!(prev, Status::Active(_) | Status::Stopped(Some(_))) {
            if let Some(adopted) = self.adopt_from_pidfile(id, pid) {
                self.registry[id].status = prev.with_pid(adopted);
                self.bus
                    .publish(self.event(EventKind::PidAdopted, id).with_pid(adopted.as_raw()));
                return;
            }
        }

        let now = SystemTime::now();
        let uptime = self.registry[id].uptime(now);
        let next = match prev {
            Status::Setup(_) if exit.success() => Status::Init,
            Status::Setup(_) => Status::SetupFailed(exit),
            Status::Active(_) if exit.success() => Status::Finished,
            Status::Active(_) => Status::Failed(exit),
            Status::Stopped(_) => Status::Stopped(None),
            _ => return,
        };
        self.registry[id].transition(next, now);

        let kind = match next {
            Status::SetupFailed(_) => EventKind::SetupFailed,
            _ => EventKind::ServiceExited,
        };
        self.bus.publish(
            self.event(kind, id)
                .with_pid(pid.as_raw())
                .with_code(exit.code())
                .with_reason(next.label()),
        );

        match (prev, next) {
            (Status::Setup(_), Status::Init) => {
                self.registry[id].setup_done = true;
                // Failures are published by the launcher.
                let _ = self.launch(id, false, Phase::Run);
            }
            (Status::Active(_), Status::Finished | Status::Failed(_)) if self.registry[id].respawn => {
                self.respawn(id, uptime);
            }
            _ => {}
        }
    }

    fn respawn(&mut self, id: ServiceId, uptime: Duration) {
        let rapid = self.cfg.respawn.is_rapid(uptime);
        let mut ev = self.event(EventKind::RespawnScheduled, id);
        if let Some(pause) = self.cfg.respawn.pause_for(rapid) {
            ev = ev.with_delay(pause);
        }
        self.bus.publish(ev);

        let sv = &mut self.registry[id];
        sv.status = Status::Init;
        let father = sv.father;
        if let Err(e) = self.walk(id, rapid, father) {
            tracing::debug!(error = %e, "respawn failed");
        }
    }

    /// Pid named by the service's pidfile, if it is alive and not `dead`.
    fn adopt_from_pidfile(&self, id: ServiceId, dead: Pid) -> Option<Pid> {
        let file = self.dir(id).pidfile()?;
        let pid = read_pid(&file)?;
        if pid == dead {
            return None;
        }
        kill(pid, None).ok()?;
        Some(pid)
    }
}
