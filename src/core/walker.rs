//! # Walker: dependency-ordered startup.
//!
//! [`Supervisor::start`] visits a service depth-first:
//!
//! ```text
//! start(web, pause, father)
//!   ├─ circular?                 ─► return (cycle or already visited)
//!   ├─ circular = true, father, history.push_front(web)
//!   ├─ start(web/log, pause, web)
//!   ├─ for dep in depends:
//!   │     excluded once?         ─► skip, DependencySkipped
//!   │     load(dep)              (failure: LoadFailed, continue)
//!   │     dep not up             ─► start(dep, false, web)
//!   └─ status == Init
//!         ├─ setup declared, not done ─► launch(Setup)  (run follows on exit 0)
//!         └─ otherwise                ─► launch(Run)
//! ```
//!
//! Dependency failures never abort the walk. Every independent request goes
//! through [`Supervisor::walk`], which clears the visit markers around it.

use crate::error::ServiceError;
use crate::events::{Event, EventKind};

use super::service::{Phase, ServiceId};
use super::supervisor::Supervisor;

impl Supervisor {
    /// Starts `id` as an independent request.
    pub(crate) fn walk(
        &mut self,
        id: ServiceId,
        pause: bool,
        father: Option<ServiceId>,
    ) -> Result<(), ServiceError> {
        self.registry.sweep_circular();
        let res = self.start(id, pause, father);
        self.registry.sweep_circular();
        res
    }

    /// Starts the log service and dependencies of `id`, then `id` itself.
    pub(crate) fn start(
        &mut self,
        id: ServiceId,
        pause: bool,
        father: Option<ServiceId>,
    ) -> Result<(), ServiceError> {
        let sv = &mut self.registry[id];
        if sv.circular {
            return Ok(());
        }
        sv.circular = true;
        sv.father = father;
        let log = sv.log;
        self.registry.record_start(id);

        if let Some(log) = log {
            if let Err(e) = self.start(log, pause, Some(id)) {
                tracing::debug!(error = %e, "log service not started");
            }
        }

        let dir = self.dir(id);
        let depends = dir.depends().unwrap_or_else(|e| {
            tracing::warn!(service = %self.registry[id].name, error = %e, "cannot read depends");
            Vec::new()
        });

        let mut requires = Vec::with_capacity(depends.len());
        for dep in depends {
            if self.skip.remove(&dep) {
                self.bus.publish(
                    Event::new(EventKind::DependencySkipped)
                        .with_service(dep.as_str())
                        .with_reason(self.registry[id].name.as_str()),
                );
                continue;
            }
            let Ok(dep_id) = self.load(&dep) else {
                continue;
            };
            requires.push(dep_id);
            if !self.registry[dep_id].status.is_up() {
                if let Err(e) = self.start(dep_id, false, Some(id)) {
                    tracing::debug!(dependency = %dep, error = %e, "dependency not started");
                }
            }
        }
        self.registry[id].requires = requires;

        let sv = &self.registry[id];
        if sv.status.is_up() {
            return Ok(());
        }
        let phase = if !sv.setup_done && dir.has("setup") {
            Phase::Setup
        } else {
            Phase::Run
        };
        self.launch(id, pause, phase)?;
        Ok(())
    }
}
