//! # Service registry - index-stable arena of loaded services.
//!
//! The registry owns every [`Service`] record for the lifetime of the process.
//! Records are only ever appended: a [`ServiceId`] handed out once stays valid
//! and keeps naming the same service. References between services (father,
//! log service) are plain ids, which tolerates cyclic dependency graphs.
//!
//! ## Architecture
//! ```text
//! Registry
//!   ├─ services: Vec<Service>        (arena, index = ServiceId)
//!   ├─ by_name:  HashMap<name, id>   (lookup for load / protocol)
//!   └─ history:  VecDeque<ServiceId> (start history, most recent first)
//! ```
//!
//! ## Rules
//! - No removal, no compaction
//! - Names are unique
//! - The start history is bounded; the oldest entry is dropped

use std::collections::{HashMap, VecDeque};
use std::ops::{Index, IndexMut};

use nix::unistd::Pid;

use super::service::{Service, ServiceId};

/// Append-only, index-addressed service collection.
#[derive(Debug, Default)]
pub struct Registry {
    services: Vec<Service>,
    by_name: HashMap<String, ServiceId>,
    history: VecDeque<ServiceId>,
    history_len: usize,
}

impl Registry {
    /// Creates an empty registry keeping the last `history_len` starts.
    pub fn new(history_len: usize) -> Self {
        Self {
            services: Vec::new(),
            by_name: HashMap::new(),
            history: VecDeque::with_capacity(history_len),
            history_len,
        }
    }

    /// Appends a service and returns its id.
    ///
    /// Callers check [`Registry::find`] first; a duplicate name keeps the first id.
    pub(crate) fn insert(&mut self, service: Service) -> ServiceId {
        if let Some(id) = self.by_name.get(&service.name) {
            return *id;
        }
        let id = ServiceId(self.services.len());
        self.by_name.insert(service.name.clone(), id);
        self.services.push(service);
        id
    }

    /// Looks a service up by name.
    pub fn find(&self, name: &str) -> Option<ServiceId> {
        self.by_name.get(name).copied()
    }

    /// Looks a running service up by the pid it is tracked under.
    pub fn find_by_pid(&self, pid: Pid) -> Option<ServiceId> {
        self.services
            .iter()
            .position(|s| s.status.pid() == Some(pid))
            .map(ServiceId)
    }

    /// Returns the service if `id` is in range.
    pub fn get(&self, id: ServiceId) -> Option<&Service> {
        self.services.get(id.0)
    }

    /// Number of loaded services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True if nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Iterates over `(id, service)` in load order.
    pub fn iter(&self) -> impl Iterator<Item = (ServiceId, &Service)> {
        self.services.iter().enumerate().map(|(i, s)| (ServiceId(i), s))
    }

    /// Pids of every running service, with their owner.
    pub fn running(&self) -> Vec<(ServiceId, Pid)> {
        self.iter()
            .filter_map(|(id, s)| s.status.pid().map(|pid| (id, pid)))
            .collect()
    }

    /// True if any service has a live process.
    pub fn any_running(&self) -> bool {
        self.services.iter().any(|s| s.status.is_running())
    }

    /// Services that list `id` among their resolved dependencies.
    pub fn dependents(&self, id: ServiceId) -> Vec<ServiceId> {
        self.iter()
            .filter(|(_, s)| s.requires.contains(&id))
            .map(|(dep, _)| dep)
            .collect()
    }

    /// Clears every visit marker before an independent walk.
    pub fn sweep_circular(&mut self) {
        for s in &mut self.services {
            s.circular = false;
        }
    }

    /// Records a start, most recent first.
    pub(crate) fn record_start(&mut self, id: ServiceId) {
        if self.history_len == 0 {
            return;
        }
        self.history.push_front(id);
        self.history.truncate(self.history_len);
    }

    /// Start history, most recent first.
    pub fn history(&self) -> impl Iterator<Item = ServiceId> + '_ {
        self.history.iter().copied()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Service> {
        self.services.iter_mut()
    }
}

impl Index<ServiceId> for Registry {
    type Output = Service;

    fn index(&self, id: ServiceId) -> &Service {
        &self.services[id.0]
    }
}

impl IndexMut<ServiceId> for Registry {
    fn index_mut(&mut self, id: ServiceId) -> &mut Service {
        &mut self.services[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::service::Status;

    fn registry_with(names: &[&str]) -> Registry {
        let mut reg = Registry::new(3);
        for n in names {
            reg.insert(Service::new((*n).to_string(), false));
        }
        reg
    }

    #[test]
    fn test_ids_are_stable_and_unique() {
        let mut reg = registry_with(&["a", "b"]);
        let a = reg.find("a").unwrap();
        let c = reg.insert(Service::new("c".into(), false));
        assert_eq!(reg.find("a"), Some(a));
        assert_eq!(reg[a].name(), "a");
        assert_eq!(c.index(), 2);
        assert_eq!(reg.insert(Service::new("a".into(), true)), a);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_find_by_pid_only_matches_running() {
        let mut reg = registry_with(&["a", "b"]);
        let b = reg.find("b").unwrap();
        reg[b].status = Status::Active(Pid::from_raw(777));
        assert_eq!(reg.find_by_pid(Pid::from_raw(777)), Some(b));
        assert_eq!(reg.find_by_pid(Pid::from_raw(1)), None);
        assert_eq!(reg.running(), vec![(b, Pid::from_raw(777))]);
        assert!(reg.any_running());
    }

    #[test]
    fn test_history_is_bounded_most_recent_first() {
        let mut reg = registry_with(&["a", "b", "c", "d"]);
        for n in ["a", "b", "c", "d"] {
            let id = reg.find(n).unwrap();
            reg.record_start(id);
        }
        let names: Vec<&str> = reg.history().map(|id| reg[id].name()).collect();
        assert_eq!(names, vec!["d", "c", "b"]);
    }

    #[test]
    fn test_dependents_and_sweep() {
        let mut reg = registry_with(&["a", "b", "c"]);
        let (a, b, c) = (
            reg.find("a").unwrap(),
            reg.find("b").unwrap(),
            reg.find("c").unwrap(),
        );
        reg[b].requires = vec![a];
        reg[c].requires = vec![b, a];
        reg[b].circular = true;
        assert_eq!(reg.dependents(a), vec![b, c]);
        assert_eq!(reg.dependents(b), vec![c]);
        assert!(reg.dependents(c).is_empty());
        reg.sweep_circular();
        assert!(reg.iter().all(|(_, s)| !s.circular));
    }

    #[test]
    fn test_get_is_bounds_checked() {
        let reg = registry_with(&["a"]);
        assert!(reg.get(ServiceId(0)).is_some());
        assert!(reg.get(ServiceId(5)).is_none());
    }
}
