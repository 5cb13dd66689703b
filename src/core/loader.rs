//! # Loader: materializes service records from their directories.
//!
//! ```text
//! load("web")
//!   ├─ known name?            ─► existing id
//!   ├─ invalid name           ─► LoadError::InvalidName
//!   ├─ <root>/web missing     ─► LoadError::Missing
//!   ├─ respawn = <root>/web/respawn exists
//!   ├─ <root>/web/log/ exists ─► load("web/log"), pipe(O_CLOEXEC)
//!   │                               log.stdin  = read end
//!   │                               web.stdout = write end
//!   └─ insert ─► ServiceLoaded
//! ```
//!
//! The record is inserted only once every step succeeded, so a failed load
//! leaves nothing behind. The log service itself stays loaded.

use std::path::{Component, Path};

use nix::fcntl::OFlag;
use nix::unistd::pipe2;

use crate::error::LoadError;
use crate::events::{Event, EventKind};

use super::declaration::ServiceDir;
use super::service::{Service, ServiceId};
use super::supervisor::Supervisor;

impl Supervisor {
    /// Loads the named service, or returns its id if it is already known.
    pub fn load(&mut self, name: &str) -> Result<ServiceId, LoadError> {
        if let Some(id) = self.registry.find(name) {
            return Ok(id);
        }
        match self.load_new(name) {
            Ok(id) => {
                self.bus.publish(self.event(EventKind::ServiceLoaded, id));
                Ok(id)
            }
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::LoadFailed)
                        .with_service(name)
                        .with_reason(e.to_string()),
                );
                Err(e)
            }
        }
    }

    fn load_new(&mut self, name: &str) -> Result<ServiceId, LoadError> {
        validate_name(name)?;
        let dir = ServiceDir::new(self.cfg.service_dir(name));
        if !dir.exists() {
            return Err(LoadError::Missing {
                name: name.to_owned(),
                path: dir.path().to_path_buf(),
            });
        }

        let mut service = Service::new(name.to_owned(), dir.has("respawn"));

        if dir.path().join("log").is_dir() {
            let log = self.load(&format!("{name}/log"))?;
            let (read, write) = pipe2(OFlag::O_CLOEXEC).map_err(|source| LoadError::Pipe {
                name: name.to_owned(),
                source,
            })?;
            self.registry[log].stdin = Some(read);
            service.stdout = Some(write);
            service.log = Some(log);
        }

        Ok(self.registry.insert(service))
    }
}

/// Names are relative paths that stay under the supervision root.
fn validate_name(name: &str) -> Result<(), LoadError> {
    let path = Path::new(name);
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir));
    if name.is_empty() || name.len() > libc::PATH_MAX as usize || name.contains('\0') || escapes {
        return Err(LoadError::InvalidName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::Fixture;

    #[test]
    fn test_load_is_idempotent() {
        let mut fx = Fixture::new();
        fx.service("web", "exit 0");
        let first = fx.sup.load("web").unwrap();
        let second = fx.sup.load("web").unwrap();
        assert_eq!(first, second);
        assert_eq!(fx.sup.registry().len(), 1);
    }

    #[test]
    fn test_invalid_and_missing_names() {
        let mut fx = Fixture::new();
        assert!(matches!(fx.sup.load(""), Err(LoadError::InvalidName { .. })));
        assert!(matches!(fx.sup.load("a\0b"), Err(LoadError::InvalidName { .. })));
        let long = "x".repeat(libc::PATH_MAX as usize + 1);
        assert!(matches!(fx.sup.load(&long), Err(LoadError::InvalidName { .. })));
        assert!(matches!(fx.sup.load("ghost"), Err(LoadError::Missing { .. })));
        assert!(fx.sup.registry().is_empty());
    }

    #[test]
    fn test_names_cannot_leave_the_root() {
        let mut fx = Fixture::new();
        fx.service("inside", "exit 0");
        let outside = tempfile::tempdir().unwrap();
        let abs = outside.path().to_str().unwrap().to_owned();
        let rel = format!("../{}", outside.path().file_name().unwrap().to_str().unwrap());

        for name in [abs.as_str(), "/bin", "../x", "inside/../inside", "a/../../b"] {
            assert!(
                matches!(fx.sup.load(name), Err(LoadError::InvalidName { .. })),
                "{name} accepted"
            );
        }
        assert!(matches!(fx.sup.load(&rel), Err(LoadError::InvalidName { .. })));
        assert_eq!(fx.sup.handle_request(b"s/bin"), crate::protocol::Response::Error);
        assert!(fx.sup.load("inside").is_ok());
        assert_eq!(fx.sup.registry().len(), 1);
    }

    #[test]
    fn test_respawn_marker() {
        let mut fx = Fixture::new();
        fx.service("a", "exit 0");
        fx.service("b", "exit 0");
        fx.marker("b", "respawn");
        let a = fx.sup.load("a").unwrap();
        let b = fx.sup.load("b").unwrap();
        assert!(!fx.sup.registry()[a].respawn());
        assert!(fx.sup.registry()[b].respawn());
    }

    #[test]
    fn test_log_service_is_wired_at_load() {
        let mut fx = Fixture::new();
        fx.service("web", "exit 0");
        fx.service("web/log", "exit 0");
        let web = fx.sup.load("web").unwrap();
        let log = fx.sup.registry().find("web/log").expect("log service loaded");

        let reg = fx.sup.registry();
        assert_eq!(reg[web].log_service(), Some(log));
        assert!(reg[web].stdout.is_some());
        assert!(reg[log].stdin.is_some());
        assert!(reg[web].stdin.is_none());
    }

    #[test]
    fn test_load_publishes_events() {
        let mut fx = Fixture::new();
        fx.service("web", "exit 0");
        let mut rx = fx.sup.bus().subscribe();
        fx.sup.load("web").unwrap();
        let _ = fx.sup.load("nope");

        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::ServiceLoaded);
        assert_eq!(ev.service.as_deref(), Some("web"));
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::LoadFailed);
        assert_eq!(ev.service.as_deref(), Some("nope"));
    }
}
