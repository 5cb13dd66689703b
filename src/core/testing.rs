//! Shared fixtures for engine tests.
//!
//! `waitpid(-1)` reaps any child of the test process, so every test that
//! forks holds [`serial`] for its whole body.

use std::fs;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use crate::config::Config;

use super::supervisor::Supervisor;

static FORK_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that fork.
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    FORK_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A throwaway supervision root and a supervisor over it.
pub(crate) struct Fixture {
    tmp: tempfile::TempDir,
    pub(crate) sup: Supervisor,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let sup = Supervisor::new(Config::with_root(tmp.path()), Vec::new());
        Self { tmp, sup }
    }

    pub(crate) fn root(&self) -> &Path {
        self.tmp.path()
    }

    /// Declares `name` running `/bin/sh -c <script>`.
    pub(crate) fn service(&self, name: &str, script: &str) {
        let dir = self.root().join(name);
        fs::create_dir_all(&dir).unwrap();
        symlink("/bin/sh", dir.join("run")).unwrap();
        fs::write(dir.join("params"), format!("-c\n{script}\n")).unwrap();
    }

    /// Writes an executable shell script `file` into the service directory.
    pub(crate) fn script(&self, name: &str, file: &str, body: &str) {
        let path = self.root().join(name).join(file);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub(crate) fn marker(&self, name: &str, marker: &str) {
        fs::write(self.root().join(name).join(marker), "").unwrap();
    }

    pub(crate) fn depends(&self, name: &str, deps: &[&str]) {
        let mut body = deps.join("\n");
        body.push('\n');
        fs::write(self.root().join(name).join("depends"), body).unwrap();
    }

    /// Creates the `in`/`out` control FIFOs under the root.
    pub(crate) fn fifos(&self) {
        for name in ["in", "out"] {
            mkfifo(&self.root().join(name), Mode::from_bits_truncate(0o600)).unwrap();
        }
    }

    /// Ticks until `cond` holds; panics after 10s.
    pub(crate) fn wait_until(&mut self, mut cond: impl FnMut(&Supervisor) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !cond(&self.sup) {
            assert!(Instant::now() < deadline, "condition not reached in time");
            self.sup.tick();
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Waits until no service has a running process.
    pub(crate) fn settle(&mut self) {
        self.wait_until(|sup| !sup.registry().any_running());
    }

    /// Kills every running service, then settles.
    pub(crate) fn kill_all(&mut self) {
        for sv in self.sup.registry.iter_mut() {
            sv.respawn = false;
        }
        for (_, pid) in self.sup.registry().running() {
            let _ = kill(pid, Signal::SIGKILL);
        }
        self.settle();
    }
}
