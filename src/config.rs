//! # Global supervisor configuration.
//!
//! Provides [`Config`] centralized settings for the supervisor runtime.
//!
//! Config is used in two ways:
//! 1. **Supervisor creation**: `Supervisor::new(config)`
//! 2. **Path resolution**: every service directory and control FIFO is derived from [`Config::root`]
//!
//! ## Sentinel values
//! - `history = 0` → start history is not recorded
//! - `env_file` that does not exist → no global environment overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::policies::{BackoffPolicy, RespawnPolicy};

/// Default supervision root.
pub const DEFAULT_ROOT: &str = "/etc/dirvisor";

/// Global configuration for the supervisor runtime.
///
/// Defines:
/// - **Layout**: supervision root and the well-known names beneath it
/// - **Event loop**: poll interval and clock-skew threshold
/// - **Launch timing**: respawn damping and fork retry policies
/// - **Boot**: names of the boot and default services, rescue shell
///
/// ## Notes
/// All fields are public for flexibility. Prefer the path helpers to joining
/// names onto `root` by hand.
#[derive(Clone, Debug)]
pub struct Config {
    /// Supervision root; holds one directory per service and the control FIFOs.
    pub root: PathBuf,

    /// Upper bound on how long the event loop sleeps without control traffic.
    ///
    /// Each wakeup reaps children, polls liveness and checks the wall clock.
    pub poll_interval: Duration,

    /// Wall-clock jump (forward) that triggers timestamp compensation.
    ///
    /// Any backward jump is always compensated.
    pub clock_skew: Duration,

    /// Length of the start-history ring reported by the `h` command.
    pub history: usize,

    /// Crash-loop damping for automatic relaunches.
    pub respawn: RespawnPolicy,

    /// Retry schedule for `fork` on resource exhaustion.
    pub fork: BackoffPolicy,

    /// Service started first, synchronously, together with its direct dependencies.
    pub boot_service: String,

    /// Service started when none of the requested services could be started.
    pub default_service: String,

    /// File under `root` with `KEY=VALUE` lines added to every service environment.
    pub env_file: PathBuf,

    /// Environment variable set in every child to the service name.
    pub service_env_var: String,

    /// Interactive recovery program spawned when pid 1 cannot open its control FIFOs.
    pub rescue_shell: PathBuf,

    /// Capacity of the event bus broadcast channel ring buffer (min 1).
    pub bus_capacity: usize,
}

impl Config {
    /// Creates the default configuration rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Directory of the named service.
    #[inline]
    pub fn service_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Control FIFO the supervisor reads requests from.
    #[inline]
    pub fn in_fifo(&self) -> PathBuf {
        self.root.join("in")
    }

    /// Control FIFO the supervisor writes responses to.
    #[inline]
    pub fn out_fifo(&self) -> PathBuf {
        self.root.join("out")
    }

    /// Resolved location of the global environment file.
    #[inline]
    pub fn env_file_path(&self) -> PathBuf {
        resolve(&self.root, &self.env_file)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

fn resolve(root: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `root = /etc/dirvisor`
    /// - `poll_interval = 5s`
    /// - `clock_skew = 30s`
    /// - `history = 15`
    /// - `respawn = RespawnPolicy::default()` (1s window, 500ms pause)
    /// - `fork = BackoffPolicy::default()` (3 retries, 2s step)
    /// - `boot_service = "boot"`, `default_service = "default"`
    /// - `env_file = "env.conf"`
    /// - `service_env_var = "DIRVISOR_SERVICE"`
    /// - `rescue_shell = /sbin/sulogin`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            poll_interval: Duration::from_secs(5),
            clock_skew: Duration::from_secs(30),
            history: 15,
            respawn: RespawnPolicy::default(),
            fork: BackoffPolicy::default(),
            boot_service: "boot".to_string(),
            default_service: "default".to_string(),
            env_file: PathBuf::from("env.conf"),
            service_env_var: "DIRVISOR_SERVICE".to_string(),
            rescue_shell: PathBuf::from("/sbin/sulogin"),
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_derive_from_root() {
        let cfg = Config::with_root("/srv/sv");
        assert_eq!(cfg.in_fifo(), PathBuf::from("/srv/sv/in"));
        assert_eq!(cfg.out_fifo(), PathBuf::from("/srv/sv/out"));
        assert_eq!(cfg.service_dir("net/dhcp"), PathBuf::from("/srv/sv/net/dhcp"));
        assert_eq!(cfg.env_file_path(), PathBuf::from("/srv/sv/env.conf"));
    }

    #[test]
    fn test_absolute_env_file_is_kept() {
        let mut cfg = Config::with_root("/srv/sv");
        cfg.env_file = PathBuf::from("/etc/environment");
        assert_eq!(cfg.env_file_path(), PathBuf::from("/etc/environment"));
    }

    #[test]
    fn test_bus_capacity_clamped() {
        let mut cfg = Config::default();
        cfg.bus_capacity = 0;
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
