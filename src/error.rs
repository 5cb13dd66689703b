//! Error types used by the dirvisor engine and event loop.
//!
//! This module defines the error enums of each layer:
//!
//! - [`LoadError`]: a service could not be materialized from its directory.
//! - [`LaunchError`]: a service could not be forked.
//! - [`ServiceError`]: a start request failed (load or launch).
//! - [`RuntimeError`]: the event loop itself could not run.
//!
//! All types provide `as_label` for logging. None of them is fatal to the
//! supervisor: failures are reported to the caller and supervision continues.

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Child exit status: descriptor wiring failed before exec.
pub const EXIT_CHILD_SETUP: i32 = 225;
/// Child exit status: `execve` returned.
pub const EXIT_EXEC_FAILED: i32 = 226;
/// Child exit status: the `run`/`setup` target could not be resolved.
pub const EXIT_BAD_TARGET: i32 = 227;

/// # Errors produced while loading a service.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LoadError {
    /// Name is empty, too long, or contains a NUL byte.
    #[error("invalid service name {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// The service directory does not exist.
    #[error("service {name:?} not found at {path:?}")]
    Missing {
        /// Service name.
        name: String,
        /// Directory that was looked up.
        path: PathBuf,
    },

    /// The log pipe could not be created.
    #[error("log pipe for {name:?}: {source}")]
    Pipe {
        /// Service name.
        name: String,
        /// Underlying OS error.
        source: Errno,
    },
}

impl LoadError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LoadError::InvalidName { .. } => "load_invalid_name",
            LoadError::Missing { .. } => "load_missing",
            LoadError::Pipe { .. } => "load_pipe",
        }
    }
}

/// # Errors produced while launching a service.
///
/// Failures after `fork` never surface here: the child exits with one of the
/// `EXIT_*` statuses and the reaper classifies it as a failed run.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LaunchError {
    /// `fork` kept failing.
    #[error("fork failed after {attempts} attempts: {source}")]
    Fork {
        /// Number of fork attempts made.
        attempts: u32,
        /// Last OS error.
        source: Errno,
    },

    /// A declaration file could not be read or turned into exec arguments.
    #[error("{path:?}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchError::Fork { .. } => "launch_fork",
            LaunchError::Io { .. } => "launch_io",
        }
    }
}

/// # Errors produced by a start request.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The service (or its log service) could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The service could not be launched.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// The setup phase failed earlier; the service must be cleared first.
    #[error("setup of {name:?} failed; clear the service before starting it")]
    SetupFailed {
        /// Service name.
        name: String,
    },
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Load(e) => e.as_label(),
            ServiceError::Launch(e) => e.as_label(),
            ServiceError::SetupFailed { .. } => "service_setup_failed",
        }
    }
}

/// # Errors produced by the supervisor event loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Signal handlers could not be installed.
    #[error("signal registration failed: {0}")]
    Signal(#[source] std::io::Error),

    /// The control FIFOs could not be opened.
    #[error("control channel {path:?}: {source}")]
    Control {
        /// FIFO that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The async runtime could not be built.
    #[error("runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Signal(_) => "runtime_signal",
            RuntimeError::Control { .. } => "runtime_control",
            RuntimeError::Runtime(_) => "runtime_build",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        let err = LoadError::InvalidName {
            name: String::new(),
        };
        assert_eq!(err.as_label(), "load_invalid_name");

        let err = ServiceError::from(LaunchError::Fork {
            attempts: 4,
            source: Errno::EAGAIN,
        });
        assert_eq!(err.as_label(), "launch_fork");
    }

    #[test]
    fn test_service_error_is_transparent() {
        let err = ServiceError::from(LoadError::Missing {
            name: "sshd".into(),
            path: PathBuf::from("/etc/dirvisor/sshd"),
        });
        assert!(err.to_string().contains("sshd"));
        assert!(err.to_string().contains("not found"));
    }
}
