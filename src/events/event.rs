//! # Runtime events emitted by the supervisor engine.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Service lifecycle**: loading, launching, exiting, respawning
//! - **Reconciliation**: pidfile adoption, clock compensation
//! - **Supervisor**: control channel availability, shutdown, child exhaustion
//!
//! The [`Event`] struct carries additional metadata such as timestamps, service
//! name, pid, exit code, reasons and pauses.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use dirvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ServiceExited)
//!     .with_service("sshd")
//!     .with_pid(4242)
//!     .with_code(1);
//!
//! assert_eq!(ev.kind, EventKind::ServiceExited);
//! assert_eq!(ev.service.as_deref(), Some("sshd"));
//! assert_eq!(ev.code, Some(1));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Service lifecycle ===
    /// A service record was created from its directory.
    ///
    /// Sets: `service`.
    ServiceLoaded,

    /// A service (or one of its dependencies) could not be loaded.
    ///
    /// Sets: `service`, `reason`.
    LoadFailed,

    /// The setup program of a service was forked.
    ///
    /// Sets: `service`, `pid`, `delay_ms` (child-side pause, if any).
    SetupStarted,

    /// The run program of a service was forked.
    ///
    /// Sets: `service`, `pid`, `delay_ms` (child-side pause, if any).
    ServiceStarted,

    /// Forking a service failed permanently.
    ///
    /// Sets: `service`, `reason`.
    LaunchFailed,

    /// A running service process terminated.
    ///
    /// Sets: `service`, `pid`, `code` (exit status or negated signal), `reason` (new state).
    ServiceExited,

    /// The setup program exited non-zero; the run phase is blocked.
    ///
    /// Sets: `service`, `pid`, `code`.
    SetupFailed,

    /// A terminated service is being relaunched.
    ///
    /// Sets: `service`, `delay_ms` when the relaunch is damped.
    RespawnScheduled,

    /// A dependency was skipped because it was excluded on the command line.
    ///
    /// Sets: `service` (the dependency), `reason` (the dependent).
    DependencySkipped,

    // === Reconciliation ===
    /// The service's pidfile named a live process which is now tracked instead.
    ///
    /// Sets: `service`, `pid` (adopted pid).
    PidAdopted,

    /// The wall clock jumped; all transition timestamps were shifted.
    ///
    /// Sets: `reason` (signed delta in seconds).
    ClockAdjusted,

    // === Supervisor ===
    /// The control FIFOs are unusable; the protocol is disabled.
    ///
    /// Sets: `reason`.
    ControlUnavailable,

    /// Shutdown requested (OS signal observed).
    ShutdownRequested,

    /// No supervised process is left running.
    AllExited,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the service, if applicable.
    pub service: Option<Arc<str>>,
    /// OS process id involved.
    pub pid: Option<i32>,
    /// Exit status; a signal death is reported as the negated signal number.
    pub code: Option<i32>,
    /// Child-side pause before exec in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, states, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            pid: None,
            code: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Attaches a pause duration (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Returns the pause as a [`Duration`], if set.
    #[inline]
    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(|ms| Duration::from_millis(u64::from(ms)))
    }
}
