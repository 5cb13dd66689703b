//! # dirvisor
//!
//! **Dirvisor** is a directory-driven process supervisor. It runs either as
//! process 1 (an init system) or as a background daemon.
//!
//! Each service is a directory under the supervision root. The supervisor
//! loads services lazily by name, starts them in dependency order, relaunches
//! them when they die (if asked to), pipes their output into per-service log
//! services and answers a small control protocol over two FIFOs.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   <root>/boot  <root>/web  <root>/web/log  <root>/db ...        <root>/in  <root>/out
//!        │            │            │             │                     │          ▲
//!        ▼            ▼            ▼             ▼                     ▼          │
//! ┌───────────────────────────────────────────────────────────┐  ┌──────────────────┐
//! │  Supervisor (single-threaded engine)                      │  │  ControlChannel  │
//! │  - Loader    name ─► Service record, log pipe wiring      │◄─┤  Request ─►      │
//! │  - Registry  arena of services, start history             │  │  Response        │
//! │  - Walker    depends ─► depth-first start, cycle-safe     │  └──────────────────┘
//! │  - Launcher  fork ─► fds ─► exec, optional sync wait      │
//! │  - Reaper    waitpid / liveness ─► state machine, respawn │
//! └──────────────────────────────┬────────────────────────────┘
//!                                │ publish(Event)
//!                                ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                  Bus (broadcast channel)                  │
//! └──────────────────────────────┬────────────────────────────┘
//!                                ▼
//!                    subscriber_listener ──► SubscriberSet
//!                                          ┌──────┴──────┐
//!                                          ▼             ▼
//!                                      LogWriter      custom
//! ```
//!
//! ### Service lifecycle
//! ```text
//! s web ──► load ──► walk: log service, depends, then web
//!                        │
//!                        ├─ setup declared ─► Setup(pid) ── exit 0 ──► Active(pid)
//!                        └─ otherwise ──────────────────────────────► Active(pid)
//!
//! Active(pid) ── exit ──► pidfile names a live pid? ─► Active(adopted)
//!                     └─► Finished / Failed ── respawn ──► Init ─► walk again
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                     |
//! |-------------------|----------------------------------------------------------|----------------------------------------|
//! | **Supervision**   | Load, start, reap and respawn directory services.        | [`Supervisor`], [`Status`]             |
//! | **Protocol**      | FIFO control protocol, typed requests and responses.     | [`Request`], [`Response`]              |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, alerts).   | [`Subscribe`], [`LogWriter`]           |
//! | **Policies**      | Crash-loop damping and fork retry timing.                | [`RespawnPolicy`], [`BackoffPolicy`]   |
//! | **Errors**        | Typed errors for loading, launching and the event loop.  | [`LoadError`], [`RuntimeError`]        |
//! | **Configuration** | Supervision root, timings, well-known service names.     | [`Config`]                             |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use dirvisor::{Config, LogWriter, Subscribe, Supervisor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::with_root("/etc/dirvisor");
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!
//!     let sup = Supervisor::new(cfg, subs);
//!     sup.run(vec!["sshd".to_string()]).await?;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod policies;
mod protocol;
mod subscribers;

// ---- Public re-exports ----

pub use config::{Config, DEFAULT_ROOT};
pub use core::{ExitKind, Phase, Registry, Service, ServiceId, Status, Supervisor};
pub use error::{
    EXIT_BAD_TARGET, EXIT_CHILD_SETUP, EXIT_EXEC_FAILED, LaunchError, LoadError, RuntimeError,
    ServiceError,
};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, RespawnPolicy};
pub use protocol::{Command, ControlChannel, Request, Response};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
