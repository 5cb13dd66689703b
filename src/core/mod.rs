//! Supervisor engine: registry, loading, startup walk, launching and reaping.
//!
//! The only entry point is [`Supervisor`]; the other modules extend it with
//! `impl Supervisor` blocks, one per stage of a service's life.
//!
//! Internal modules:
//! - [`service`]: service record, [`Status`] sum type, exit classification;
//! - [`registry`]: append-only arena of services;
//! - [`declaration`]: readers for the files of a service directory;
//! - [`loader`]: name → registry entry, log pipe wiring;
//! - [`walker`]: dependency-ordered, cycle-safe startup;
//! - [`launcher`]: fork/exec and synchronous waits;
//! - [`reaper`]: termination handling, pidfile adoption, clock compensation;
//! - [`supervisor`]: boot sequence and the event loop;
//! - [`shutdown`]: termination signals in daemon mode.

mod declaration;
mod launcher;
mod loader;
mod reaper;
mod registry;
mod service;
mod shutdown;
mod supervisor;
mod walker;

#[cfg(test)]
pub(crate) mod testing;

pub use registry::Registry;
pub use service::{ExitKind, Phase, Service, ServiceId, Status};
pub use supervisor::Supervisor;
