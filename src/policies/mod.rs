//! Launch timing policies.
//!
//! This module groups the knobs that control **how long** the launcher waits
//! before forking or exec-ing a service.
//!
//! ## Contents
//! - [`RespawnPolicy`] crash-loop damping for automatic relaunches (window / pause)
//! - [`BackoffPolicy`] fork retry schedule on resource exhaustion (step / retries)
//!
//! ## Quick wiring
//! ```text
//! Config { respawn: RespawnPolicy, fork: BackoffPolicy, .. }
//!      ├─► core::reaper uses respawn.is_rapid(uptime) to pick the pause flag
//!      └─► core::launcher uses:
//!           - respawn.pause_for(pause) for the child-side sleep
//!           - fork.next(retry) between failed fork attempts
//! ```
//!
//! ## Defaults
//! - `RespawnPolicy::default()` → window=1s, pause=500ms.
//! - `BackoffPolicy::default()` → step=2s, retries=3.

mod backoff;
mod respawn;

pub use backoff::BackoffPolicy;
pub use respawn::RespawnPolicy;
