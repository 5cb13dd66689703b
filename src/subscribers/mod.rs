//! # Event subscribers for the dirvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   engine ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet::emit
//!                                                                  │
//!                                                        ┌─────────┴─────────┐
//!                                                        ▼                   ▼
//!                                                    LogWriter            Custom
//!                                                 (tracing records)    (metrics, ...)
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
