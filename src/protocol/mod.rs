//! # Control protocol.
//!
//! Two FIFOs under the supervision root carry one request and one response
//! at a time. Clients serialize among themselves (advisory lock on `in`).
//!
//! ```text
//! client ── write "s" + "web" ──► <root>/in ──► ControlChannel::recv
//!                                                   │
//!                                   Request::parse ─┤
//!                              Supervisor::handle_request
//!                                                   │
//! client ◄── read "1" ─────────── <root>/out ◄── Response::encode
//! ```

mod request;
mod response;
mod server;

pub use request::{Command, Request};
pub use response::Response;
pub use server::{ControlChannel, REQUEST_MAX};
