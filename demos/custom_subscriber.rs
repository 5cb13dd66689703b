//! # Example: custom_subscriber
//!
//! Runs a throwaway supervision root with one crashing service and a custom
//! subscriber that prints its lifecycle.
//!
//! Shows how to:
//! - Implement the [`Subscribe`] trait.
//! - Inspect [`Event`] / [`EventKind`] for service lifecycle.
//! - Wire the subscriber into [`Supervisor::new`] next to [`LogWriter`].
//!
//! ## Flow
//! ```text
//! <tmp>/flaky/{run,params,respawn} ──► Supervisor::run(["flaky"])
//!     ├─► ServiceStarted ─► ServiceExited ─► RespawnScheduled (damped)
//!     └─► subscriber_listener ──► SubscriberSet ──► Console.on_event()
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example custom_subscriber
//! ```

use std::os::unix::fs::symlink;
use std::sync::Arc;
use std::time::Duration;

use dirvisor::{Config, Event, EventKind, LogWriter, Subscribe, Supervisor};

/// Prints selected events to stdout.
struct Console;

#[async_trait::async_trait]
impl Subscribe for Console {
    async fn on_event(&self, ev: &Event) {
        let service = ev.service.as_deref().unwrap_or("<none>");
        match ev.kind {
            EventKind::ServiceStarted => {
                println!("[sub] started:  {service} pid={}", ev.pid.unwrap_or(0));
            }
            EventKind::ServiceExited => {
                println!(
                    "[sub] exited:   {service} code={} state={}",
                    ev.code.unwrap_or(0),
                    ev.reason.as_deref().unwrap_or("?")
                );
            }
            EventKind::RespawnScheduled => match ev.delay() {
                Some(d) => println!("[sub] respawn:  {service} after {d:?}"),
                None => println!("[sub] respawn:  {service}"),
            },
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    let dir = root.path().join("flaky");
    std::fs::create_dir(&dir)?;
    symlink("/bin/sh", dir.join("run"))?;
    std::fs::write(dir.join("params"), "-c\nsleep 0.2; exit 3\n")?;
    std::fs::write(dir.join("respawn"), "")?;

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new()), Arc::new(Console)];
    let sup = Supervisor::new(Config::with_root(root.path()), subs);

    // Daemon mode runs until a signal; bound the demo instead.
    tokio::select! {
        res = sup.run(vec!["flaky".to_string()]) => res?,
        _ = tokio::time::sleep(Duration::from_secs(3)) => println!("[demo] done"),
    }
    Ok(())
}
