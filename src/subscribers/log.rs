//! # LogWriter: renders events through `tracing`
//!
//! The subscriber the daemon installs by default. Each [`Event`] becomes one
//! structured `tracing` record; the level follows the severity of the event.
//!
//! ## Example output (`tracing_subscriber::fmt`)
//! ```text
//! INFO  service="sshd" pid=412 service started
//! WARN  service="sshd" pid=412 code=1 state="failed" service exited
//! INFO  service="sshd" pause_ms=500 respawning
//! INFO  service="ntpd" pid=530 adopted pid from pidfile
//! ERROR service="db" pid=601 code=2 setup failed, run phase blocked
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::ServiceLoaded => {
                tracing::debug!(service, "service loaded");
            }
            EventKind::LoadFailed => {
                tracing::warn!(service, reason, "load failed");
            }
            EventKind::SetupStarted => {
                tracing::info!(service, pid = e.pid, pause_ms = e.delay_ms, "setup started");
            }
            EventKind::ServiceStarted => {
                tracing::info!(service, pid = e.pid, pause_ms = e.delay_ms, "service started");
            }
            EventKind::LaunchFailed => {
                tracing::error!(service, reason, "launch failed");
            }
            EventKind::ServiceExited => {
                if e.code == Some(0) {
                    tracing::info!(service, pid = e.pid, code = e.code, state = reason, "service exited");
                } else {
                    tracing::warn!(service, pid = e.pid, code = e.code, state = reason, "service exited");
                }
            }
            EventKind::SetupFailed => {
                tracing::error!(service, pid = e.pid, code = e.code, "setup failed, run phase blocked");
            }
            EventKind::RespawnScheduled => {
                tracing::info!(service, pause_ms = e.delay_ms, "respawning");
            }
            EventKind::DependencySkipped => {
                tracing::info!(service, dependent = reason, "excluded dependency skipped");
            }
            EventKind::PidAdopted => {
                tracing::info!(service, pid = e.pid, "adopted pid from pidfile");
            }
            EventKind::ClockAdjusted => {
                tracing::warn!(delta_secs = reason, "wall clock jumped, timestamps shifted");
            }
            EventKind::ControlUnavailable => {
                tracing::error!(reason, "control protocol disabled");
            }
            EventKind::ShutdownRequested => {
                tracing::info!("shutdown requested");
            }
            EventKind::AllExited => {
                tracing::warn!("all services exited");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Renders `events` through a plain-text fmt subscriber, one line each.
    fn render(events: &[Event]) -> Vec<String> {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_target(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            futures::executor::block_on(async {
                for ev in events {
                    LogWriter::new().on_event(ev).await;
                }
            })
        });
        let raw = out.0.lock().unwrap().clone();
        String::from_utf8(raw).unwrap().lines().map(str::to_owned).collect()
    }

    #[test]
    fn test_level_follows_exit_status() {
        let lines = render(&[
            Event::new(EventKind::ServiceExited)
                .with_service("web")
                .with_pid(412)
                .with_code(0)
                .with_reason("finished"),
            Event::new(EventKind::ServiceExited)
                .with_service("web")
                .with_pid(413)
                .with_code(1)
                .with_reason("failed"),
        ]);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(" INFO "), "{}", lines[0]);
        assert!(lines[0].contains("service exited"));
        assert!(lines[0].contains("pid=412"));
        assert!(lines[1].contains(" WARN "), "{}", lines[1]);
        assert!(lines[1].contains("code=1"));
        assert!(lines[1].contains(r#"state="failed""#));
        assert!(lines[1].contains(r#"service="web""#));
    }

    #[test]
    fn test_missing_fields_are_omitted() {
        let lines = render(&[
            Event::new(EventKind::ServiceStarted).with_service("db"),
            Event::new(EventKind::ClockAdjusted).with_reason("-5"),
            Event::new(EventKind::AllExited),
        ]);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("service started"));
        assert!(!lines[0].contains("pid="), "{}", lines[0]);
        assert!(!lines[0].contains("pause_ms="));
        assert!(lines[1].contains(" WARN "));
        assert!(lines[1].contains(r#"delta_secs="-5""#), "{}", lines[1]);
        assert!(lines[2].contains("all services exited"));
    }
}
