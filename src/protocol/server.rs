//! # Control channel and command dispatch.
//!
//! [`ControlChannel`] owns the two FIFOs under the supervision root. Both are
//! opened read-write so that neither end sees EOF or blocks on open while no
//! client is connected.
//!
//! [`Supervisor::handle_request`] decodes a request, checks the service
//! exists (except for `s`, which loads lazily) and answers with a typed
//! [`Response`]. It never panics on client input.

use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::net::unix::pipe;

use crate::config::Config;
use crate::core::{ServiceId, Status, Supervisor};
use crate::error::RuntimeError;

use super::request::{Command, Request};
use super::response::Response;

/// Largest request read in one go.
pub const REQUEST_MAX: usize = 1500;

/// The `in`/`out` FIFO pair.
pub struct ControlChannel {
    rx: pipe::Receiver,
    tx: pipe::Sender,
    out: PathBuf,
}

impl ControlChannel {
    /// Opens both FIFOs. Must be called from within a Tokio runtime.
    pub fn open(cfg: &Config) -> Result<Self, RuntimeError> {
        let (in_path, out) = (cfg.in_fifo(), cfg.out_fifo());
        let rx = pipe::OpenOptions::new()
            .read_write(true)
            .open_receiver(&in_path)
            .map_err(|source| RuntimeError::Control {
                path: in_path,
                source,
            })?;
        let tx = pipe::OpenOptions::new()
            .read_write(true)
            .open_sender(&out)
            .map_err(|source| RuntimeError::Control {
                path: out.clone(),
                source,
            })?;
        Ok(Self { rx, tx, out })
    }

    /// Waits for the next request and reads it into `buf`.
    pub async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            self.rx.readable().await?;
            match self.rx.try_read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes a response without blocking; a full FIFO drops it.
    pub fn send(&self, bytes: &[u8]) {
        match self.tx.try_write(bytes) {
            Ok(n) if n == bytes.len() => {}
            Ok(n) => tracing::warn!(path = ?self.out, written = n, len = bytes.len(), "short control response"),
            Err(e) => tracing::warn!(path = ?self.out, error = %e, "control response dropped"),
        }
    }
}

impl Supervisor {
    /// Executes one control request.
    pub fn handle_request(&mut self, raw: &[u8]) -> Response {
        let Some(req) = Request::parse(raw) else {
            return Response::Error;
        };

        match req.command {
            Command::History => {
                return Response::List(self.names(self.registry().history().collect()));
            }
            Command::List => {
                let names = self.registry().iter().map(|(_, s)| s.name().to_owned()).collect();
                return Response::List(names);
            }
            Command::ListLong => return Response::List(self.long_listing()),
            Command::Start => return self.request_start(req.name),
            _ => {}
        }

        let Some(id) = self.registry().find(req.name) else {
            return Response::Error;
        };
        let now = SystemTime::now();
        let sv = &mut self.registry[id];

        match req.command {
            Command::Pid => Response::Pid {
                pid: sv.status.wire_pid(),
                code: sv.status.code(),
            },
            Command::RespawnOff => {
                sv.respawn = false;
                Response::Ack
            }
            Command::RespawnOn => {
                sv.respawn = true;
                Response::Ack
            }
            Command::Cancel => {
                let pid = sv.status.pid();
                if pid.is_some() {
                    sv.status = Status::Stopped(pid);
                }
                Response::ack_if(pid.is_some())
            }
            Command::Clear => {
                if sv.status.is_running() {
                    return Response::Error;
                }
                sv.setup_done = false;
                sv.transition(Status::Init, now);
                Response::Ack
            }
            Command::Adopt => {
                let Some(pid) = req.arg_number().filter(|p| *p > 1).map(Pid::from_raw) else {
                    return Response::Error;
                };
                if kill(pid, None).is_err() {
                    return Response::Error;
                }
                sv.transition(Status::Active(pid), now);
                Response::Ack
            }
            Command::Uptime => Response::Uptime(sv.uptime(now).as_secs()),
            Command::Dependents => Response::List(self.names(self.registry().dependents(id))),
            Command::Start | Command::History | Command::List | Command::ListLong => Response::Error,
        }
    }

    fn request_start(&mut self, name: &str) -> Response {
        match self.start_service(name) {
            Ok(_) => Response::Ack,
            Err(e) => {
                tracing::debug!(service = name, error = %e, "start request refused");
                Response::Error
            }
        }
    }

    fn names(&self, ids: Vec<ServiceId>) -> Vec<String> {
        ids.into_iter()
            .map(|id| self.registry()[id].name().to_owned())
            .collect()
    }

    fn long_listing(&self) -> Vec<String> {
        let now = SystemTime::now();
        self.registry()
            .iter()
            .map(|(_, s)| format!("{} {} {}s", s.name(), s.status().label(), s.uptime(now).as_secs()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{Fixture, serial};

    #[test]
    fn test_unknown_service_is_error() {
        let mut fx = Fixture::new();
        for req in [&b"pghost"[..], b"rghost", b"cghost", b"Cghost", b"ughost", b"dghost"] {
            assert_eq!(fx.sup.handle_request(req), Response::Error);
        }
        assert_eq!(fx.sup.handle_request(b"sghost"), Response::Error);
        assert_eq!(fx.sup.handle_request(b"?x"), Response::Error);
        assert_eq!(fx.sup.handle_request(b""), Response::Error);
    }

    #[test]
    fn test_pid_round_trip() {
        let _guard = serial();
        let mut fx = Fixture::new();
        fx.service("job", "sleep 0.3");

        assert_eq!(fx.sup.handle_request(b"sjob"), Response::Ack);
        let Response::Pid { pid, code } = fx.sup.handle_request(b"pjob") else {
            panic!("expected pid response");
        };
        assert!(pid > 1);
        assert_eq!(code, 2);

        fx.settle();
        assert_eq!(fx.sup.handle_request(b"pjob"), Response::Pid { pid: 1, code: 3 });
    }

    #[test]
    fn test_respawn_toggle_and_listing() {
        let mut fx = Fixture::new();
        fx.service("a", "exit 0");
        fx.service("b", "exit 0");
        let a = fx.sup.load("a").unwrap();
        fx.sup.load("b").unwrap();

        assert_eq!(fx.sup.handle_request(b"Ra"), Response::Ack);
        assert!(fx.sup.registry()[a].respawn());
        assert_eq!(fx.sup.handle_request(b"ra"), Response::Ack);
        assert!(!fx.sup.registry()[a].respawn());

        assert_eq!(
            fx.sup.handle_request(b"l"),
            Response::List(vec!["a".into(), "b".into()])
        );
        let Response::List(lines) = fx.sup.handle_request(b"L") else {
            panic!("expected list");
        };
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("a init "), "{}", lines[0]);
        assert!(lines[0].ends_with('s'));
        assert_eq!(fx.sup.handle_request(b"ua"), Response::Uptime(0));
    }

    #[test]
    fn test_cancel_and_clear_require_right_state() {
        let mut fx = Fixture::new();
        fx.service("a", "exit 0");
        let a = fx.sup.load("a").unwrap();

        // Not running: nothing to cancel, clear is allowed.
        assert_eq!(fx.sup.handle_request(b"ca"), Response::Error);
        assert_eq!(fx.sup.handle_request(b"Ca"), Response::Ack);

        // Track our own pid so the service counts as running.
        let me = nix::unistd::getpid();
        let adopt = format!("Pa\0{}", me.as_raw());
        assert_eq!(fx.sup.handle_request(adopt.as_bytes()), Response::Ack);
        assert_eq!(fx.sup.registry()[a].status(), Status::Active(me));
        assert_eq!(fx.sup.handle_request(b"Ca"), Response::Error);
        assert_eq!(fx.sup.handle_request(b"ca"), Response::Ack);
        assert_eq!(fx.sup.registry()[a].status(), Status::Stopped(Some(me)));
        assert_eq!(
            fx.sup.handle_request(b"pa"),
            Response::Pid {
                pid: me.as_raw(),
                code: 5
            }
        );
    }

    #[test]
    fn test_adopt_rejects_bad_pids() {
        let mut fx = Fixture::new();
        fx.service("a", "exit 0");
        fx.sup.load("a").unwrap();
        assert_eq!(fx.sup.handle_request(b"Pa\x001"), Response::Error);
        assert_eq!(fx.sup.handle_request(b"Pa\x000"), Response::Error);
        assert_eq!(fx.sup.handle_request(b"Pa"), Response::Error);
        assert_eq!(fx.sup.handle_request(b"Pa\x00999999999"), Response::Error);
    }

    fn make_fifos(cfg: &Config) {
        use nix::sys::stat::Mode;
        for path in [cfg.in_fifo(), cfg.out_fifo()] {
            nix::unistd::mkfifo(&path, Mode::from_bits_truncate(0o600)).unwrap();
        }
    }

    #[tokio::test]
    async fn test_channel_round_trip() {
        use std::io::{Read, Write};

        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::with_root(tmp.path());
        make_fifos(&cfg);
        let mut ch = ControlChannel::open(&cfg).unwrap();

        let mut client_in = std::fs::OpenOptions::new()
            .write(true)
            .open(cfg.in_fifo())
            .unwrap();
        client_in.write_all(b"pweb").unwrap();
        let mut buf = [0u8; REQUEST_MAX];
        let n = ch.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pweb");

        let mut client_out = std::fs::File::open(cfg.out_fifo()).unwrap();
        ch.send(&Response::Pid { pid: 7, code: 2 }.encode());
        let mut got = [0u8; 3];
        client_out.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"7@2");
    }

    #[tokio::test]
    async fn test_channel_requires_fifos() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::with_root(tmp.path());
        assert!(matches!(
            ControlChannel::open(&cfg),
            Err(RuntimeError::Control { .. })
        ));
    }

    #[test]
    fn test_log_pipe_carries_output() {
        let _guard = serial();
        let mut fx = Fixture::new();
        fx.service("web", "echo hello");
        fx.service("web/log", r#"read line; echo "got $line" > captured"#);

        assert_eq!(fx.sup.handle_request(b"sweb"), Response::Ack);
        fx.settle();
        let captured = std::fs::read_to_string(fx.root().join("web/log/captured")).unwrap();
        assert_eq!(captured, "got hello\n");
    }
}
