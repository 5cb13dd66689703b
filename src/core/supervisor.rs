//! # Supervisor: owns the registry, drives the event loop, answers the control protocol.
//!
//! The [`Supervisor`] owns the service [`Registry`], the event [`Bus`] and the
//! global [`Config`]. All registry mutation happens on the thread running
//! [`Supervisor::run`]; the engine itself is synchronous and the async runtime
//! only multiplexes its wakeup sources.
//!
//! ## Key responsibilities
//! - boot sequence: `boot` service, requested services, `default` fallback
//! - subscribe to the [`Bus`] and **fan-out** events via [`SubscriberSet`]
//! - reap children on `SIGCHLD` and on every poll tick
//! - serve one control request per wakeup
//! - stop on a termination signal (daemon) or once every child is gone (init)
//!
//! ## High-level architecture
//! ```text
//! Inputs to run():
//!   Vec<String> (services from the command line) ──► Supervisor::run()
//!
//! Preparation:
//!   - subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!   - run(): as pid 1 disable Ctrl-Alt-Del reboot, otherwise
//!     shutdown::wait_for_shutdown_signal() ─► token.cancel()
//!   - run_until(token): everything below
//!   - boot(): walk `boot`, then each requested service, else `default`
//!   - ControlChannel::open(in, out)   (failure: rescue shell as pid 1, protocol disabled)
//!
//! Event loop:
//!   loop {
//!     tick(): reap (waitpid WNOHANG) ─► liveness poll ─► clock-skew check
//!     init && no children left ─► return
//!     select! {
//!       token.cancelled()  ─► ShutdownRequested, return
//!       SIGCHLD            ─► loop
//!       poll_interval tick ─► loop
//!       control request    ─► reap ─► handle_request ─► write response
//!     }
//!   }
//! ```

use std::collections::HashSet;
use std::ffi::OsString;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use nix::unistd::getpid;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{RuntimeError, ServiceError};
use crate::events::{Bus, Event, EventKind};
use crate::protocol::{ControlChannel, REQUEST_MAX};
use crate::subscribers::{Subscribe, SubscriberSet};

use super::declaration::{ServiceDir, read_env_file};
use super::registry::Registry;
use super::service::{ServiceId, Status};
use super::shutdown;

/// Directory-driven process supervisor.
pub struct Supervisor {
    pub(crate) cfg: Config,
    pub(crate) registry: Registry,
    pub(crate) bus: Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
    /// Environment every service starts from.
    pub(crate) base_env: Vec<(OsString, OsString)>,
    /// Running as pid 1.
    pub(crate) init: bool,
    /// Dependencies skipped the first time a walk meets them.
    pub(crate) skip: HashSet<String>,
    /// Wall-clock reading of the previous tick.
    pub(crate) last_tick: SystemTime,
    /// The last reap found no child processes at all.
    pub(crate) no_children: bool,
}

/// What woke the event loop.
enum Wake {
    Shutdown,
    Child,
    Tick,
    Request(io::Result<usize>),
}

impl Supervisor {
    /// Creates a supervisor with the given config and subscribers.
    ///
    /// The base environment is the process environment overlaid with the
    /// global environment file, if present.
    pub fn new(cfg: Config, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let mut base_env: Vec<(OsString, OsString)> = std::env::vars_os().collect();
        let env_file = cfg.env_file_path();
        match read_env_file(&env_file) {
            Ok(vars) => {
                for (key, value) in vars {
                    set_var(&mut base_env, key, value);
                }
            }
            Err(e) => tracing::warn!(path = ?env_file, error = %e, "cannot read environment file"),
        }

        Self {
            registry: Registry::new(cfg.history),
            bus,
            subscribers,
            base_env,
            init: getpid().as_raw() == 1,
            skip: HashSet::new(),
            last_tick: SystemTime::now(),
            no_children: false,
            cfg,
        }
    }

    /// Skips each named service the first time a dependency walk meets it.
    pub fn exclude<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(names.into_iter().map(Into::into));
    }

    /// Global configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Event bus; subscribe to observe the engine.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Loaded services.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// True when running as pid 1.
    pub fn is_init(&self) -> bool {
        self.init
    }

    /// Starts the boot service, then `services`, falling back to the default service.
    ///
    /// Returns the number of requested services that started.
    pub fn boot(&mut self, services: &[String]) -> usize {
        let boot = self.cfg.boot_service.clone();
        if self.cfg.service_dir(&boot).is_dir() {
            if let Err(e) = self.start_service(&boot) {
                tracing::warn!(service = %boot, error = %e, "boot service failed");
            }
        }

        let mut started = 0;
        for name in services {
            match self.start_service(name) {
                Ok(_) => started += 1,
                Err(e) => tracing::warn!(service = %name, error = %e, "cannot start service"),
            }
        }

        if started == 0 {
            let default = self.cfg.default_service.clone();
            if let Err(e) = self.start_service(&default) {
                tracing::warn!(service = %default, error = %e, "default service failed");
            }
        }
        started
    }

    /// Loads `name` if needed and starts it unless it is already running.
    pub fn start_service(&mut self, name: &str) -> Result<ServiceId, ServiceError> {
        let id = self.load(name)?;
        let sv = &mut self.registry[id];
        match sv.status {
            Status::SetupFailed(_) => {
                return Err(ServiceError::SetupFailed {
                    name: sv.name.clone(),
                });
            }
            st if st.is_running() => return Ok(id),
            _ => sv.transition(Status::Init, SystemTime::now()),
        }
        self.walk(id, false, None)?;
        Ok(id)
    }

    /// Runs the supervisor until shutdown.
    ///
    /// As pid 1 this returns once no supervised process is left. As a daemon
    /// it returns on `SIGINT`/`SIGTERM`/`SIGQUIT`, leaving services running.
    pub async fn run(self, services: Vec<String>) -> Result<(), RuntimeError> {
        let token = CancellationToken::new();
        if self.init {
            if let Err(e) = nix::sys::reboot::set_cad_enabled(false) {
                tracing::warn!(error = %e, "cannot disable ctrl-alt-del");
            }
        } else {
            self.shutdown_listener(token.clone());
        }
        self.run_until(services, token).await
    }

    /// Runs the supervisor until `token` is cancelled or, as pid 1, until
    /// no supervised process is left.
    pub async fn run_until(
        mut self,
        services: Vec<String>,
        token: CancellationToken,
    ) -> Result<(), RuntimeError> {
        let subs = Arc::new(SubscriberSet::new(std::mem::take(&mut self.subscribers)));
        let listener = self.subscriber_listener(Arc::clone(&subs));
        let mut sigchld = signal(SignalKind::child()).map_err(RuntimeError::Signal)?;
        self.boot(&services);
        let mut control = self.open_control();

        let mut interval = tokio::time::interval(self.cfg.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = [0u8; REQUEST_MAX];
        let mut idle = false;

        loop {
            self.tick();
            if self.exhausted() {
                if !idle {
                    self.bus.publish(Event::new(EventKind::AllExited));
                    idle = true;
                }
                if self.init {
                    break;
                }
            } else {
                idle = false;
            }

            let wake = tokio::select! {
                _ = token.cancelled() => Wake::Shutdown,
                _ = sigchld.recv() => Wake::Child,
                _ = interval.tick() => Wake::Tick,
                res = recv(control.as_mut(), &mut buf) => Wake::Request(res),
            };

            match wake {
                Wake::Shutdown => {
                    self.bus.publish(Event::new(EventKind::ShutdownRequested));
                    break;
                }
                Wake::Child | Wake::Tick => {}
                Wake::Request(Ok(0)) => {}
                Wake::Request(Ok(n)) => {
                    self.reap();
                    let response = self.handle_request(&buf[..n]);
                    if let Some(ch) = control.as_mut() {
                        ch.send(&response.encode());
                    }
                }
                Wake::Request(Err(e)) => {
                    control = None;
                    self.bus.publish(
                        Event::new(EventKind::ControlUnavailable).with_reason(e.to_string()),
                    );
                }
            }
        }

        drop(control);
        drop(self);
        let _ = listener.await;
        if let Ok(set) = Arc::try_unwrap(subs) {
            set.shutdown().await;
        }
        Ok(())
    }

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    fn subscriber_listener(&self, set: Arc<SubscriberSet>) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event listener lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Cancels `token` on the first termination signal.
    fn shutdown_listener(&self, token: CancellationToken) {
        tokio::spawn(async move {
            match shutdown::wait_for_shutdown_signal().await {
                Ok(()) => token.cancel(),
                Err(e) => tracing::error!(error = %e, "cannot install shutdown signal handlers"),
            }
        });
    }

    /// Opens the control FIFOs. Failure disables the protocol; pid 1 first
    /// hands the console to the rescue shell.
    fn open_control(&mut self) -> Option<ControlChannel> {
        match ControlChannel::open(&self.cfg) {
            Ok(ch) => Some(ch),
            Err(e) => {
                if self.init {
                    tracing::error!(error = %e, shell = ?self.cfg.rescue_shell, "starting rescue shell");
                    if let Err(e) = std::process::Command::new(&self.cfg.rescue_shell).status() {
                        tracing::error!(error = %e, "rescue shell failed");
                    }
                }
                self.bus
                    .publish(Event::new(EventKind::ControlUnavailable).with_reason(e.to_string()));
                None
            }
        }
    }

    /// View of the service's declaration directory.
    pub(crate) fn dir(&self, id: ServiceId) -> ServiceDir {
        ServiceDir::new(self.cfg.service_dir(&self.registry[id].name))
    }

    /// Builds an event about one service.
    pub(crate) fn event(&self, kind: EventKind, id: ServiceId) -> Event {
        Event::new(kind).with_service(self.registry[id].name.as_str())
    }
}

/// Reads one request, or never completes when the protocol is disabled.
async fn recv(control: Option<&mut ControlChannel>, buf: &mut [u8]) -> io::Result<usize> {
    match control {
        Some(ch) => ch.recv(buf).await,
        None => std::future::pending().await,
    }
}

/// Sets `key` in `env`, replacing an existing value.
pub(crate) fn set_var(env: &mut Vec<(OsString, OsString)>, key: OsString, value: OsString) {
    match env.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => env.push((key, value)),
    }
}
