//! `dirvisor` entry point: pid 1 or daemon, same binary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use dirvisor::{Config, DEFAULT_ROOT, LogWriter, RuntimeError, Subscribe, Supervisor};

/// Directory-driven process supervisor.
#[derive(Parser, Debug)]
#[command(name = "dirvisor", version, about)]
struct Args {
    /// Supervision root holding the service directories and the control FIFOs.
    #[arg(long, env = "DIRVISOR_ROOT", default_value = DEFAULT_ROOT)]
    root: PathBuf,

    /// Seconds between maintenance passes (reaping, liveness, clock check).
    #[arg(long, env = "DIRVISOR_POLL_INTERVAL", default_value_t = 5, value_name = "SECS")]
    poll_interval: u64,

    /// Length of the start history.
    #[arg(long, env = "DIRVISOR_HISTORY", default_value_t = 15)]
    history: usize,

    /// Skip this dependency the first time a walk meets it. Repeatable.
    #[arg(long = "exclude", value_name = "SERVICE")]
    exclude: Vec<String>,

    /// Services to start after the boot service; `default` when none starts.
    services: Vec<String>,
}

impl Args {
    fn config(&self) -> Config {
        let mut cfg = Config::with_root(&self.root);
        cfg.poll_interval = Duration::from_secs(self.poll_interval.max(1));
        cfg.history = self.history;
        cfg
    }
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<(), RuntimeError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(RuntimeError::Runtime)?;

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let mut sup = Supervisor::new(args.config(), subs);
    sup.exclude(args.exclude);

    tracing::info!(root = ?args.root, init = sup.is_init(), "dirvisor starting");
    rt.block_on(sup.run(args.services))
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, label = e.as_label(), "dirvisor stopped");
            ExitCode::FAILURE
        }
    }
}
