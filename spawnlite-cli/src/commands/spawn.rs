//! `spawnlite spawn` - spawn workers and report their identities.

use std::os::fd::AsRawFd;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use spawnlite::{Supervisor, SupervisorOptions, WorkerHandle};

#[derive(Args)]
pub struct SpawnArgs {
    /// Application root to spawn workers for.
    root: String,

    /// Helper program run under the interpreter.
    #[arg(long, env = "SPAWNLITE_HELPER")]
    helper: PathBuf,

    /// Interpreter for the helper (defaults to python3).
    #[arg(long)]
    interpreter: Option<PathBuf>,

    /// Append helper output to this log file instead of inheriting stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Runtime environment name exported to workers via APP_ENV.
    #[arg(long, env = "SPAWNLITE_RUNTIME_ENV")]
    runtime_env: Option<String>,

    /// User to run workers as (empty means the helper's default).
    #[arg(long, default_value = "")]
    user: String,

    /// Group to run workers as (empty means the helper's default).
    #[arg(long, default_value = "")]
    group: String,

    /// Number of workers to spawn.
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Emit JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct SpawnedWorker {
    root: String,
    pid: u32,
    listen_fd: i32,
}

impl From<&WorkerHandle> for SpawnedWorker {
    fn from(handle: &WorkerHandle) -> Self {
        Self {
            root: handle.root_path().to_string(),
            pid: handle.pid(),
            listen_fd: handle.listen_fd().as_raw_fd(),
        }
    }
}

pub fn run(args: SpawnArgs) -> Result<()> {
    let mut options = SupervisorOptions::new(&args.helper);
    if let Some(interpreter) = args.interpreter {
        options.interpreter = interpreter;
    }
    options.log_file = args.log_file;
    options.runtime_env = args.runtime_env;

    let supervisor = Supervisor::new(options).context("cannot start the helper process")?;
    tracing::debug!(helper_pid = ?supervisor.helper_pid(), "helper is up");

    // Handles stay alive until after printing so the reported descriptor
    // numbers refer to open sockets.
    let mut handles = Vec::with_capacity(args.count as usize);
    for _ in 0..args.count {
        let handle = supervisor
            .spawn(&args.root, &args.user, &args.group)
            .context("spawn request failed")?;
        handles.push(handle);
    }

    if args.json {
        let workers: Vec<SpawnedWorker> = handles.iter().map(SpawnedWorker::from).collect();
        println!("{}", serde_json::to_string_pretty(&workers)?);
    } else {
        for handle in &handles {
            println!(
                "worker pid {} for {} (listening on fd {})",
                handle.pid(),
                handle.root_path(),
                handle.listen_fd().as_raw_fd()
            );
        }
    }

    supervisor.shutdown();
    Ok(())
}
