//! Spawn coordinator: the public entry point for creating workers.
//!
//! One [`Supervisor`] owns one helper process and the channel to it. All
//! spawn requests are serialized behind a single lock because the channel
//! protocol allows exactly one outstanding exchange; restart of a dead
//! helper happens lazily, at the start of the next request that needs it.

mod restart;

use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use parking_lot::Mutex;

use crate::channel::MessageChannel;
use crate::handle::WorkerHandle;
use crate::options::SupervisorOptions;
use spawnlite_shared::constants::tags;
use spawnlite_shared::errors::{SpawnliteError, SpawnliteResult};

/// Mutable helper state, guarded by the supervisor's lock.
///
/// Invariant: `pid` and `channel` are set and cleared together.
/// `needs_restart` may be true while both are still set, meaning the channel
/// is condemned and the old process must be reaped before a new one starts.
#[derive(Debug)]
struct HelperState {
    pid: Option<Pid>,
    channel: Option<MessageChannel>,
    needs_restart: bool,
}

/// Supervisor for the worker-spawning helper process.
///
/// Construct one per server with [`Supervisor::new`]; it starts the helper
/// eagerly and keeps it alive across requests. [`Supervisor::spawn`] asks
/// the helper for one new worker and hands back a [`WorkerHandle`]. The
/// supervisor is fully thread-safe; concurrent calls are serialized.
#[derive(Debug)]
pub struct Supervisor {
    options: SupervisorOptions,
    state: Mutex<HelperState>,
}

impl Supervisor {
    /// Construct the supervisor and start the first helper.
    ///
    /// # Errors
    /// * `Config` - invalid options
    /// * `Setup` - socketpair or fork failure
    /// * `Io` - the configured log file cannot be opened
    pub fn new(options: SupervisorOptions) -> SpawnliteResult<Self> {
        options.sanitize()?;
        let supervisor = Self {
            options,
            state: Mutex::new(HelperState {
                pid: None,
                channel: None,
                needs_restart: true,
            }),
        };
        {
            let mut state = supervisor.state.lock();
            restart::restart_helper(&supervisor.options, &mut state)?;
        }
        Ok(supervisor)
    }

    /// Ask the helper to create one worker for `root_path`.
    ///
    /// Empty `user`/`group` mean "helper default identity" and are passed
    /// through verbatim; `root_path` is not validated here either, since a
    /// bad root is the helper's call to make.
    ///
    /// A helper that died since the last request is rebuilt before the
    /// exchange. A failure *during* the exchange is reported once and not
    /// retried; it condemns the channel so the next call rebuilds the
    /// helper.
    ///
    /// # Errors
    /// * `Restart` - the helper needed a rebuild and the rebuild failed;
    ///   wraps the causing `Setup`/`Io` error
    /// * `Transport` - the exchange itself failed
    pub fn spawn(&self, root_path: &str, user: &str, group: &str) -> SpawnliteResult<WorkerHandle> {
        let mut state = self.state.lock();

        // A dead peer shows up as readiness on an idle request/response
        // channel, so a helper killed between requests is caught here and
        // rebuilt without the caller ever seeing an error.
        if state.needs_restart || state.channel.as_ref().is_none_or(|c| c.peer_gone()) {
            tracing::debug!("rebuilding the helper before this spawn request");
            restart::restart_helper(&self.options, &mut state).map_err(|e| {
                tracing::warn!(error = %e, "helper restart failed");
                e.into_restart()
            })?;
        }

        match exchange(&state, root_path, user, group) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                state.needs_restart = true;
                tracing::warn!(
                    error = %e,
                    "helper exchange failed; the helper will be rebuilt on the next request"
                );
                Err(e)
            }
        }
    }

    /// Pid of the current helper process, if one is running.
    pub fn helper_pid(&self) -> Option<u32> {
        self.state.lock().pid.map(|pid| pid.as_raw() as u32)
    }

    /// Tear down the helper: close the channel and reap the process.
    ///
    /// A no-op when no helper is running; safe to call repeatedly. The wait
    /// for the helper to exit is blocking and unbounded.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.channel = None;
        if let Some(pid) = state.pid.take() {
            tracing::debug!(pid = pid.as_raw(), "waiting for the helper to exit");
            let _ = waitpid(pid, None);
        }
        state.needs_restart = true;
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One request/response exchange over the current channel.
fn exchange(
    state: &HelperState,
    root_path: &str,
    user: &str,
    group: &str,
) -> SpawnliteResult<WorkerHandle> {
    let channel = state
        .channel
        .as_ref()
        .ok_or_else(|| SpawnliteError::Transport("no helper channel is bound".into()))?;

    channel.send(&[tags::SPAWN_APPLICATION, root_path, user, group])?;

    let fields = channel
        .receive()?
        .ok_or_else(|| SpawnliteError::Transport("the helper exited unexpectedly".into()))?;

    let pid_field = fields.first().ok_or_else(|| {
        SpawnliteError::Transport("the helper response carried no pid field".into())
    })?;
    let pid: u32 = pid_field
        .parse()
        .ok()
        .filter(|pid| *pid != 0)
        .ok_or_else(|| {
            SpawnliteError::Transport(format!(
                "malformed worker pid in the helper response: {pid_field:?}"
            ))
        })?;

    let listen_fd = channel.receive_fd()?;

    tracing::debug!(pid, root = root_path, "worker spawned");
    Ok(WorkerHandle::new(root_path, pid, listen_fd))
}
