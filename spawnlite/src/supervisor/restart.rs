//! Helper restart: tear down a dead helper and fork/exec a fresh one.
//!
//! The child branch between `fork` and `exec` touches only raw descriptors
//! and pre-allocated strings; everything it needs is prepared on the parent
//! side in [`ExecPlan::prepare`].

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;

use nix::errno::Errno;
use nix::sys::socket::{AddressFamily, SockFlag, SockType, socketpair};
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, execvp, fork};

use crate::channel::MessageChannel;
use crate::options::SupervisorOptions;
use crate::util::close_inherited_fds;
use spawnlite_shared::constants::{envs, helper};
use spawnlite_shared::errors::{SpawnliteError, SpawnliteResult};

use super::HelperState;

/// Discard whatever helper is tracked and start a fresh one.
///
/// Called with the supervisor lock held. On success the state holds the new
/// pid and a channel bound to it, with `needs_restart` cleared; on failure
/// the state is consistent (`pid` empty iff `channel` unbound) and
/// `needs_restart` stays set so the next request retries.
pub(super) fn restart_helper(
    options: &SupervisorOptions,
    state: &mut HelperState,
) -> SpawnliteResult<()> {
    if let Some(pid) = state.pid.take() {
        state.channel = None;
        tracing::debug!(pid = pid.as_raw(), "reaping the previous helper");
        // Unbounded by design; bounding it would change observable timing
        let _ = waitpid(pid, None);
    }

    state.needs_restart = true;

    let (parent_end, child_end) = socketpair(
        AddressFamily::Unix,
        SockType::Stream,
        None,
        SockFlag::empty(),
    )
    .map_err(|e| SpawnliteError::Setup(format!("cannot create a Unix socket pair: {e}")))?;

    // Opened before the fork so a bad path is observable in the parent
    let log_file: Option<File> = match &options.log_file {
        Some(path) => Some(
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .map_err(|e| {
                    SpawnliteError::Io(format!(
                        "cannot open log file '{}' for writing: {e}",
                        path.display()
                    ))
                })?,
        ),
        None => None,
    };

    let plan = ExecPlan::prepare(options)?;

    match unsafe { fork() } {
        Ok(ForkResult::Child) => plan.run_child(
            log_file.as_ref().map(|f| f.as_raw_fd()),
            parent_end.as_raw_fd(),
            child_end.as_raw_fd(),
        ),
        Err(e) => {
            // parent_end, child_end and log_file close on drop
            Err(SpawnliteError::Setup(format!(
                "unable to fork a helper process: {e}"
            )))
        }
        Ok(ForkResult::Parent { child }) => {
            drop(child_end);
            drop(log_file);
            state.pid = Some(child);
            state.channel = Some(MessageChannel::from_fd(parent_end));
            state.needs_restart = false;
            tracing::info!(
                pid = child.as_raw(),
                helper = %options.helper_command.display(),
                "helper process started"
            );
            Ok(())
        }
    }
}

/// Everything the child branch needs, allocated before the fork.
struct ExecPlan {
    /// `[interpreter, helper_command]`
    argv: Vec<CString>,
    env_name: Option<CString>,
    env_value: Option<CString>,
    error_prefix: Vec<u8>,
}

impl ExecPlan {
    fn prepare(options: &SupervisorOptions) -> SpawnliteResult<Self> {
        let interpreter = CString::new(options.interpreter.as_os_str().as_bytes())
            .map_err(|_| SpawnliteError::Config("interpreter contains a NUL byte".into()))?;
        let command = CString::new(options.helper_command.as_os_str().as_bytes())
            .map_err(|_| SpawnliteError::Config("helper_command contains a NUL byte".into()))?;

        let (env_name, env_value) = match &options.runtime_env {
            Some(value) => (
                Some(CString::new(envs::APP_ENV).expect("constant has no NUL")),
                Some(CString::new(value.as_str()).map_err(|_| {
                    SpawnliteError::Config("runtime_env contains a NUL byte".into())
                })?),
            ),
            None => (None, None),
        };

        let error_prefix = format!(
            "spawnlite: unable to run {}: ",
            options.interpreter.display()
        )
        .into_bytes();

        Ok(Self {
            argv: vec![interpreter, command],
            env_name,
            env_value,
            error_prefix,
        })
    }

    /// Child branch: rewire descriptors, scrub the descriptor table, replace
    /// the process image. Never returns; if exec fails the only signal that
    /// can cross the process boundary is text on stderr plus the exit
    /// status, observed by the parent as a later transport error.
    fn run_child(&self, log_fd: Option<RawFd>, parent_fd: RawFd, child_fd: RawFd) -> ! {
        unsafe {
            if let Some(log_fd) = log_fd {
                libc::dup2(log_fd, libc::STDERR_FILENO);
                libc::close(log_fd);
            }
            libc::dup2(libc::STDERR_FILENO, libc::STDOUT_FILENO);

            if let (Some(name), Some(value)) = (&self.env_name, &self.env_value) {
                libc::setenv(name.as_ptr(), value.as_ptr(), 1);
            }

            libc::dup2(child_fd, libc::STDIN_FILENO);
            libc::close(parent_fd);
            libc::close(child_fd);
        }
        close_inherited_fds();

        let _ = execvp(self.argv[0].as_c_str(), &self.argv);

        let errno = Errno::last();
        unsafe {
            libc::write(
                libc::STDERR_FILENO,
                self.error_prefix.as_ptr().cast(),
                self.error_prefix.len(),
            );
            let desc = errno.desc().as_bytes();
            libc::write(libc::STDERR_FILENO, desc.as_ptr().cast(), desc.len());
            libc::write(libc::STDERR_FILENO, b"\n".as_ptr().cast(), 1);
            libc::_exit(helper::EXEC_FAILURE_STATUS);
        }
    }
}
