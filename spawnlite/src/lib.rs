//! spawnlite - supervisor for a worker-spawning helper process.
//!
//! The crate keeps exactly one long-lived helper process alive and asks it,
//! over a private socketpair channel, to create worker processes on demand.
//! Each successful request hands the caller a [`WorkerHandle`]: the worker's
//! pid plus the listening socket descriptor the worker serves on. When the
//! helper dies, the next request rebuilds it transparently; a request that
//! fails mid-exchange is reported once and never retried internally.
//!
//! Unix only: descriptor handover relies on `SCM_RIGHTS` ancillary data over
//! `AF_UNIX` sockets, and helper creation on `fork`/`exec`.

#[cfg(not(unix))]
compile_error!("spawnlite requires a Unix platform (SCM_RIGHTS descriptor passing)");

pub mod channel;
pub mod handle;
pub mod options;
pub mod supervisor;
pub mod util;

pub use channel::MessageChannel;
pub use handle::WorkerHandle;
pub use options::SupervisorOptions;
pub use spawnlite_shared::{SpawnliteError, SpawnliteResult};
pub use supervisor::Supervisor;
