//! Process-level utilities for the supervisor.

mod process;

pub use process::is_process_alive;
pub(crate) use process::close_inherited_fds;
