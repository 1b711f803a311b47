//! Shared constants between the supervisor and helper processes.
//!
//! These must be identical on both sides of the supervisor/helper boundary.

/// Message tags understood by the helper.
pub mod tags {
    /// Ask the helper to create one worker process.
    pub const SPAWN_APPLICATION: &str = "spawn_application";
}

/// Environment variables communicated to the helper.
pub mod envs {
    /// Runtime environment name exported to spawned applications.
    pub const APP_ENV: &str = "APP_ENV";
}

/// Helper invocation defaults.
pub mod helper {
    /// Interpreter used when none is configured.
    pub const DEFAULT_INTERPRETER: &str = "python3";

    /// Exit status of the forked child when process-image replacement fails.
    pub const EXEC_FAILURE_STATUS: i32 = 127;
}
