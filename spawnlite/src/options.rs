//! Configuration for the worker spawn supervisor.

use serde::{Deserialize, Serialize};
use spawnlite_shared::constants::helper;
use spawnlite_shared::errors::{SpawnliteError, SpawnliteResult};
use std::path::PathBuf;

/// Configuration options for [`Supervisor`](crate::Supervisor).
///
/// Captured once at construction; the supervisor never mutates them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SupervisorOptions {
    /// Helper program handed to the interpreter.
    pub helper_command: PathBuf,

    /// Append-mode log file receiving the helper's standard output and
    /// standard error. `None` means the helper inherits the current
    /// process's error stream.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Value of the `APP_ENV` variable in the helper's environment,
    /// naming the runtime environment workers should come up in.
    /// `None` inherits the ambient setting.
    #[serde(default)]
    pub runtime_env: Option<String>,

    /// Interpreter that runs the helper, resolved on `PATH`.
    #[serde(default = "default_interpreter")]
    pub interpreter: PathBuf,
}

fn default_interpreter() -> PathBuf {
    PathBuf::from(helper::DEFAULT_INTERPRETER)
}

impl SupervisorOptions {
    /// Options for the given helper program, everything else defaulted.
    pub fn new(helper_command: impl Into<PathBuf>) -> Self {
        Self {
            helper_command: helper_command.into(),
            log_file: None,
            runtime_env: None,
            interpreter: default_interpreter(),
        }
    }

    /// Validate the options.
    pub fn sanitize(&self) -> SpawnliteResult<()> {
        if self.helper_command.as_os_str().is_empty() {
            return Err(SpawnliteError::Config(
                "helper_command must not be empty".to_string(),
            ));
        }
        if self.interpreter.as_os_str().is_empty() {
            return Err(SpawnliteError::Config(
                "interpreter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_interpreter_and_inherits_streams() {
        let opts = SupervisorOptions::new("/usr/local/lib/app/spawn_helper.py");
        assert_eq!(
            opts.interpreter,
            PathBuf::from(helper::DEFAULT_INTERPRETER)
        );
        assert!(opts.log_file.is_none());
        assert!(opts.runtime_env.is_none());
        assert!(opts.sanitize().is_ok());
    }

    #[test]
    fn empty_helper_command_is_rejected() {
        let opts = SupervisorOptions::new("");
        let err = opts.sanitize().unwrap_err();
        assert!(matches!(err, SpawnliteError::Config(_)));
    }

    #[test]
    fn empty_interpreter_is_rejected() {
        let mut opts = SupervisorOptions::new("/srv/helper.py");
        opts.interpreter = PathBuf::new();
        assert!(opts.sanitize().is_err());
    }

    #[test]
    fn serde_fills_missing_fields_with_defaults() {
        // Only helper_command is required on the wire
        let json = r#"{"helper_command": "/srv/helper.py"}"#;
        let opts: SupervisorOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.helper_command, PathBuf::from("/srv/helper.py"));
        assert_eq!(
            opts.interpreter,
            PathBuf::from(helper::DEFAULT_INTERPRETER)
        );
        assert!(opts.log_file.is_none());
    }

    #[test]
    fn serde_round_trip() {
        let mut opts = SupervisorOptions::new("/srv/helper.py");
        opts.log_file = Some(PathBuf::from("/var/log/spawnlite.log"));
        opts.runtime_env = Some("production".to_string());

        let json = serde_json::to_string(&opts).unwrap();
        let opts2: SupervisorOptions = serde_json::from_str(&json).unwrap();

        assert_eq!(opts.helper_command, opts2.helper_command);
        assert_eq!(opts.log_file, opts2.log_file);
        assert_eq!(opts.runtime_env, opts2.runtime_env);
        assert_eq!(opts.interpreter, opts2.interpreter);
    }
}
