//! External command execution behind a small runner abstraction.
//!
//! Both the provider CLI adapter and the asset handlers shell out to host
//! programs. Routing every invocation through [`CommandRunner`] keeps those
//! callers testable with scripted fakes.

use std::ffi::OsString;
use std::process::Command;

use serde::Deserialize;
use shell_escape::unix::escape;
use thiserror::Error;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Renders the exit status for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Errors raised while running a command.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommandError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the blocking task running the command was lost.
    #[error("command task for {program} did not complete: {message}")]
    Join {
        /// Command that was running.
        program: String,
        /// Runtime error string.
        message: String,
    },
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| CommandError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs a command on the blocking pool so the scheduler keeps making
/// progress while the process is alive.
///
/// # Errors
///
/// Returns [`CommandError`] when the command cannot be spawned or the
/// blocking task is cancelled.
pub async fn run_blocking<R>(
    runner: &R,
    program: &str,
    args: Vec<OsString>,
) -> Result<CommandOutput, CommandError>
where
    R: CommandRunner + Clone + Send + 'static,
{
    let task_runner = runner.clone();
    let task_program = program.to_owned();
    tokio::task::spawn_blocking(move || task_runner.run(&task_program, &args))
        .await
        .map_err(|err| CommandError::Join {
            program: program.to_owned(),
            message: err.to_string(),
        })?
}

/// A program plus arguments declared in a manifest.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments passed verbatim to the program.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Creates a command specification.
    #[must_use]
    pub fn new<I, A>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Arguments converted for [`CommandRunner::run`].
    #[must_use]
    pub fn os_args(&self) -> Vec<OsString> {
        self.args.iter().map(OsString::from).collect()
    }

    /// Shell-like rendering used in logs and error messages.
    #[must_use]
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(escape(self.program.as_str().into()).into_owned());
        parts.extend(
            self.args
                .iter()
                .map(|arg| escape(arg.as_str().into()).into_owned()),
        );
        parts.join(" ")
    }
}
