//! Child process plumbing for package-manager commands.
//!
//! Installers go through the [`CommandRunner`] trait so the orchestration in
//! [`crate::install`] and [`crate::packages`] can be exercised without
//! touching conda or apt.

use std::fmt;
use std::io::ErrorKind;
use std::process::{Command, Stdio};

use log::debug;

use crate::error::{SetupError, SetupResult};

/// A command line plus the extra variables it runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    pub fn with_envs(mut self, envs: Vec<(String, String)>) -> Self {
        self.envs = envs;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn status_label(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "a signal".to_string(),
        }
    }
}

/// Runs commands to completion, blocking the caller.
pub trait CommandRunner {
    /// Run `spec` and capture its output. A program that cannot be found
    /// is [`SetupError::ProgramNotFound`]; a non-zero exit is not an error here.
    fn run(&self, spec: &CommandSpec) -> SetupResult<CommandOutput>;
}

/// Run `spec` and turn a non-zero exit into [`SetupError::CommandFailed`].
pub fn run_checked(runner: &impl CommandRunner, spec: &CommandSpec) -> SetupResult<CommandOutput> {
    let output = runner.run(spec)?;
    if !output.success() {
        return Err(SetupError::CommandFailed {
            command: spec.to_string(),
            status: output.status_label(),
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> SetupResult<CommandOutput> {
        debug!("[r-env] Running: {spec}");
        let output = Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SetupError::ProgramNotFound(spec.program.clone()),
                _ => SetupError::Io(e),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
