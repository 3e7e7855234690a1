//! Request/response interface to an R session.
//!
//! [`RSession`] is the only way the setup steps talk to R. Each operation is
//! one explicit request; provided methods build the R source from escaped
//! literals (see [`crate::rcode`]) and run it through [`RSession::eval`].
//! [`RProcess`] implements `eval` on top of a long-lived `R` child process.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use log::{debug, info, warn};

use crate::error::{SetupError, SetupResult};
use crate::rcode::{r_path, r_string, StrVector};

/// A live R session.
pub trait RSession {
    /// Evaluate `code` in R's global environment and return what it printed
    /// to stdout, one entry per line. An R error becomes
    /// [`SetupError::RSession`].
    fn eval(&mut self, code: &str) -> SetupResult<Vec<String>>;

    /// Names of every package in the current library paths.
    fn installed_packages(&mut self) -> SetupResult<Vec<String>> {
        self.eval("writeLines(rownames(installed.packages()))")
    }

    /// Namespaces currently loaded in the session.
    fn loaded_namespaces(&mut self) -> SetupResult<Vec<String>> {
        self.eval("writeLines(loadedNamespaces())")
    }

    /// Current value of `getOption("warn")`.
    fn warn_level(&mut self) -> SetupResult<i32> {
        let lines = self.eval("cat(getOption(\"warn\", 0L), \"\\n\", sep = \"\")")?;
        let first = lines.first().map(|l| l.trim()).unwrap_or("0");
        first
            .parse::<f64>()
            .map(|v| v as i32)
            .map_err(|_| SetupError::RSession(format!("unexpected warn option: {first}")))
    }

    fn set_warn_level(&mut self, level: i32) -> SetupResult<()> {
        self.eval(&format!("options(warn = {level})")).map(drop)
    }

    /// Replace the user library paths (`.libPaths(...)`).
    fn set_lib_paths(&mut self, paths: &[PathBuf]) -> SetupResult<()> {
        let literals: Vec<String> = paths.iter().map(|p| r_path(p)).collect();
        self.eval(&format!("invisible(.libPaths(c({})))", literals.join(", ")))
            .map(drop)
    }

    /// Append `entry` to R's own `PATH` (`Sys.setenv`).
    ///
    /// R's dynamic loader consults this copy, not the host's.
    fn append_path_entry(&mut self, entry: &str, separator: char) -> SetupResult<()> {
        let code = format!(
            "invisible(Sys.setenv(PATH = paste(Sys.getenv(\"PATH\"), {}, sep = {})))",
            r_string(entry),
            r_string(&separator.to_string())
        );
        self.eval(&code).map(drop)
    }

    /// `install.packages(name, lib = lib, repos = repo)`, output suppressed.
    fn install_package(&mut self, name: &str, lib: &Path, repo: &str) -> SetupResult<()> {
        let code = format!(
            "invisible(suppressMessages(capture.output(install.packages({}, lib = {}, repos = {}))))",
            r_string(name),
            r_path(lib),
            r_string(repo)
        );
        self.eval(&code).map(drop)
    }

    /// Attach every package in `names` quietly.
    fn load_packages(&mut self, names: &[String]) -> SetupResult<()> {
        let code = format!(
            "invisible(suppressPackageStartupMessages(lapply({}, function(pkg) \
             library(pkg, character.only = TRUE, quietly = TRUE))))",
            StrVector::from_slice(names)
        );
        self.eval(&code).map(drop)
    }
}

/// Starts R sessions with a given set of environment variables.
pub trait RLauncher {
    type Session: RSession;

    fn launch(&self, envs: &[(String, String)]) -> SetupResult<Self::Session>;
}

/// Launches [`RProcess`] sessions from an R executable.
#[derive(Debug, Clone)]
pub struct RProcessLauncher {
    pub program: String,
}

impl RProcessLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl RLauncher for RProcessLauncher {
    type Session = RProcess;

    fn launch(&self, envs: &[(String, String)]) -> SetupResult<RProcess> {
        RProcess::spawn(&self.program, envs)
    }
}

const ERROR_MARKER: &str = "<<rbridge-error>>";
const DONE_MARKER: &str = "<<rbridge-done>>";

/// An `R` child process driven over stdin/stdout.
///
/// Every request is wrapped in `tryCatch` and followed by a sentinel line,
/// so one request maps to one response. R's stderr is inherited.
pub struct RProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    requests: u64,
}

impl RProcess {
    /// Start `program` as a non-interactive R session.
    pub fn spawn(program: &str, envs: &[(String, String)]) -> SetupResult<Self> {
        info!("[r-env] Starting R session ({program})");
        let mut child = Command::new(program)
            .args(["--no-save", "--no-restore", "--slave"])
            .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SetupError::ProgramNotFound(program.to_string()),
                _ => SetupError::Io(e),
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SetupError::RSession("R stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| SetupError::RSession("R stdout unavailable".to_string()))?;

        Ok(Self {
            child,
            stdin,
            stdout,
            requests: 0,
        })
    }
}

impl RSession for RProcess {
    fn eval(&mut self, code: &str) -> SetupResult<Vec<String>> {
        self.requests += 1;
        debug!("[r-env] R request #{}: {}", self.requests, code.trim());
        self.stdin
            .write_all(frame_request(code, self.requests).as_bytes())?;
        self.stdin.flush()?;
        read_response(&mut self.stdout, self.requests)
    }
}

/// Wrap `code` so R reports errors on stdout and ends the reply with the
/// done marker for request `id`.
fn frame_request(code: &str, id: u64) -> String {
    format!(
        "invisible(tryCatch({{\n{code}\n}}, error = function(e) \
         cat(\"{ERROR_MARKER}\", gsub(\"\\n\", \" \", conditionMessage(e)), \"\\n\", sep = \"\")))\n\
         cat(\"\\n{DONE_MARKER}{id}\\n\", sep = \"\"); flush(stdout())\n"
    )
}

/// Read one reply from R, up to and including the done marker for `id`.
fn read_response(reader: &mut impl BufRead, id: u64) -> SetupResult<Vec<String>> {
    let done = format!("{DONE_MARKER}{id}");
    let mut lines = Vec::new();
    let mut error = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(SetupError::RSession(
                "R exited before answering the request".to_string(),
            ));
        }
        let line = line.trim_end_matches(['\n', '\r']);
        if line == done {
            break;
        }
        match line.strip_prefix(ERROR_MARKER) {
            Some(message) => error = Some(message.to_string()),
            None => lines.push(line.to_string()),
        }
    }

    // The sentinel is preceded by a newline so partial output lines
    // are terminated; drop that padding.
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    match error {
        Some(message) => Err(SetupError::RSession(message)),
        None => Ok(lines),
    }
}

impl Drop for RProcess {
    fn drop(&mut self) {
        let _ = self.stdin.write_all(b"q(save = \"no\")\n");
        let _ = self.stdin.flush();
        if let Err(e) = self.child.wait() {
            warn!("[r-env] Failed to wait for R session: {e}");
        }
    }
}
