//! # Tool Invoker
//!
//! Capability for running one external codec process. The engine registry
//! depends only on `ToolInvoker`; `ProcessInvoker` is the real
//! implementation, tests substitute a scripted one.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::utils::display_command;

/// How an external process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Normal exit with a status code
    Code(i32),
    /// Terminated by a signal
    Signaled,
    /// Exceeded the wall-clock limit and was killed
    TimedOut,
}

/// Result of one tool run: exit state plus merged stdout/stderr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit: ExitState,
    pub output: String,
}

impl ToolOutput {
    pub fn new(exit: ExitState, output: impl Into<String>) -> Self {
        Self {
            exit,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit == ExitState::Code(0)
    }

    pub fn code(&self) -> Option<i32> {
        match self.exit {
            ExitState::Code(code) => Some(code),
            _ => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.exit == ExitState::TimedOut
    }

    /// Short description used in failure messages
    pub fn describe(&self) -> String {
        let head = match self.exit {
            ExitState::Code(code) => format!("exit code {}", code),
            ExitState::Signaled => "terminated by signal".to_string(),
            ExitState::TimedOut => "timed out".to_string(),
        };
        let first_line = self.output.lines().map(str::trim).find(|line| !line.is_empty());
        match first_line {
            Some(line) => format!("{}: {}", head, line),
            None => head,
        }
    }
}

/// Runs an external program with a timeout
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Spawn `program` with `args` and wait at most `timeout`.
    ///
    /// `Err` only when the process could not be started at all.
    async fn run(&self, program: &Path, args: &[String], timeout: Duration) -> std::io::Result<ToolOutput>;
}

/// `ToolInvoker` backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

#[async_trait]
impl ToolInvoker for ProcessInvoker {
    async fn run(&self, program: &Path, args: &[String], timeout: Duration) -> std::io::Result<ToolOutput> {
        debug!("Running: {}", display_command(program, args));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the pending future drops the child, which kills it
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "{} exceeded {}s, process killed",
                    program.display(),
                    timeout.as_secs()
                );
                return Ok(ToolOutput::new(ExitState::TimedOut, String::new()));
            }
        };

        let mut merged = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !merged.is_empty() && !merged.ends_with('\n') {
                merged.push('\n');
            }
            merged.push_str(&stderr);
        }

        let exit = match output.status.code() {
            Some(code) => ExitState::Code(code),
            None => ExitState::Signaled,
        };

        debug!("{} finished with {:?}", program.display(), exit);
        Ok(ToolOutput::new(exit, merged))
    }
}
