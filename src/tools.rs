//! External command-line tools (the FLAC tag editor, the media prober, and the converter) are run
//! through a `CommandRunner`. Every invocation forces a UTF-8 locale so tag values survive the trip.
use std::io;
use std::process::Command;
use tracing::trace;

pub const FORCED_LOCALE: &str = "en_US.UTF-8";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Human-readable failure description, preferring the tool's own stderr.
    pub fn failure_reason(&self, program: &str) -> String {
        let status = match self.code {
            Some(c) => format!("exit status {c}"),
            None => "signal termination".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("{program} failed with {status}")
        } else {
            format!("{program} failed with {status}: {stderr}")
        }
    }
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        trace!(program, ?args, "running external tool");
        let output = Command::new(program).args(args).env("LANG", FORCED_LOCALE).env("LC_ALL", FORCED_LOCALE).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
