mod language;
mod monitor;
mod supervisor;
mod workspace;

pub use language::{LanguageProfile, supported_languages};
pub use workspace::{ExecutionDir, Workspace};

use std::io;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::SandboxConfig;

/// Timeout applied when a request does not specify one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Hard ceiling on the per-request timeout.
pub const MAX_TIMEOUT_SECS: u64 = 120;

/// One code-execution request, as handed over by the HTTP layer.
///
/// The language is matched case-insensitively against the supported set and
/// the timeout is clamped before anything runs; the request itself is never
/// mutated.
#[derive(Debug)]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
    pub timeout_secs: Option<u64>,
}

/// Final outcome of one execution.
///
/// `output` is stdout with stderr appended after a blank-line separator when
/// both are non-empty. A timed-out run is a normal outcome, reported with
/// `exit_code = -1` and a timeout notice in the output, not an error.
#[derive(Debug)]
pub struct ExecutionResult {
    pub output: String,
    pub exit_code: i32,
    pub timed_out: bool,
    /// Wall-clock time spent in the execution phase.
    pub execution_time: Duration,
}

/// Failures of the sandbox itself, as opposed to failures of the executed
/// snippet. A non-zero exit code is a normal result; these are not.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Unsupported language: {language}. Supported languages: {supported}")]
    UnsupportedLanguage { language: String, supported: String },

    #[error("failed to prepare execution directory: {source}")]
    Workspace { source: io::Error },

    #[error("failed to write source file: {source}")]
    WriteSource { source: io::Error },

    #[error("failed to launch {program}: {source}")]
    Launch { program: String, source: io::Error },

    #[error("failed to supervise child process: {source}")]
    Supervise { source: io::Error },
}

impl ExecuteError {
    /// Whether the failure is the caller's fault (bad input) rather than an
    /// environment or launch fault of the service.
    pub fn is_caller_fault(&self) -> bool {
        matches!(self, ExecuteError::UnsupportedLanguage { .. })
    }
}

/// The sandbox: one instance serves the whole process, each call to
/// [`Sandbox::execute`] is an independent, self-contained unit of work.
pub struct Sandbox {
    workspace: Workspace,
    default_timeout_secs: u64,
    max_timeout_secs: u64,
}

impl Sandbox {
    pub fn new(config: &SandboxConfig) -> Result<Self, ExecuteError> {
        let workspace = Workspace::new(config.root_dir.as_deref())?;

        Ok(Self {
            workspace,
            default_timeout_secs: config.default_timeout,
            max_timeout_secs: config.max_timeout,
        })
    }

    /// Runs one snippet to completion: allocate directory, write source,
    /// supervise the process, combine output, clean up.
    ///
    /// The execution directory is removed on every path out of this
    /// function, including launch failures; cleanup happens before an error
    /// is propagated and its own failures are only logged.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, ExecuteError> {
        let profile = LanguageProfile::find(&request.language).ok_or_else(|| {
            ExecuteError::UnsupportedLanguage {
                language: request.language.clone(),
                supported: supported_languages().join(", "),
            }
        })?;

        let requested = request.timeout_secs.unwrap_or(self.default_timeout_secs);
        let timeout_secs = effective_timeout(requested, self.max_timeout_secs);
        if timeout_secs != requested {
            log::info!("adjusted timeout: {requested} -> {timeout_secs}");
        }

        let setup_started = Instant::now();
        let dir = self.workspace.allocate()?;
        let exec_id = dir.id();
        log::info!(
            "starting execution {exec_id} [language={}, timeout={timeout_secs}s]",
            profile.name
        );

        let source_path = dir.write_source(&profile.source_file_name(), &request.code)?;
        let command = profile.command(&source_path);
        log::debug!("execution {exec_id}: command: {}", command.join(" "));
        let setup_time = setup_started.elapsed();

        let run_started = Instant::now();
        let outcome = supervisor::run(exec_id, &command, dir.path(), timeout_secs).await;
        let execution_time = run_started.elapsed();

        let cleanup_started = Instant::now();
        drop(dir);
        let cleanup_time = cleanup_started.elapsed();

        log::debug!(
            "execution {exec_id}: phases: setup={}ms, execution={}ms, cleanup={}ms",
            setup_time.as_millis(),
            execution_time.as_millis(),
            cleanup_time.as_millis()
        );

        // Propagated only after the directory is gone.
        let outcome = outcome?;
        let output = combine_output(&outcome.stdout, &outcome.stderr, outcome.exit_code);

        log::info!(
            "execution {exec_id} finished [exit_code={}, timed_out={}, output={} chars]",
            outcome.exit_code,
            outcome.timed_out,
            output.len()
        );

        Ok(ExecutionResult {
            output,
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            execution_time,
        })
    }
}

/// Clamps a requested timeout into `[1, max]`.
fn effective_timeout(requested: u64, max: u64) -> u64 {
    requested.clamp(1, max.max(1))
}

/// Combines the two output channels into the single reported string.
fn combine_output(stdout: &str, stderr: &str, exit_code: i32) -> String {
    let mut output = stdout.to_string();

    if !stderr.is_empty() {
        if !output.is_empty() {
            output.push_str("\n\n");
        }
        output.push_str(stderr);
    }

    if output.is_empty() && exit_code != 0 {
        output = format!("Process exited with code {exit_code}");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn timeout_is_clamped_into_valid_range() {
        assert_eq!(effective_timeout(0, MAX_TIMEOUT_SECS), 1);
        assert_eq!(effective_timeout(30, MAX_TIMEOUT_SECS), 30);
        assert_eq!(effective_timeout(999, MAX_TIMEOUT_SECS), MAX_TIMEOUT_SECS);
    }

    #[test]
    fn both_channels_are_joined_with_a_separator() {
        assert_eq!(combine_output("out\n", "err\n", 0), "out\n\n\nerr\n");
    }

    #[test]
    fn stderr_alone_is_the_whole_output() {
        assert_eq!(combine_output("", "err only\n", 1), "err only\n");
    }

    #[test]
    fn silent_nonzero_exit_gets_a_synthetic_message() {
        assert_eq!(combine_output("", "", 3), "Process exited with code 3");
    }

    #[test]
    fn silent_zero_exit_stays_empty() {
        assert_eq!(combine_output("", "", 0), "");
    }
}
