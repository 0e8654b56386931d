//! The interestingness oracle.
//!
//! A candidate is judged by an external command: the runner serializes the
//! candidate to a private scratch file, invokes
//! `<command> <args...> <scratch-path>`, and maps the exit status to a
//! verdict. Exit 0 means the candidate still reproduces the property being
//! isolated; any nonzero exit discards it. A command that cannot be launched
//! at all is an error, never a negative verdict — conflating the two would
//! silently "reduce" against a broken oracle.
//!
//! Invocations are strictly sequential: every verdict gates which candidate
//! is built next, so there is nothing to parallelize at this layer.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::artifact::Artifact;

/// Outcome of a successfully executed oracle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Exit 0: the candidate still exhibits the target property.
    Interesting,
    /// Nonzero exit: the candidate lost the property and is discarded.
    NotInteresting,
}

/// Failures of the oracle mechanism itself. All of these abort the run.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("failed to launch oracle command '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("oracle command timed out after {0:?}")]
    Timeout(Duration),

    #[error("scratch I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Anything that can judge a candidate.
///
/// The subprocess-backed [`OracleRunner`] is the production implementation;
/// tests substitute closure-backed oracles to script verdict sequences.
pub trait Oracle<A: Artifact> {
    fn test(&mut self, candidate: &A) -> Result<Verdict, OracleError>;
}

/// Closure adapter, mainly for tests and embedding.
impl<A, F> Oracle<A> for F
where
    A: Artifact,
    F: FnMut(&A) -> Result<Verdict, OracleError>,
{
    fn test(&mut self, candidate: &A) -> Result<Verdict, OracleError> {
        self(candidate)
    }
}

/// Configuration of the external interestingness command.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Command to run. The scratch file path is appended as the final
    /// argument.
    pub command: String,
    /// Arguments passed before the scratch file path.
    pub args: Vec<String>,
    /// Wall-clock limit per invocation. `None` means wait forever (a hung
    /// oracle then hangs the run).
    pub timeout: Option<Duration>,
}

impl OracleConfig {
    pub fn new(command: impl Into<String>) -> Self {
        OracleConfig { command: command.into(), args: Vec::new(), timeout: None }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Subprocess-backed oracle runner.
///
/// Owns a process-private scratch directory, created at construction and
/// removed on drop. The scratch file inside it is rewritten on every call
/// and is never the caller's persistent output path.
pub struct OracleRunner {
    config: OracleConfig,
    scratch_dir: TempDir,
    scratch_file: PathBuf,
    calls: u64,
}

impl OracleRunner {
    /// Create a runner, acquiring the scratch directory.
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let scratch_dir = tempfile::Builder::new().prefix("delta-reduce").tempdir()?;
        let scratch_file = scratch_dir.path().join("candidate");
        Ok(OracleRunner { config, scratch_dir, scratch_file, calls: 0 })
    }

    /// Path of the scratch file candidates are serialized to.
    pub fn scratch_path(&self) -> &std::path::Path {
        &self.scratch_file
    }

    /// Number of oracle invocations made so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn write_candidate<A: Artifact>(&self, candidate: &A) -> Result<(), OracleError> {
        let file = File::create(&self.scratch_file)?;
        let mut writer = BufWriter::new(file);
        candidate.serialize(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn run_command(&self) -> Result<Verdict, OracleError> {
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .arg(&self.scratch_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| OracleError::Launch {
                command: self.config.command.clone(),
                source,
            })?;

        let status = match self.config.timeout {
            None => child.wait()?,
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        // Best-effort kill; the child may have exited already.
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(OracleError::Timeout(limit));
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        };

        if status.success() {
            Ok(Verdict::Interesting)
        } else {
            Ok(Verdict::NotInteresting)
        }
    }
}

impl<A: Artifact> Oracle<A> for OracleRunner {
    fn test(&mut self, candidate: &A) -> Result<Verdict, OracleError> {
        self.write_candidate(candidate)?;
        self.calls += 1;
        let verdict = self.run_command()?;
        tracing::debug!(
            call = self.calls,
            scratch = %self.scratch_file.display(),
            ?verdict,
            "oracle verdict"
        );
        Ok(verdict)
    }
}

impl std::fmt::Debug for OracleRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleRunner")
            .field("config", &self.config)
            .field("scratch_dir", &self.scratch_dir.path())
            .field("calls", &self.calls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Module;

    fn sample() -> Module {
        Module::parse("fn main {\n  ret\n}\n").unwrap()
    }

    #[test]
    fn exit_zero_is_interesting() {
        let mut runner = OracleRunner::new(OracleConfig::new("true")).unwrap();
        let verdict = Oracle::<Module>::test(&mut runner, &sample()).unwrap();
        assert_eq!(verdict, Verdict::Interesting);
        assert_eq!(runner.calls(), 1);
    }

    #[test]
    fn nonzero_exit_is_not_interesting() {
        let mut runner = OracleRunner::new(OracleConfig::new("false")).unwrap();
        let verdict = Oracle::<Module>::test(&mut runner, &sample()).unwrap();
        assert_eq!(verdict, Verdict::NotInteresting);
    }

    #[test]
    fn missing_command_is_a_launch_error() {
        let mut runner =
            OracleRunner::new(OracleConfig::new("/nonexistent/oracle-command")).unwrap();
        match Oracle::<Module>::test(&mut runner, &sample()) {
            Err(OracleError::Launch { .. }) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn scratch_file_holds_the_serialized_candidate() {
        let mut runner = OracleRunner::new(OracleConfig::new("true")).unwrap();
        let module = sample();
        Oracle::<Module>::test(&mut runner, &module).unwrap();
        let written = std::fs::read_to_string(runner.scratch_path()).unwrap();
        assert_eq!(written, module.to_string());
    }

    #[test]
    fn timeout_kills_a_hung_oracle() {
        // The scratch path lands in $0 and is ignored.
        let config = OracleConfig::new("sh")
            .arg("-c")
            .arg("sleep 30")
            .timeout(Duration::from_millis(50));
        let mut runner = OracleRunner::new(config).unwrap();
        match Oracle::<Module>::test(&mut runner, &sample()) {
            Err(OracleError::Timeout(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
