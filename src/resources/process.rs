//! External tool invocation
//!
//! Reconcilers describe a command as a [`ProcessSpec`] and hand it to a
//! [`ProcessRunner`]; the tokio-backed runner is used in production and tests
//! substitute a recording fake.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::controller::error::{Error, Result};

/// Where a process reads its standard input from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessInput {
    Null,
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// Where a process writes its standard output to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessOutputTarget {
    Capture,
    File(PathBuf),
}

/// A command to run; `env` is added on top of the inherited environment
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: ProcessInput,
    pub stdout: ProcessOutputTarget,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: ProcessInput::Null,
            stdout: ProcessOutputTarget::Capture,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn stdin(mut self, stdin: ProcessInput) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn stdout(mut self, stdout: ProcessOutputTarget) -> Self {
        self.stdout = stdout;
        self
    }
}

// Env values carry credentials and stdin may carry statements; neither is printed
impl fmt::Debug for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(key, _)| key.as_str()).collect();
        let stdin = match &self.stdin {
            ProcessInput::Null => "null".to_string(),
            ProcessInput::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            ProcessInput::File(path) => path.display().to_string(),
        };
        f.debug_struct("ProcessSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .field("stdin", &stdin)
            .field("stdout", &self.stdout)
            .finish()
    }
}

/// Exit status and captured streams of a finished process
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the process to completion
    ///
    /// Only failing to start the process is an error; a non-zero exit is
    /// reported through [`ProcessOutput::code`].
    async fn run(&self, spec: ProcessSpec) -> Result<ProcessOutput>;
}

/// Runs processes on the host with `tokio::process`
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: ProcessSpec) -> Result<ProcessOutput> {
        debug!(program = %spec.program, args = ?spec.args, "Running external tool");

        let mut command = tokio::process::Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(key, value)| (key, value)))
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match &spec.stdin {
            ProcessInput::Null => command.stdin(Stdio::null()),
            ProcessInput::Bytes(_) => command.stdin(Stdio::piped()),
            ProcessInput::File(path) => command.stdin(Stdio::from(std::fs::File::open(path)?)),
        };

        match &spec.stdout {
            ProcessOutputTarget::Capture => command.stdout(Stdio::piped()),
            ProcessOutputTarget::File(path) => command.stdout(Stdio::from(
                std::fs::OpenOptions::new()
                    .write(true)
                    .truncate(true)
                    .open(path)?,
            )),
        };

        let mut child = command.spawn().map_err(|source| Error::ProcessSpawn {
            program: spec.program.clone(),
            source,
        })?;

        let stdin = child.stdin.take();
        let feed = async {
            if let (Some(mut stdin), ProcessInput::Bytes(bytes)) = (stdin, &spec.stdin) {
                stdin.write_all(bytes).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        // A tool that exits early closes its stdin; its exit code tells the story
        if let Err(e) = fed {
            debug!(program = %spec.program, error = %e, "Could not write stdin");
        }

        debug!(program = %spec.program, code = ?output.status.code(), "External tool finished");

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
