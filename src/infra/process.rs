//! External process execution
//!
//! Runs build tools with an explicit environment and working directory.
//! Output of logged runs is drained line by line into a per-phase log file
//! and optionally echoed to the terminal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;

/// Process execution errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Program could not be started
    #[error("Failed to start '{program}': {error}")]
    Spawn { program: String, error: String },

    /// Program ran but reported failure
    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// IO error on the log file
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// A single command line to run in a given directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory of the child
    pub cwd: PathBuf,
    /// Run through sudo when the runner elevates
    pub elevated: bool,
}

impl Invocation {
    /// Create an invocation with no arguments
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            elevated: false,
        }
    }

    /// Run a shell snippet with `sh -c`
    pub fn shell(script: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self::new("sh", cwd).arg("-c").arg(script)
    }

    /// Append an argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Mark as an install-tree mutation
    #[must_use]
    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    /// Human-readable command line
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs invocations with a fixed environment
#[derive(Debug, Clone)]
pub struct ToolRunner {
    /// Environment overlaid on the inherited one
    env: HashMap<String, String>,
    /// Whether elevated invocations go through sudo
    elevate: bool,
    /// Echo tool output to stderr
    echo: bool,
}

impl ToolRunner {
    /// Create a runner with the given environment overlay
    pub fn new(env: HashMap<String, String>) -> Self {
        Self {
            env,
            elevate: false,
            echo: false,
        }
    }

    /// Route elevated invocations through sudo
    #[must_use]
    pub fn with_elevation(mut self, elevate: bool) -> Self {
        self.elevate = elevate;
        self
    }

    /// Echo tool output while logging it
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Whether elevated invocations are wrapped
    pub fn is_elevating(&self) -> bool {
        self.elevate
    }

    /// Environment overlay
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Full argv that will be executed for an invocation
    ///
    /// sudo resets the environment, so the overlay is passed through `env`.
    pub fn argv(&self, inv: &Invocation) -> Vec<String> {
        let mut argv = Vec::new();
        if inv.elevated && self.elevate {
            argv.push("sudo".to_string());
            argv.push("env".to_string());
            let mut keys: Vec<&String> = self.env.keys().collect();
            keys.sort();
            for key in keys {
                argv.push(format!("{key}={}", self.env[key]));
            }
        }
        argv.push(inv.program.clone());
        argv.extend(inv.args.iter().cloned());
        argv
    }

    fn command(&self, inv: &Invocation) -> Command {
        let argv = self.argv(inv);
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(&inv.cwd)
            .envs(&self.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Run an invocation, appending its output to `log`
    ///
    /// The exit status is returned as-is; deciding what a failure means is
    /// left to the caller.
    pub async fn run_logged(&self, inv: &Invocation, log: &Path) -> Result<ExitStatus, ProcessError> {
        let io_err = |e: std::io::Error| ProcessError::Io {
            path: log.to_path_buf(),
            error: e.to_string(),
        };

        if let Some(parent) = log.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .await
            .map_err(io_err)?;

        let header = format!("$ (cd {} && {})\n", inv.cwd.display(), self.argv(inv).join(" "));
        file.write_all(header.as_bytes()).await.map_err(io_err)?;

        tracing::debug!("Running: {}", inv.command_line());

        let mut child = match self
            .command(inv)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to start {}: {e}\n", inv.program);
                file.write_all(message.as_bytes()).await.map_err(io_err)?;
                file.flush().await.map_err(io_err)?;
                return Err(ProcessError::Spawn {
                    program: inv.program.clone(),
                    error: e.to_string(),
                });
            }
        };

        let (tx, mut rx) = unbounded_channel();
        let stdout_task = forward_lines(child.stdout.take(), tx.clone());
        let stderr_task = forward_lines(child.stderr.take(), tx);

        while let Some(line) = rx.recv().await {
            if self.echo {
                eprintln!("{line}");
            }
            file.write_all(line.as_bytes()).await.map_err(io_err)?;
            file.write_all(b"\n").await.map_err(io_err)?;
        }
        let _ = tokio::join!(stdout_task, stderr_task);

        let status = child.wait().await.map_err(|e| ProcessError::Spawn {
            program: inv.program.clone(),
            error: e.to_string(),
        })?;

        if !status.success() {
            let footer = format!("[exit status: {status}]\n");
            file.write_all(footer.as_bytes()).await.map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;

        Ok(status)
    }

    /// Run an invocation and return its trimmed stdout
    pub async fn capture(&self, inv: &Invocation) -> Result<String, ProcessError> {
        let output = self
            .command(inv)
            .output()
            .await
            .map_err(|e| ProcessError::Spawn {
                program: inv.program.clone(),
                error: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ProcessError::Failed {
                program: inv.command_line(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run an invocation discarding output, failing on non-zero exit
    pub async fn run_checked(&self, inv: &Invocation) -> Result<(), ProcessError> {
        self.capture(inv).await.map(|_| ())
    }
}

/// Forward a child stream to the log writer line by line
///
/// Invalid UTF-8 is replaced so a noisy tool can never stall on a full pipe.
fn forward_lines<R>(reader: Option<R>, tx: UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(reader) = reader else {
            return;
        };
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    })
}
