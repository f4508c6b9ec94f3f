//! Transport abstraction between a [`crate::uci::UciSession`] and the engine child process.
//!
//! Concrete process spawning is kept deliberately thin: the session only ever talks to the
//! [`EngineTransport`] trait, so tests can drive a fake transport without touching a real
//! subprocess.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{error, trace, warn};

use crate::error::{Error, Result};

/// Line-oriented, full-duplex communication with a running engine.
///
/// Implementations must allow `write_line` and `read_line` to be called concurrently: the
/// session's background reader holds `read_line` for the lifetime of the process while other
/// operations call `write_line`.
#[async_trait]
pub trait EngineTransport: Send + Sync + 'static {
    /// Writes one command line, appending the line terminator.
    async fn write_line(&self, line: &str) -> Result<()>;

    /// Reads the next decoded output line, or `Ok(None)` at end of stream.
    async fn read_line(&self) -> Result<Option<String>>;

    /// Terminates the process and releases file handles. Idempotent.
    async fn dispose(&self) -> Result<()>;
}

/// Configuration needed to spawn an engine executable.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub command: String,
    pub args: Vec<String>,
    pub pwd: Option<String>,
}

/// [`EngineTransport`] backed by a real child process.
pub struct ProcessTransport {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<Lines<BufReader<ChildStdout>>>,
    child: Mutex<Option<Child>>,
}

impl ProcessTransport {
    /// Spawns the engine executable and begins a background stderr drain.
    #[tracing::instrument(skip(spec), fields(command = %spec.command))]
    pub async fn start(spec: ProcessSpec) -> Result<Self> {
        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(pwd) = &spec.pwd {
            command.current_dir(pwd);
        }

        let mut process = command
            .spawn()
            .map_err(|err| Error::InitFailure(format!("while starting engine: {err}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::InitFailure("cannot open engine stdin".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::InitFailure("cannot open engine stdout".into()))?;

        if let Some(stderr) = process.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => warn!(err = line, "engine stderr"),
                        Ok(None) => break,
                        Err(err) => {
                            error!(%err, "while reading engine stderr");
                            break;
                        }
                    }
                }
            });
        }

        trace!(pid = process.id(), "engine started");

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout).lines()),
            child: Mutex::new(Some(process)),
        })
    }
}

#[async_trait]
impl EngineTransport for ProcessTransport {
    async fn write_line(&self, line: &str) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let mut line = line.to_owned();
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        trace!(line = line.trim(), "uci send");
        Ok(())
    }

    async fn read_line(&self) -> Result<Option<String>> {
        let mut stdout = self.stdout.lock().await;
        let line = stdout.next_line().await?;
        if let Some(line) = &line {
            trace!(line = line.as_str(), "uci recv");
        }
        Ok(line)
    }

    async fn dispose(&self) -> Result<()> {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        Ok(())
    }
}
