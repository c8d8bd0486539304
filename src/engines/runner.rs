//! Runner subprocess management
//!
//! Every loaded model is hosted by a long-running runner process that
//! holds the weights in device memory and speaks a JSON-lines protocol on
//! stdio. The runner contract: print one `{"ready": true}` line once the
//! model is resident (or `{"ready": false, "error": ...}`), answer one
//! response line per request line, and exit on SIGTERM or stdin EOF.
//! Ending the process is what actually returns the device allocation.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Command line for one runner process
#[derive(Debug, Clone)]
pub struct RunnerSpec {
    /// Short name for logs ("whisper_x", "audit_llm", ...)
    pub name: String,
    pub binary: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    /// Covers model download and weight loading
    pub ready_timeout: Duration,
    pub call_timeout: Duration,
}

#[derive(Debug)]
struct RunnerIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Handle to a live runner process
#[derive(Debug)]
pub struct ModelRunner {
    name: String,
    pid: Option<i32>,
    _child: Mutex<Child>,
    io: Mutex<RunnerIo>,
    call_timeout: Duration,
    /// Set once a call times out: the protocol is one response line per
    /// request line, so an unread late response would be handed to the
    /// next caller as its own answer.
    poisoned: AtomicBool,
}

impl ModelRunner {
    /// Spawn the runner and wait for its ready line. Failure here is a
    /// model load failure: the weights never made it onto the device.
    pub async fn spawn(spec: RunnerSpec) -> Result<Self> {
        let mut cmd = Command::new(&spec.binary);
        cmd.args(&spec.args);
        for (key, value) in &spec.envs {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {} runner ({})", spec.name, spec.binary))?;

        let stdin = child.stdin.take().context("runner stdin unavailable")?;
        let stdout = child.stdout.take().context("runner stdout unavailable")?;
        let mut stdout = BufReader::new(stdout);

        let mut line = String::new();
        match timeout(spec.ready_timeout, stdout.read_line(&mut line)).await {
            Ok(Ok(0)) => bail!("{} runner exited before signalling ready", spec.name),
            Ok(Ok(_)) => {
                let value: Value = serde_json::from_str(line.trim()).with_context(|| {
                    format!("unparseable ready line from {} runner: {line:?}", spec.name)
                })?;
                if value.get("ready").and_then(Value::as_bool) != Some(true) {
                    bail!(
                        "{} runner reported load failure: {}",
                        spec.name,
                        value
                            .get("error")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error")
                    );
                }
            }
            Ok(Err(e)) => {
                return Err(e)
                    .with_context(|| format!("failed reading ready line from {} runner", spec.name));
            }
            Err(_) => bail!(
                "{} runner did not become ready within {:?}",
                spec.name,
                spec.ready_timeout
            ),
        }

        let pid = child.id().map(|pid| pid as i32);
        tracing::info!(runner = %spec.name, pid = ?pid, "Runner ready");

        Ok(Self {
            name: spec.name,
            pid,
            _child: Mutex::new(child),
            io: Mutex::new(RunnerIo { stdin, stdout }),
            call_timeout: spec.call_timeout,
            poisoned: AtomicBool::new(false),
        })
    }

    /// One request/response exchange. Calls are serialized per runner:
    /// the loaded model instance is not assumed to support concurrent
    /// invocation.
    pub async fn call(&self, request: &Value) -> Result<Value> {
        let mut io = self.io.lock().await;

        if self.poisoned.load(Ordering::Acquire) {
            bail!("{} runner is unusable after a timed-out call", self.name);
        }

        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        io.stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("{} runner stdin closed", self.name))?;
        io.stdin.flush().await?;

        let mut response = String::new();
        let read = match timeout(self.call_timeout, io.stdout.read_line(&mut response)).await {
            Ok(result) => result
                .with_context(|| format!("failed reading response from {} runner", self.name))?,
            Err(_) => {
                // The response line may still arrive later; leaving it in
                // the buffer would desync every call after this one. Mark
                // the runner dead and end its process; the family has to
                // be loaded again.
                self.poisoned.store(true, Ordering::Release);
                self.terminate();
                bail!(
                    "{} runner call timed out after {:?}",
                    self.name,
                    self.call_timeout
                );
            }
        };

        if read == 0 {
            bail!("{} runner exited mid-call", self.name);
        }

        serde_json::from_str(response.trim())
            .with_context(|| format!("unparseable response from {} runner", self.name))
    }
}

impl ModelRunner {
    fn terminate(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
            tracing::debug!(runner = %self.name, pid, "Sent SIGTERM to runner");
        }
    }
}

impl Drop for ModelRunner {
    fn drop(&mut self) {
        // Eviction path: ask the runner to exit and release its weights.
        // stdin EOF (the io half drops with us) doubles as the signal for
        // runners that block on reads.
        self.terminate();
    }
}
