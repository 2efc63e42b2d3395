//! Bot subprocess runner.
//!
//! Validates the requested mode against the allow-list, launches the Python
//! worker, republishes its output to the console log line by line while
//! accumulating the full text for the caller, and reports exit status as a
//! structured result. Launch failure is reported data, never a fault that
//! escapes to the HTTP layer.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::config::BotEnv;
use crate::console::{ConsoleLog, LogLevel};

/// Captured output size at which results are truncated.
pub const MAX_OUTPUT: usize = 20_000;
const READ_CHUNK: usize = 4096;

/// Operation modes the worker accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Full,
    Linkedin,
    Gmail,
    X,
    Jobs,
    Report,
}

impl Mode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "full" => Some(Self::Full),
            "linkedin" => Some(Self::Linkedin),
            "gmail" => Some(Self::Gmail),
            "x" => Some(Self::X),
            "jobs" => Some(Self::Jobs),
            "report" => Some(Self::Report),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Linkedin => "linkedin",
            Self::Gmail => "gmail",
            Self::X => "x",
            Self::Jobs => "jobs",
            Self::Report => "report",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub mode: String,
}

/// Outcome of one run, from launch to exit or launch failure.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// True iff the worker exited with status code zero.
    pub ok: bool,
    /// Exit code; absent when the process never started or died to a signal.
    pub code: Option<i32>,
    pub output: String,
    pub error_output: String,
}

/// Failures detected before anything is spawned.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid mode: {0:?}")]
    InvalidMode(String),
    #[error("bot file not found: {}", .0.display())]
    WorkerNotFound(PathBuf),
}

/// Extension point for launching the worker, so tests can count spawn calls
/// and substitute a shell for the Python interpreter.
pub trait BotSpawner: Send + Sync {
    fn spawn(&self, program: &str, args: &[String], workdir: &Path) -> io::Result<Child>;
}

/// Default spawner: the configured Python interpreter, output captured,
/// working directory set to the bot root, parent environment inherited.
pub struct PythonSpawner;

impl BotSpawner for PythonSpawner {
    fn spawn(&self, program: &str, args: &[String], workdir: &Path) -> io::Result<Child> {
        Command::new(program)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }
}

#[derive(Debug, Clone, Copy)]
enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    fn level(&self) -> LogLevel {
        match self {
            Self::Stdout => LogLevel::Info,
            Self::Stderr => LogLevel::Error,
        }
    }
}

/// Reassembles discrete lines from arbitrarily-chunked stream data.
///
/// The trailing fragment of each chunk is carried over until a newline
/// completes it; `finish` flushes a non-blank carry-over when the stream
/// closes mid-line.
pub struct LineAssembler {
    carry: String,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self {
            carry: String::new(),
        }
    }

    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.carry.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.carry.find('\n') {
            let mut line: String = self.carry.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    pub fn finish(self) -> Option<String> {
        let tail = self.carry.trim();
        if tail.is_empty() {
            None
        } else {
            Some(tail.to_string())
        }
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Launches the worker and turns one `RunRequest` into one `RunResult`.
pub struct BotRunner {
    env: BotEnv,
    console: Arc<ConsoleLog>,
    spawner: Arc<dyn BotSpawner>,
}

impl BotRunner {
    pub fn new(env: BotEnv, console: Arc<ConsoleLog>) -> Self {
        Self::with_spawner(env, console, Arc::new(PythonSpawner))
    }

    pub fn with_spawner(
        env: BotEnv,
        console: Arc<ConsoleLog>,
        spawner: Arc<dyn BotSpawner>,
    ) -> Self {
        Self {
            env,
            console,
            spawner,
        }
    }

    /// Deterministic argument shape per mode: `--report` for the reporting
    /// mode, `--mode <mode>` for everything else, `--config` appended when a
    /// config path is configured.
    pub fn build_args(script: &Path, mode: Mode, config: Option<&Path>) -> Vec<String> {
        let mut args = vec![script.display().to_string()];
        match mode {
            Mode::Report => args.push("--report".to_string()),
            other => {
                args.push("--mode".to_string());
                args.push(other.as_str().to_string());
            }
        }
        if let Some(config) = config {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }
        args
    }

    /// Run the worker once.
    ///
    /// `Err` is returned only for pre-spawn failures (invalid mode, missing
    /// worker files). Everything after the spawn attempt - launch failure,
    /// non-zero exit, signal death - resolves to `Ok(RunResult)`.
    pub async fn run(&self, request: &RunRequest) -> Result<RunResult, RunError> {
        let Some(mode) = Mode::parse(&request.mode) else {
            self.console.log(
                LogLevel::Warn,
                format!("rejected bot run with invalid mode {:?}", request.mode),
            );
            return Err(RunError::InvalidMode(request.mode.clone()));
        };

        let script = self.env.script_path();
        if !tokio::fs::try_exists(&script).await.unwrap_or(false) {
            self.console.log(
                LogLevel::Error,
                format!("bot entry point missing at {}", script.display()),
            );
            return Err(RunError::WorkerNotFound(script));
        }

        let config = self.env.resolved_config_path();
        if let Some(ref config) = config
            && !tokio::fs::try_exists(config).await.unwrap_or(false)
        {
            self.console.log(
                LogLevel::Error,
                format!("bot config missing at {}", config.display()),
            );
            return Err(RunError::WorkerNotFound(config.clone()));
        }

        let args = Self::build_args(&script, mode, config.as_deref());
        self.console.log(
            LogLevel::Info,
            format!("starting bot run: mode={}", mode.as_str()),
        );

        let mut child = match self.spawner.spawn(&self.env.python, &args, &self.env.workdir) {
            Ok(child) => child,
            Err(e) => {
                let description = format!("failed to launch bot: {e}");
                self.console.log(LogLevel::Error, description.clone());
                return Ok(RunResult {
                    ok: false,
                    code: None,
                    output: String::new(),
                    error_output: description,
                });
            }
        };

        // stdout and stderr are pumped concurrently; their interleaving in
        // the console reflects OS chunk arrival order across the two pipes.
        let stdout_task = spawn_pump(
            child.stdout.take(),
            StreamSource::Stdout,
            Arc::clone(&self.console),
        );
        let stderr_task = spawn_pump(
            child.stderr.take(),
            StreamSource::Stderr,
            Arc::clone(&self.console),
        );

        let status = child.wait().await;
        let output = stdout_task.await.unwrap_or_default();
        let error_output = stderr_task.await.unwrap_or_default();

        match status {
            Ok(status) => {
                let code = status.code();
                let summary = match code {
                    Some(code) => format!("bot exited with code {code}"),
                    None => "bot terminated by signal".to_string(),
                };
                let level = if status.success() {
                    LogLevel::Info
                } else {
                    LogLevel::Error
                };
                self.console.log(level, summary);

                Ok(RunResult {
                    ok: code == Some(0),
                    code,
                    output: clamp_output(output.trim()),
                    error_output: clamp_output(error_output.trim()),
                })
            }
            Err(e) => {
                let description = format!("failed to wait for bot: {e}");
                self.console.log(LogLevel::Error, description.clone());
                Ok(RunResult {
                    ok: false,
                    code: None,
                    output: clamp_output(output.trim()),
                    error_output: description,
                })
            }
        }
    }
}

/// Consume one output stream: publish complete lines live and accumulate the
/// raw text for the final result. The two accounts are independent so result
/// truncation never couples to line granularity.
fn spawn_pump<R>(
    stream: Option<R>,
    source: StreamSource,
    console: Arc<ConsoleLog>,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut stream) = stream else {
            return String::new();
        };

        let mut raw = String::new();
        let mut lines = LineAssembler::new();
        let mut pending = Vec::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    let chunk = drain_complete_utf8(&mut pending);
                    if chunk.is_empty() {
                        continue;
                    }
                    raw.push_str(&chunk);
                    for line in lines.push(&chunk) {
                        publish_line(&console, source, &line);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }

        if !pending.is_empty() {
            let tail = String::from_utf8_lossy(&pending);
            raw.push_str(&tail);
            for line in lines.push(&tail) {
                publish_line(&console, source, &line);
            }
        }

        if let Some(tail) = lines.finish() {
            publish_line(&console, source, &tail);
        }

        raw
    })
}

/// Splits off everything up to the last complete UTF-8 character, decoding
/// invalid interior bytes lossily. A multibyte sequence sheared by the read
/// chunk stays buffered until its remaining bytes arrive.
fn drain_complete_utf8(pending: &mut Vec<u8>) -> String {
    let mut hold = 0;
    for (back, &byte) in pending.iter().rev().take(3).enumerate() {
        if byte < 0x80 {
            break;
        }
        if byte >= 0xC0 {
            let need = match byte {
                0xF0..=0xFF => 4,
                0xE0..=0xEF => 3,
                _ => 2,
            };
            if need > back + 1 {
                hold = back + 1;
            }
            break;
        }
        // continuation byte, keep scanning back for the leading byte
    }

    let split = pending.len() - hold;
    let chunk = String::from_utf8_lossy(&pending[..split]).into_owned();
    pending.drain(..split);
    chunk
}

fn publish_line(console: &ConsoleLog, source: StreamSource, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    console.log(source.level(), format!("[{}] {line}", source.as_str()));
}

fn clamp_output(value: &str) -> String {
    match value.char_indices().nth(MAX_OUTPUT) {
        None => value.to_string(),
        Some((idx, _)) => format!("{}\n...truncated", &value[..idx]),
    }
}
