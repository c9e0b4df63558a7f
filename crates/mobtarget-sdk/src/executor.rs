//! External process execution.
//!
//! [`Executor`] is a builder describing one invocation of an external tool:
//! program, arguments, environment overrides and where its output goes.
//! It can be run to completion ([`Executor::exec`]), run for its stdout
//! ([`Executor::exec_capture`]) or spawned and handed back to the caller
//! ([`Executor::spawn`]).
//!
//! ## Output sinks
//!
//! | Sink | Behaviour |
//! |------|-----------|
//! | [`OutputSink::Inherit`] | Child writes straight to our stdout/stderr |
//! | [`OutputSink::Null`] | Output is discarded |
//! | [`OutputSink::Log`] | Each line becomes a `tracing` event |
//! | [`OutputSink::File`] | Bytes go to a file opened on first write |
//! | [`OutputSink::Lines`] | Each line is handed to a custom [`LineSink`] |
//!
//! A [`StreamDemux`] attached with [`Executor::demux`] sees both streams and
//! decides per line where it goes.
//!
//! File sinks are opened lazily because they are typically named pipes:
//! opening a FIFO for writing blocks until a reader attaches, and a launch
//! must not hang just because nobody is reading yet.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::types::{DeployError, Result};

/// Level used by [`OutputSink::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Error,
}

/// Receives a child's output one line at a time.
///
/// Lines include their trailing newline when the child wrote one.
pub trait LineSink: Send {
    fn write_line(&mut self, line: &[u8]) -> io::Result<()>;
}

/// One of a child's output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Handles both output streams of a child in one place.
///
/// Lines from the two streams arrive on different threads.
pub trait StreamDemux: Send + Sync {
    fn route(&self, stream: StreamKind, line: &[u8]) -> io::Result<()>;
}

struct DemuxLines {
    demux: Arc<dyn StreamDemux>,
    stream: StreamKind,
}

impl LineSink for DemuxLines {
    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.demux.route(self.stream, line)
    }
}

/// Destination for one of a child's output streams.
pub enum OutputSink {
    Inherit,
    Null,
    Log(LogLevel),
    File(PathBuf),
    Lines(Box<dyn LineSink>),
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSink::Inherit => f.write_str("Inherit"),
            OutputSink::Null => f.write_str("Null"),
            OutputSink::Log(level) => f.debug_tuple("Log").field(level).finish(),
            OutputSink::File(path) => f.debug_tuple("File").field(path).finish(),
            OutputSink::Lines(_) => f.write_str("Lines(..)"),
        }
    }
}

impl PartialEq for OutputSink {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (OutputSink::Inherit, OutputSink::Inherit) => true,
            (OutputSink::Null, OutputSink::Null) => true,
            (OutputSink::Log(a), OutputSink::Log(b)) => a == b,
            (OutputSink::File(a), OutputSink::File(b)) => a == b,
            _ => false,
        }
    }
}

/// A writer that opens its file on the first write.
#[derive(Debug)]
pub struct OpenOnWriteFile {
    path: PathBuf,
    file: Option<File>,
}

impl OpenOnWriteFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the underlying file has been opened yet.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn file(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path)?;
            self.file = Some(file);
        }
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(io::Error::other("file not open")),
        }
    }
}

impl Write for OpenOnWriteFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl LineSink for OpenOnWriteFile {
    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.write_all(line)?;
        self.flush()
    }
}

/// Forwards lines to `tracing`.
#[derive(Debug, Clone, Copy)]
pub struct LogSink {
    level: LogLevel,
}

impl LogSink {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }
}

impl LineSink for LogSink {
    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches(['\r', '\n']);
        match self.level {
            LogLevel::Debug => tracing::debug!("{}", text),
            LogLevel::Error => tracing::error!("{}", text),
        }
        Ok(())
    }
}

/// Which of our own console streams a [`ConsoleSink`] writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    Stdout,
    Stderr,
}

/// Writes lines to our own stdout or stderr.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink(pub ConsoleStream);

impl LineSink for ConsoleSink {
    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        match self.0 {
            ConsoleStream::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(line)?;
                out.flush()
            }
            ConsoleStream::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(line)?;
                err.flush()
            }
        }
    }
}

/// Builder for one external tool invocation.
///
/// # Example
///
/// ```no_run
/// use mobtarget_sdk::executor::{Executor, LogLevel, OutputSink};
///
/// let allocate = Executor::new("xcrun")
///     .args(["-sdk", "iphoneos", "-f", "codesign_allocate"])
///     .exec_capture()?;
///
/// Executor::new("codesign")
///     .env("CODESIGN_ALLOCATE", allocate)
///     .args(["-f", "-s", "iPhone Developer", "Hello.app"])
///     .stdout(OutputSink::Log(LogLevel::Debug))
///     .exec()?;
/// # Ok::<(), mobtarget_sdk::DeployError>(())
/// ```
#[derive(Debug)]
pub struct Executor {
    program: PathBuf,
    args: Vec<OsString>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
    stdout: OutputSink,
    stderr: OutputSink,
}

impl Executor {
    /// Creates an invocation of `program`. Tool output goes to the log by default.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            stdout: OutputSink::Log(LogLevel::Debug),
            stderr: OutputSink::Log(LogLevel::Error),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment override on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdout(mut self, sink: OutputSink) -> Self {
        self.stdout = sink;
        self
    }

    pub fn stderr(mut self, sink: OutputSink) -> Self {
        self.stderr = sink;
        self
    }

    /// Routes both streams through `demux`, replacing any configured sinks.
    pub fn demux(self, demux: Arc<dyn StreamDemux>) -> Self {
        let stdout = OutputSink::Lines(Box::new(DemuxLines {
            demux: Arc::clone(&demux),
            stream: StreamKind::Stdout,
        }));
        let stderr = OutputSink::Lines(Box::new(DemuxLines {
            demux,
            stream: StreamKind::Stderr,
        }));
        self.stdout(stdout).stderr(stderr)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Arguments rendered lossily as strings, for display and errors.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    pub fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn stdout_sink(&self) -> &OutputSink {
        &self.stdout
    }

    pub fn stderr_sink(&self) -> &OutputSink {
        &self.stderr
    }

    /// Command line for log and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args_lossy());
        parts.join(" ")
    }

    fn command_name(&self) -> String {
        self.program.display().to_string()
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    fn execution_error(&self, status: ExitStatus) -> DeployError {
        DeployError::Execution {
            command: self.command_name(),
            args: self.args_lossy(),
            code: status.code(),
        }
    }

    /// Spawns the process with its output wired to the configured sinks.
    ///
    /// The returned handle owns the process; nothing here supervises it.
    pub fn spawn(self) -> Result<LaunchedProcess> {
        tracing::debug!("Running: {}", self.display_command());
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(stdio_for(&self.stdout));
        cmd.stderr(stdio_for(&self.stderr));

        let command = self.command_name();
        let args = self.args_lossy();
        let mut child = cmd.spawn().map_err(|e| DeployError::Spawn {
            command: command.clone(),
            args: args.clone(),
            source: e,
        })?;

        let mut pumps = Vec::new();
        if let Some(out) = child.stdout.take()
            && let Some(sink) = line_sink_for(self.stdout)
        {
            pumps.push(pump(out, sink));
        }
        if let Some(err) = child.stderr.take()
            && let Some(sink) = line_sink_for(self.stderr)
        {
            pumps.push(pump(err, sink));
        }

        Ok(LaunchedProcess {
            command,
            args,
            child,
            pumps,
        })
    }

    /// Runs the process to completion. A non-zero exit is an error.
    pub fn exec(self) -> Result<()> {
        let mut process = self.spawn()?;
        let status = process.wait()?;
        if !status.success() {
            return Err(DeployError::Execution {
                command: process.command,
                args: process.args,
                code: status.code(),
            });
        }
        Ok(())
    }

    /// Runs the process to completion and returns its trimmed stdout.
    ///
    /// Stderr is forwarded to the configured stderr sink only when it is a
    /// log sink; it is otherwise dropped.
    pub fn exec_capture(self) -> Result<String> {
        tracing::debug!("Running: {}", self.display_command());
        let output = self
            .build_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DeployError::Spawn {
                command: self.command_name(),
                args: self.args_lossy(),
                source: e,
            })?;

        if let OutputSink::Log(level) = self.stderr {
            let mut sink = LogSink::new(level);
            for line in output.stderr.split_inclusive(|b| *b == b'\n') {
                let _ = sink.write_line(line);
            }
        }

        if !output.status.success() {
            return Err(self.execution_error(output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn stdio_for(sink: &OutputSink) -> Stdio {
    match sink {
        OutputSink::Inherit => Stdio::inherit(),
        OutputSink::Null => Stdio::null(),
        _ => Stdio::piped(),
    }
}

fn line_sink_for(sink: OutputSink) -> Option<Box<dyn LineSink>> {
    match sink {
        OutputSink::Inherit | OutputSink::Null => None,
        OutputSink::Log(level) => Some(Box::new(LogSink::new(level))),
        OutputSink::File(path) => Some(Box::new(OpenOnWriteFile::new(path))),
        OutputSink::Lines(sink) => Some(sink),
    }
}

/// Copies a child stream into a sink line by line until EOF.
///
/// A failing sink is reported once and the rest of the stream is drained
/// so the child never blocks on a full pipe.
fn pump<R: Read + Send + 'static>(stream: R, mut sink: Box<dyn LineSink>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        let mut failed = false;
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if failed {
                        continue;
                    }
                    if let Err(e) = sink.write_line(&line) {
                        tracing::warn!("Dropping process output: {}", e);
                        failed = true;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read process output: {}", e);
                    break;
                }
            }
        }
    })
}

/// Handle to a spawned external process.
///
/// Output pumps are joined by [`LaunchedProcess::wait`] so that all output
/// has reached its sinks once `wait` returns.
#[derive(Debug)]
pub struct LaunchedProcess {
    command: String,
    args: Vec<String>,
    child: Child,
    pumps: Vec<JoinHandle<()>>,
}

impl LaunchedProcess {
    /// OS process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Waits for the process to exit and for its output to be drained.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        let status = self
            .child
            .wait()
            .map_err(|e| DeployError::io(&self.command, e))?;
        for pump in self.pumps.drain(..) {
            if pump.join().is_err() {
                tracing::warn!("Output pump for {} panicked", self.command);
            }
        }
        Ok(status)
    }

    /// Returns the exit status if the process has already exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child
            .try_wait()
            .map_err(|e| DeployError::io(&self.command, e))
    }

    /// Terminates the process.
    pub fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .map_err(|e| DeployError::io(&self.command, e))
    }
}
