//! Launch strategies.
//!
//! Simulator launches go through `ios-sim`, which takes care of the app's
//! output itself (optionally redirecting it into FIFOs). Device launches go
//! through `fruitstrap`, a debug bridge that runs gdb in MI mode: the app's
//! own output arrives as gdb target-stream records (`@"..."`) mixed into
//! the bridge's chatter, so the two are separated by [`BridgeDemux`].

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::executor::{
    ConsoleSink, ConsoleStream, Executor, LineSink, LogLevel, LogSink, OpenOnWriteFile,
    OutputSink, StreamDemux, StreamKind,
};
use crate::types::{DeployError, DeviceFamily, Result, ToolPaths, Variant};

/// Per-launch parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchParameters {
    /// Arguments passed to the app.
    pub arguments: Vec<String>,
    /// Where the app's stdout should go. The console when unset.
    pub stdout_fifo: Option<PathBuf>,
    /// Where the app's stderr should go. The console when unset.
    pub stderr_fifo: Option<PathBuf>,
    /// Simulator SDK to boot, e.g. `8.1`. Simulator only.
    pub simulator_sdk: Option<String>,
    /// Simulated device family. Simulator only.
    pub family: DeviceFamily,
}

/// How an app is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStrategy {
    Simulator,
    Device,
}

impl LaunchStrategy {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Simulator => LaunchStrategy::Simulator,
            Variant::Device => LaunchStrategy::Device,
        }
    }

    /// Builds the launcher invocation for the app in `app_dir`.
    pub fn invocation(
        &self,
        tools: &ToolPaths,
        app_dir: &Path,
        params: &LaunchParameters,
    ) -> Result<Executor> {
        match self {
            LaunchStrategy::Simulator => Ok(simulator_invocation(tools, app_dir, params)),
            LaunchStrategy::Device => device_invocation(tools, app_dir, params),
        }
    }
}

/// `ios-sim launch <app> --unbuffered [--sdk S] --family F [--stdout P] [--stderr P] [--args ...]`
pub fn simulator_invocation(
    tools: &ToolPaths,
    app_dir: &Path,
    params: &LaunchParameters,
) -> Executor {
    let mut exec = Executor::new(&tools.ios_sim)
        .arg("launch")
        .arg(app_dir)
        .arg("--unbuffered");
    if let Some(sdk) = &params.simulator_sdk {
        exec = exec.arg("--sdk").arg(sdk);
    }
    exec = exec.arg("--family").arg(params.family.as_str());
    if let Some(fifo) = &params.stdout_fifo {
        exec = exec.arg("--stdout").arg(fifo);
    }
    if let Some(fifo) = &params.stderr_fifo {
        exec = exec.arg("--stderr").arg(fifo);
    }
    if !params.arguments.is_empty() {
        exec = exec.arg("--args").args(&params.arguments);
    }
    exec.stdout(OutputSink::Inherit).stderr(OutputSink::Inherit)
}

/// `fruitstrap --verbose --unbuffered --debug --gdbargs "-i mi -q" --nostart [--args J] --bundle <app>`
///
/// The app arguments are collapsed into one argument (see [`join_args`]).
pub fn device_invocation(
    tools: &ToolPaths,
    app_dir: &Path,
    params: &LaunchParameters,
) -> Result<Executor> {
    let bundle = std::path::absolute(app_dir).map_err(|e| DeployError::io(app_dir, e))?;
    let mut exec = Executor::new(&tools.fruitstrap).args([
        "--verbose",
        "--unbuffered",
        "--debug",
        "--gdbargs",
        "-i mi -q",
        "--nostart",
    ]);
    if !params.arguments.is_empty() {
        exec = exec.arg("--args").arg(join_args(&params.arguments));
    }
    exec = exec.arg("--bundle").arg(bundle);

    let demux = BridgeDemux::new(
        app_sink(params.stdout_fifo.as_deref(), ConsoleStream::Stdout),
        app_sink(params.stderr_fifo.as_deref(), ConsoleStream::Stderr),
    );
    Ok(exec.demux(Arc::new(demux)))
}

fn app_sink(fifo: Option<&Path>, console: ConsoleStream) -> Box<dyn LineSink> {
    match fifo {
        Some(path) => Box::new(OpenOnWriteFile::new(path)),
        None => Box::new(ConsoleSink(console)),
    }
}

/// Quotes one argument for a POSIX shell inside double quotes.
pub fn quote_argument(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Quotes each argument and joins them with single spaces.
pub fn join_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| quote_argument(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes a gdb/MI target-stream record (`@"text\n"`).
///
/// Returns `None` for any other line.
pub fn decode_target_stream(line: &[u8]) -> Option<Vec<u8>> {
    let line = trim_line_end(line);
    let body = line.strip_prefix(b"@\"")?.strip_suffix(b"\"")?;
    Some(unescape_c_string(body))
}

fn trim_line_end(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r'] = line {
        line = rest;
    }
    line
}

fn unescape_c_string(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        i += 1;
        if b != b'\\' || i == body.len() {
            out.push(b);
            continue;
        }
        let esc = body[i];
        i += 1;
        match esc {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'e' => out.push(0x1b),
            b'0'..=b'7' => {
                let mut value = u32::from(esc - b'0');
                let mut digits = 1;
                while digits < 3 && i < body.len() && (b'0'..=b'7').contains(&body[i]) {
                    value = value * 8 + u32::from(body[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                out.push((value & 0xff) as u8);
            }
            other => out.push(other),
        }
    }
    out
}

/// Separates app output from debug bridge chatter.
///
/// Target-stream records are decoded and written to the app sink for the
/// stream they arrived on. Everything else is bridge output: stdout lines are
/// logged at debug level, stderr lines at error level.
pub struct BridgeDemux {
    app_out: Mutex<Box<dyn LineSink>>,
    app_err: Mutex<Box<dyn LineSink>>,
}

impl BridgeDemux {
    pub fn new(app_out: Box<dyn LineSink>, app_err: Box<dyn LineSink>) -> Self {
        Self {
            app_out: Mutex::new(app_out),
            app_err: Mutex::new(app_err),
        }
    }
}

fn with_sink(sink: &Mutex<Box<dyn LineSink>>, line: &[u8]) -> io::Result<()> {
    let mut guard = sink
        .lock()
        .map_err(|_| io::Error::other("output sink poisoned"))?;
    guard.write_line(line)
}

impl StreamDemux for BridgeDemux {
    fn route(&self, stream: StreamKind, line: &[u8]) -> io::Result<()> {
        if let Some(decoded) = decode_target_stream(line) {
            return match stream {
                StreamKind::Stdout => with_sink(&self.app_out, &decoded),
                StreamKind::Stderr => with_sink(&self.app_err, &decoded),
            };
        }
        let level = match stream {
            StreamKind::Stdout => LogLevel::Debug,
            StreamKind::Stderr => LogLevel::Error,
        };
        LogSink::new(level).write_line(line)
    }
}
