//! Line transports and worker launchers.
//!
//! The master never cares whether a worker is a child process speaking over
//! its stdin/stdout or a thread connected through in-memory channels; both
//! come back from a [`WorkerLauncher`] as a [`WorkerConnection`].

use crate::analysis::PairFilter;
use crate::core::Pattern;
use crate::errors::{Error, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;

pub trait LineSink: Send {
    /// Write one line and flush it
    fn send_line(&mut self, line: &str) -> Result<()>;
}

pub trait LineSource: Send {
    /// Next line without its terminator, `None` at end of stream
    fn next_line(&mut self) -> Result<Option<String>>;
}

pub struct WriteSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> WriteSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> LineSink for WriteSink<W> {
    fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

pub struct ReadSource<R: BufRead + Send> {
    reader: R,
}

impl<R: BufRead + Send> ReadSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead + Send> LineSource for ReadSource<R> {
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}

pub struct ChannelSink {
    sender: Sender<String>,
}

pub struct ChannelSource {
    receiver: Receiver<String>,
}

/// In-memory line pipe, closed when the sink is dropped
pub fn line_pipe() -> (ChannelSink, ChannelSource) {
    let (sender, receiver) = unbounded();
    (ChannelSink { sender }, ChannelSource { receiver })
}

impl LineSink for ChannelSink {
    fn send_line(&mut self, line: &str) -> Result<()> {
        self.sender.send(line.to_string()).map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "line pipe closed",
            ))
        })
    }
}

impl LineSource for ChannelSource {
    fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.receiver.recv().ok())
    }
}

/// Everything a worker needs to rebuild the analysis on its side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub repo: String,
    pub views: Vec<String>,
    pub patterns: Vec<Pattern>,
    pub min_support: f64,
    #[serde(default)]
    pub pair_filter: PairFilter,
    pub keep_size: usize,
    pub trim_factor: usize,
    pub data_dir: PathBuf,
}

pub trait WorkerControl: Send {
    /// Stop the worker without waiting for it to drain
    fn terminate(&mut self);

    /// Wait for a worker that quit on its own
    fn wait(&mut self);
}

pub struct WorkerConnection {
    pub input: Box<dyn LineSink>,
    pub output: Box<dyn LineSource>,
    pub control: Box<dyn WorkerControl>,
}

pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, index: usize, spec: &WorkerSpec) -> Result<WorkerConnection>;
}

/// Runs workers as `<program> worker --spec <json>` child processes
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Re-launch the running executable
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }
}

struct ChildControl {
    child: Child,
}

impl WorkerControl for ChildControl {
    fn terminate(&mut self) {
        if let Err(e) = self.child.kill() {
            log::debug!("Worker {} already gone: {}", self.child.id(), e);
        }
        let _ = self.child.wait();
    }

    fn wait(&mut self) {
        if let Err(e) = self.child.wait() {
            log::warn!("Failed to wait for worker {}: {}", self.child.id(), e);
        }
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, index: usize, spec: &WorkerSpec) -> Result<WorkerConnection> {
        let spec_json = serde_json::to_string(spec)?;
        let mut child = Command::new(&self.program)
            .arg("worker")
            .arg("--spec")
            .arg(spec_json)
            .env(crate::progress::QUIET_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::Worker(format!("failed to spawn worker {}: {}", index, e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Worker(format!("worker {} has no stdin", index)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Worker(format!("worker {} has no stdout", index)))?;
        log::debug!("Spawned worker {} as process {}", index, child.id());
        Ok(WorkerConnection {
            input: Box::new(WriteSink::new(stdin)),
            output: Box::new(ReadSource::new(BufReader::new(stdout))),
            control: Box::new(ChildControl { child }),
        })
    }
}

pub type WorkerBody =
    dyn Fn(usize, WorkerSpec, Box<dyn LineSource>, Box<dyn LineSink>) -> Result<()> + Send + Sync;

/// Runs each worker body on its own thread, connected through line pipes
#[derive(Clone)]
pub struct ThreadLauncher {
    body: Arc<WorkerBody>,
}

impl ThreadLauncher {
    pub fn new(
        body: impl Fn(usize, WorkerSpec, Box<dyn LineSource>, Box<dyn LineSink>) -> Result<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            body: Arc::new(body),
        }
    }
}

struct ThreadControl {
    handle: Option<JoinHandle<()>>,
}

impl WorkerControl for ThreadControl {
    fn terminate(&mut self) {
        // threads cannot be killed; closing the pipes makes the body fail
        self.handle.take();
    }

    fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl WorkerLauncher for ThreadLauncher {
    fn launch(&self, index: usize, spec: &WorkerSpec) -> Result<WorkerConnection> {
        let (master_sink, worker_source) = line_pipe();
        let (worker_sink, master_source) = line_pipe();
        let body = Arc::clone(&self.body);
        let spec = spec.clone();
        let handle = std::thread::Builder::new()
            .name(format!("couplingmap-worker-{}", index))
            .spawn(move || {
                if let Err(e) = body(index, spec, Box::new(worker_source), Box::new(worker_sink)) {
                    log::warn!("Worker thread {} failed: {}", index, e);
                }
            })?;
        Ok(WorkerConnection {
            input: Box::new(master_sink),
            output: Box::new(master_source),
            control: Box::new(ThreadControl {
                handle: Some(handle),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_source_strips_terminators() {
        let mut source = ReadSource::new(Cursor::new("R\r\nM\nQ"));
        assert_eq!(source.next_line().unwrap().as_deref(), Some("R"));
        assert_eq!(source.next_line().unwrap().as_deref(), Some("M"));
        assert_eq!(source.next_line().unwrap().as_deref(), Some("Q"));
        assert_eq!(source.next_line().unwrap(), None);
    }

    #[test]
    fn test_write_sink_appends_newline() {
        let mut buffer = Vec::new();
        WriteSink::new(&mut buffer).send_line("J\t0,3").unwrap();
        assert_eq!(buffer, b"J\t0,3\n");
    }

    #[test]
    fn test_line_pipe_closes_with_sink() {
        let (mut sink, mut source) = line_pipe();
        sink.send_line("R").unwrap();
        drop(sink);
        assert_eq!(source.next_line().unwrap().as_deref(), Some("R"));
        assert_eq!(source.next_line().unwrap(), None);
    }

    #[test]
    fn test_send_after_source_dropped_fails() {
        let (mut sink, source) = line_pipe();
        drop(source);
        assert!(sink.send_line("D").is_err());
    }

    #[test]
    fn test_thread_launcher_echo() {
        let launcher = ThreadLauncher::new(|_, _, mut source, mut sink| {
            while let Some(line) = source.next_line()? {
                sink.send_line(&line)?;
            }
            Ok(())
        });
        let spec = WorkerSpec {
            repo: "r".into(),
            views: vec![],
            patterns: vec![],
            min_support: 0.0,
            pair_filter: PairFilter::default(),
            keep_size: 1,
            trim_factor: 1,
            data_dir: PathBuf::from("."),
        };
        let mut connection = launcher.launch(0, &spec).unwrap();
        connection.input.send_line("hello").unwrap();
        assert_eq!(connection.output.next_line().unwrap().as_deref(), Some("hello"));
        drop(connection.input);
        assert_eq!(connection.output.next_line().unwrap(), None);
        connection.control.wait();
    }
}
